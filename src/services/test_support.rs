//! Fixtures shared by database-backed tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::requirement::{
    self, AppType, DiagramList, NonFunctionalRequirements, RequirementStatus, StringList,
    TechPreferences,
};
use crate::services::ai_client::CompletionProvider;

pub async fn insert_requirement(db: &DatabaseConnection, user_id: Uuid) -> requirement::Model {
    let now = Utc::now();
    requirement::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        name: Set("Booking service".to_string()),
        description: Set("Hotel room reservations".to_string()),
        app_type: Set(AppType::Web),
        functional_requirements: Set(StringList(vec![
            "Guests search rooms".to_string(),
            "Guests book a room".to_string(),
        ])),
        non_functional_requirements: Set(NonFunctionalRequirements::default()),
        tech_preferences: Set(TechPreferences {
            backend_language: "Rust".to_string(),
            frameworks: vec!["actix-web".to_string()],
            databases: vec!["PostgreSQL".to_string()],
            architecture_style: "layered".to_string(),
        }),
        additional_context: Set(String::new()),
        status: Set(RequirementStatus::Draft),
        diagrams: Set(DiagramList::default()),
        design_document: Set(None),
        diagram_urls: Set(StringList::default()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert requirement")
}

pub async fn reload(db: &DatabaseConnection, id: Uuid) -> requirement::Model {
    requirement::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query requirement")
        .expect("requirement exists")
}

/// Provider that returns a canned reply and records the prompts it saw.
pub struct MockProvider {
    reply: Result<String, String>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl MockProvider {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((system.to_string(), prompt.to_string()));
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}
