use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::generation_status::{self, GenerationState, LogLevel};
use crate::models::requirement::{self, DiagramList, RequirementStatus, StringList};
use crate::services::ai_client::CompletionProvider;
use crate::services::diagram_files::DiagramFiles;
use crate::services::generation_status as tracker;
use crate::services::generation_status::TrackerError;
use crate::services::prompt_builder::{build_prompt, SYSTEM_PROMPT};
use crate::services::response_processor::process_response;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("requirement not found or not owned by user")]
    NotFoundOrUnauthorized,
    #[error("a generation is already running for this requirement")]
    AlreadyGenerating,
    #[error("{0}")]
    Provider(String),
    #[error("status tracking failed: {0}")]
    Status(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl From<TrackerError> for GenerationError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Database(e) => GenerationError::Database(e),
            other => GenerationError::Status(other.to_string()),
        }
    }
}

/// Runs one generation attempt end to end: claim the requirement, prompt the
/// provider, split the reply into diagrams and persist the outcome.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    db: DatabaseConnection,
    provider: Arc<dyn CompletionProvider>,
    files: DiagramFiles,
}

impl GenerationOrchestrator {
    pub fn new(
        db: DatabaseConnection,
        provider: Arc<dyn CompletionProvider>,
        files: DiagramFiles,
    ) -> Self {
        Self {
            db,
            provider,
            files,
        }
    }

    /// Generate diagrams for a requirement owned by `user_id`.
    ///
    /// On return, successful or not, the requirement is `completed` or
    /// `failed` unless the claim itself was refused.
    pub async fn generate_diagrams(
        &self,
        requirement_id: Uuid,
        user_id: Uuid,
    ) -> Result<requirement::Model, GenerationError> {
        let claimed = self.claim(requirement_id, user_id).await?;
        self.run(claimed).await
    }

    /// Atomically move the requirement to `generating`.
    ///
    /// Fails with `AlreadyGenerating` when another attempt holds it.
    pub async fn claim(
        &self,
        requirement_id: Uuid,
        user_id: Uuid,
    ) -> Result<requirement::Model, GenerationError> {
        let result = requirement::Entity::update_many()
            .col_expr(
                requirement::Column::Status,
                Expr::value(RequirementStatus::Generating),
            )
            .col_expr(requirement::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(requirement::Column::Id.eq(requirement_id))
            .filter(requirement::Column::UserId.eq(user_id))
            .filter(requirement::Column::Status.ne(RequirementStatus::Generating))
            .exec(&self.db)
            .await?;

        let current = requirement::Entity::find_by_id(requirement_id)
            .filter(requirement::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or(GenerationError::NotFoundOrUnauthorized)?;

        if result.rows_affected == 0 {
            log::warn!(
                "Refusing to start generation for requirement {}: already generating",
                requirement_id
            );
            return Err(GenerationError::AlreadyGenerating);
        }

        log::info!(
            "Requirement {} claimed for generation by user {}",
            requirement_id,
            user_id
        );
        Ok(current)
    }

    /// Run an attempt for a requirement already claimed with [`claim`].
    ///
    /// [`claim`]: GenerationOrchestrator::claim
    pub async fn run(
        &self,
        requirement: requirement::Model,
    ) -> Result<requirement::Model, GenerationError> {
        let requirement_id = requirement.id;
        let user_id = requirement.user_id;
        let mut status_id = None;

        let result = match self.prepare_status(requirement_id, user_id).await {
            Ok(status) => {
                status_id = Some(status.id);
                self.attempt(&requirement, status.id).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(updated) => {
                log::info!(
                    "Generation for requirement {} completed with {} diagrams",
                    requirement_id,
                    updated.diagrams.0.len()
                );
                Ok(updated)
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("Generation for requirement {} failed: {}", requirement_id, message);
                self.record_failure(requirement_id, status_id, &message).await;
                Err(e)
            }
        }
    }

    async fn prepare_status(
        &self,
        requirement_id: Uuid,
        user_id: Uuid,
    ) -> Result<generation_status::Model, GenerationError> {
        // Reuse a record prepared by init or retry; otherwise start fresh
        let status = match tracker::find(&self.db, requirement_id, user_id).await? {
            Some(existing) if existing.status == GenerationState::Pending => existing,
            _ => tracker::init_generation(&self.db, requirement_id, user_id).await?,
        };

        let status = tracker::update_status(
            &self.db,
            status.id,
            GenerationState::InProgress,
            Some("Generation started"),
        )
        .await?;
        Ok(status)
    }

    async fn attempt(
        &self,
        requirement: &requirement::Model,
        status_id: Uuid,
    ) -> Result<requirement::Model, GenerationError> {
        let prompt = build_prompt(requirement);
        tracker::set_progress(&self.db, status_id, 10, Some("Prompt built")).await?;
        tracker::set_progress(
            &self.db,
            status_id,
            30,
            Some("Waiting for the AI provider"),
        )
        .await?;

        let response = self
            .provider
            .generate(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| GenerationError::Provider(format!("{:#}", e)))?;

        tracker::set_progress(&self.db, status_id, 70, Some("Processing AI response")).await?;
        let processed = process_response(&response, requirement.id, &self.files).await;

        if processed.diagrams.is_empty() {
            tracker::add_log(
                &self.db,
                status_id,
                "AI response contained no diagram sections",
                LogLevel::Warn,
            )
            .await?;
        }

        let diagram_count = processed.diagrams.len();
        let txn = self.db.begin().await?;

        let mut active: requirement::ActiveModel = requirement.clone().into();
        active.status = Set(RequirementStatus::Completed);
        active.diagrams = Set(DiagramList(processed.diagrams));
        active.diagram_urls = Set(StringList(processed.diagram_urls));
        active.design_document = Set(Some(response));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        tracker::update_status(
            &txn,
            status_id,
            GenerationState::Completed,
            Some(&format!("Generated {} diagrams", diagram_count)),
        )
        .await?;

        txn.commit().await?;
        Ok(updated)
    }

    /// Leave both records in a failed state. Errors here are logged only so
    /// the original failure reaches the caller.
    async fn record_failure(&self, requirement_id: Uuid, status_id: Option<Uuid>, message: &str) {
        if let Err(e) = self.write_failure(requirement_id, status_id, message).await {
            log::error!(
                "Failed to record failure for requirement {} atomically: {}",
                requirement_id,
                e
            );

            if let Err(e) = mark_requirement_failed(&self.db, requirement_id).await {
                log::error!(
                    "Requirement {} may be left generating: {}",
                    requirement_id,
                    e
                );
            }
        }
    }

    async fn write_failure(
        &self,
        requirement_id: Uuid,
        status_id: Option<Uuid>,
        message: &str,
    ) -> Result<(), GenerationError> {
        let txn = self.db.begin().await?;
        mark_requirement_failed(&txn, requirement_id).await?;
        if let Some(status_id) = status_id {
            tracker::set_error(&txn, status_id, message).await?;
        }
        txn.commit().await?;
        Ok(())
    }
}

/// Move a requirement that is still `generating` to `failed`.
pub async fn mark_requirement_failed<C: ConnectionTrait>(
    db: &C,
    requirement_id: Uuid,
) -> Result<u64, DbErr> {
    let result = requirement::Entity::update_many()
        .col_expr(
            requirement::Column::Status,
            Expr::value(RequirementStatus::Failed),
        )
        .col_expr(requirement::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(requirement::Column::Id.eq(requirement_id))
        .filter(requirement::Column::Status.eq(RequirementStatus::Generating))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
