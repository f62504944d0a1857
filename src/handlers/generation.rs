use actix_web::{web, HttpResponse, Responder};
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{db_error, generation_error, tracker_error};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::generation_status::{self, GenerationState, LogEntry};
use crate::models::requirement::{self, RequirementStatus};
use crate::services::generation_orchestrator::{mark_requirement_failed, GenerationOrchestrator};
use crate::services::generation_status as tracker;
use crate::services::generation_status::TrackerError;

// ============ Request/Response DTOs ============

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub id: String,
    pub requirement_id: String,
    pub status: GenerationState,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub progress: Option<i32>,
    pub logs: Vec<LogEntry>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub last_retry_at: Option<String>,
    pub request_token: String,
    pub updated_at: String,
}

impl From<generation_status::Model> for StatusResponse {
    fn from(model: generation_status::Model) -> Self {
        Self {
            id: model.id.to_string(),
            requirement_id: model.requirement_id.to_string(),
            status: model.status,
            start_time: model.start_time.map(|t| t.to_rfc3339()),
            end_time: model.end_time.map(|t| t.to_rfc3339()),
            progress: model.progress,
            logs: model.logs.0,
            error: model.error,
            retry_count: model.retry_count,
            last_retry_at: model.last_retry_at.map(|t| t.to_rfc3339()),
            request_token: model.request_token,
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementRef {
    pub requirement_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub requirement_id: Uuid,
    /// Token handed out by status init; a mismatch means the request is stale.
    pub request_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationAccepted {
    pub requirement_id: String,
    pub status: RequirementStatus,
}

async fn ensure_owned(
    db: &DatabaseConnection,
    requirement_id: Uuid,
    user_id: Uuid,
) -> Result<(), actix_web::Error> {
    let count = requirement::Entity::find_by_id(requirement_id)
        .filter(requirement::Column::UserId.eq(user_id))
        .count(db)
        .await
        .map_err(db_error)?;

    if count == 0 {
        return Err(actix_web::error::ErrorNotFound("Requirement not found"));
    }
    Ok(())
}

/// Run a claimed attempt in the background.
fn spawn_run(orchestrator: &GenerationOrchestrator, claimed: requirement::Model) -> HttpResponse {
    let requirement_id = claimed.id;
    let response = GenerationAccepted {
        requirement_id: requirement_id.to_string(),
        status: RequirementStatus::Generating,
    };

    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        // Outcome is persisted on both records; nothing to report here
        if let Err(e) = orchestrator.run(claimed).await {
            log::debug!("Background generation for {} ended with: {}", requirement_id, e);
        }
    });

    HttpResponse::Accepted().json(response)
}

// ============ Generation Handlers ============

/// POST /generation/status/init
/// Prepare a pending status record and hand out its request token
pub async fn init_status(
    db: web::Data<DatabaseConnection>,
    user: AuthenticatedUser,
    payload: web::Json<RequirementRef>,
) -> Result<impl Responder, actix_web::Error> {
    let requirement_id = payload.requirement_id;
    ensure_owned(db.get_ref(), requirement_id, user.user_id).await?;

    let record = tracker::init_generation(db.get_ref(), requirement_id, user.user_id)
        .await
        .map_err(tracker_error)?;

    Ok(HttpResponse::Ok().json(StatusResponse::from(record)))
}

/// GET /generation/status?requirementId=
pub async fn get_status(
    db: web::Data<DatabaseConnection>,
    user: AuthenticatedUser,
    query: web::Query<RequirementRef>,
) -> Result<impl Responder, actix_web::Error> {
    let record = tracker::find(db.get_ref(), query.requirement_id, user.user_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Generation status not found"))?;

    Ok(HttpResponse::Ok().json(StatusResponse::from(record)))
}

/// POST /generation/generate
/// Start generating diagrams; completion is observed through the status record
pub async fn generate(
    db: web::Data<DatabaseConnection>,
    orchestrator: web::Data<GenerationOrchestrator>,
    user: AuthenticatedUser,
    payload: web::Json<GenerateRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let payload = payload.into_inner();

    if let Some(token) = payload.request_token.as_deref() {
        let current = tracker::find(db.get_ref(), payload.requirement_id, user.user_id)
            .await
            .map_err(db_error)?;

        if !current.is_some_and(|record| tracker::verify_token(&record, token)) {
            log::warn!(
                "Stale generation request for requirement {} from user {}",
                payload.requirement_id,
                user.user_id
            );
            return Err(actix_web::error::ErrorConflict("Stale generation request"));
        }
    }

    let claimed = orchestrator
        .claim(payload.requirement_id, user.user_id)
        .await
        .map_err(generation_error)?;

    Ok(spawn_run(orchestrator.get_ref(), claimed))
}

/// POST /generation/retry
/// Retry a failed or timed-out attempt
pub async fn retry(
    db: web::Data<DatabaseConnection>,
    orchestrator: web::Data<GenerationOrchestrator>,
    user: AuthenticatedUser,
    payload: web::Json<RequirementRef>,
) -> Result<impl Responder, actix_web::Error> {
    let requirement_id = payload.requirement_id;
    ensure_owned(db.get_ref(), requirement_id, user.user_id).await?;

    let record = tracker::find(db.get_ref(), requirement_id, user.user_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Generation status not found"))?;

    if !matches!(
        record.status,
        GenerationState::Failed | GenerationState::Timeout
    ) {
        return Err(tracker_error(TrackerError::InvalidTransition {
            action: "retry",
            from: record.status.as_str(),
        }));
    }

    // Claim first so a refused claim leaves the retry count untouched
    let claimed = orchestrator
        .claim(requirement_id, user.user_id)
        .await
        .map_err(generation_error)?;

    let record = match tracker::increment_retry(db.get_ref(), record.id).await {
        Ok(record) => record,
        Err(e) => {
            if let Err(release) = mark_requirement_failed(db.get_ref(), requirement_id).await {
                log::error!("Failed to release requirement {}: {}", requirement_id, release);
            }
            return Err(tracker_error(e));
        }
    };

    log::info!(
        "Retry #{} for requirement {} requested by user {}",
        record.retry_count,
        requirement_id,
        user.user_id
    );

    Ok(spawn_run(orchestrator.get_ref(), claimed))
}
