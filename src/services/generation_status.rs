use chrono::Utc;
use sea_orm::*;
use thiserror::Error;
use uuid::Uuid;

use crate::models::generation_status::{self, GenerationState, LogEntry, LogLevel, LogList};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("generation status not found")]
    NotFound,
    #[error("cannot {action} a generation that is {from}")]
    InvalidTransition {
        action: &'static str,
        from: &'static str,
    },
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

fn new_request_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn with_log(logs: &LogList, message: &str, level: LogLevel) -> LogList {
    let mut entries = logs.0.clone();
    entries.push(LogEntry {
        timestamp: Utc::now(),
        message: message.to_string(),
        level,
    });
    LogList(entries)
}

/// Find the status record for a (requirement, user) pair.
pub async fn find<C: ConnectionTrait>(
    db: &C,
    requirement_id: Uuid,
    user_id: Uuid,
) -> Result<Option<generation_status::Model>, DbErr> {
    generation_status::Entity::find()
        .filter(generation_status::Column::RequirementId.eq(requirement_id))
        .filter(generation_status::Column::UserId.eq(user_id))
        .one(db)
        .await
}

async fn load<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<generation_status::Model, TrackerError> {
    generation_status::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(TrackerError::NotFound)
}

async fn reset<C: ConnectionTrait>(
    db: &C,
    existing: generation_status::Model,
) -> Result<generation_status::Model, DbErr> {
    let now = Utc::now();
    let mut active: generation_status::ActiveModel = existing.into();
    active.status = Set(GenerationState::Pending);
    active.start_time = Set(Some(now));
    active.end_time = Set(None);
    active.progress = Set(Some(0));
    active.logs = Set(LogList::default());
    active.error = Set(None);
    active.request_token = Set(new_request_token());
    active.updated_at = Set(now);
    active.update(db).await
}

/// Start tracking a new attempt.
///
/// An existing record for the pair is reset in place, keeping its id and
/// retry history, so there is never more than one record per pair.
pub async fn init_generation<C: ConnectionTrait>(
    db: &C,
    requirement_id: Uuid,
    user_id: Uuid,
) -> Result<generation_status::Model, TrackerError> {
    if let Some(existing) = find(db, requirement_id, user_id).await? {
        log::info!(
            "Resetting generation status {} for requirement {} (was {})",
            existing.id,
            requirement_id,
            existing.status.as_str()
        );
        return Ok(reset(db, existing).await?);
    }

    let now = Utc::now();
    let record = generation_status::ActiveModel {
        id: Set(Uuid::new_v4()),
        requirement_id: Set(requirement_id),
        user_id: Set(user_id),
        status: Set(GenerationState::Pending),
        start_time: Set(Some(now)),
        end_time: Set(None),
        progress: Set(Some(0)),
        logs: Set(LogList::default()),
        error: Set(None),
        retry_count: Set(0),
        last_retry_at: Set(None),
        request_token: Set(new_request_token()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match generation_status::Entity::insert(record)
        .exec_with_returning(db)
        .await
    {
        Ok(created) => {
            log::info!(
                "Created generation status {} for requirement {}",
                created.id,
                requirement_id
            );
            Ok(created)
        }
        Err(insert_err) => {
            // A concurrent init won the unique key; reset its record instead
            match find(db, requirement_id, user_id).await? {
                Some(existing) => Ok(reset(db, existing).await?),
                None => Err(insert_err.into()),
            }
        }
    }
}

/// Move a record to `status`, stamping start/end times as needed.
pub async fn update_status<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    status: GenerationState,
    message: Option<&str>,
) -> Result<generation_status::Model, TrackerError> {
    let current = load(db, id).await?;
    let now = Utc::now();

    let mut active: generation_status::ActiveModel = current.clone().into();
    active.status = Set(status);

    if status == GenerationState::InProgress && current.start_time.is_none() {
        active.start_time = Set(Some(now));
    }
    if status.is_terminal() {
        active.end_time = Set(Some(now));
    }
    if status == GenerationState::Completed {
        active.progress = Set(Some(100));
    }
    if let Some(message) = message {
        let level = match status {
            GenerationState::Failed | GenerationState::Timeout => LogLevel::Error,
            _ => LogLevel::Info,
        };
        active.logs = Set(with_log(&current.logs, message, level));
    }
    active.updated_at = Set(now);

    Ok(active.update(db).await?)
}

/// Record progress (clamped to 0..=100) with an optional log line.
pub async fn set_progress<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    progress: i32,
    message: Option<&str>,
) -> Result<generation_status::Model, TrackerError> {
    let current = load(db, id).await?;

    let mut active: generation_status::ActiveModel = current.clone().into();
    active.progress = Set(Some(progress.clamp(0, 100)));
    if let Some(message) = message {
        active.logs = Set(with_log(&current.logs, message, LogLevel::Info));
    }
    active.updated_at = Set(Utc::now());

    Ok(active.update(db).await?)
}

/// Fail the attempt with `error`.
pub async fn set_error<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    error: &str,
) -> Result<generation_status::Model, TrackerError> {
    let current = load(db, id).await?;
    let now = Utc::now();

    let mut active: generation_status::ActiveModel = current.clone().into();
    active.status = Set(GenerationState::Failed);
    active.error = Set(Some(error.to_string()));
    active.end_time = Set(Some(now));
    active.logs = Set(with_log(
        &current.logs,
        &format!("Error: {}", error),
        LogLevel::Error,
    ));
    active.updated_at = Set(now);

    Ok(active.update(db).await?)
}

/// Append one log entry.
pub async fn add_log<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    message: &str,
    level: LogLevel,
) -> Result<generation_status::Model, TrackerError> {
    let current = load(db, id).await?;

    let mut active: generation_status::ActiveModel = current.clone().into();
    active.logs = Set(with_log(&current.logs, message, level));
    active.updated_at = Set(Utc::now());

    Ok(active.update(db).await?)
}

/// Re-open a failed or timed-out attempt for a manual retry.
pub async fn increment_retry<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<generation_status::Model, TrackerError> {
    let current = load(db, id).await?;

    if !matches!(
        current.status,
        GenerationState::Failed | GenerationState::Timeout
    ) {
        return Err(TrackerError::InvalidTransition {
            action: "retry",
            from: current.status.as_str(),
        });
    }

    let now = Utc::now();
    let retry_count = current.retry_count + 1;

    let mut active: generation_status::ActiveModel = current.clone().into();
    active.status = Set(GenerationState::Pending);
    active.retry_count = Set(retry_count);
    active.last_retry_at = Set(Some(now));
    // The retried attempt is timed from now, not from the first attempt
    active.start_time = Set(Some(now));
    active.end_time = Set(None);
    active.progress = Set(Some(0));
    active.logs = Set(with_log(
        &current.logs,
        &format!("Retry #{} requested", retry_count),
        LogLevel::Info,
    ));
    active.updated_at = Set(now);

    log::info!("Generation status {} re-opened for retry #{}", id, retry_count);

    Ok(active.update(db).await?)
}

/// Mark an attempt as timed out.
pub async fn mark_timed_out<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    message: &str,
) -> Result<generation_status::Model, TrackerError> {
    let current = load(db, id).await?;
    let now = Utc::now();

    let mut active: generation_status::ActiveModel = current.clone().into();
    active.status = Set(GenerationState::Timeout);
    active.error = Set(Some(message.to_string()));
    active.end_time = Set(Some(now));
    active.logs = Set(with_log(&current.logs, message, LogLevel::Error));
    active.updated_at = Set(now);

    Ok(active.update(db).await?)
}

/// Whether `token` belongs to the attempt currently tracked by `record`.
pub fn verify_token(record: &generation_status::Model, token: &str) -> bool {
    record.request_token == token
}
