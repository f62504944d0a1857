use chrono::Utc;
use sea_orm::*;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::models::generation_status::{self, GenerationState};
use crate::services::generation_orchestrator::{mark_requirement_failed, GenerationError};
use crate::services::generation_status as tracker;
use crate::utils::config::Config;

/// Times out attempts that have been outstanding longer than the configured
/// limit and releases their requirements.
pub struct GenerationWatchdog {
    db: DatabaseConnection,
    timeout: chrono::Duration,
    check_interval: Duration,
}

impl GenerationWatchdog {
    pub fn new(db: DatabaseConnection, timeout_minutes: i64, check_interval_secs: u64) -> Self {
        Self {
            db,
            timeout: chrono::Duration::minutes(timeout_minutes),
            check_interval: Duration::from_secs(check_interval_secs.max(1)),
        }
    }

    /// Start the watchdog loop
    pub async fn start(self: Arc<Self>) {
        log::info!(
            "Starting generation watchdog (timeout {} min, checking every {:?})",
            self.timeout.num_minutes(),
            self.check_interval
        );

        let mut interval = interval(self.check_interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep().await {
                log::error!("Error in generation watchdog: {}", e);
            }
        }
    }

    /// Time out every stale attempt. Returns how many were timed out.
    pub async fn sweep(&self) -> Result<usize, GenerationError> {
        let cutoff = Utc::now() - self.timeout;

        let stale = generation_status::Entity::find()
            .filter(
                generation_status::Column::Status
                    .is_in([GenerationState::Pending, GenerationState::InProgress]),
            )
            .filter(generation_status::Column::StartTime.lt(cutoff))
            .all(&self.db)
            .await?;

        if stale.is_empty() {
            return Ok(0);
        }

        log::warn!("Timing out {} stale generation attempts", stale.len());

        let message = format!(
            "Generation timed out after {} minutes",
            self.timeout.num_minutes()
        );
        let mut timed_out = 0;

        for record in stale {
            let txn = self.db.begin().await?;
            tracker::mark_timed_out(&txn, record.id, &message).await?;
            let released = mark_requirement_failed(&txn, record.requirement_id).await?;
            txn.commit().await?;

            log::warn!(
                "Generation status {} timed out (requirement {} released: {})",
                record.id,
                record.requirement_id,
                released > 0
            );
            timed_out += 1;
        }

        Ok(timed_out)
    }
}

/// Spawn the watchdog when a timeout policy is configured.
pub fn start_generation_watchdog(
    db: DatabaseConnection,
    config: &Config,
) -> Option<tokio::task::JoinHandle<()>> {
    let Some(timeout_minutes) = config.generation_timeout_minutes else {
        log::info!("Generation watchdog disabled (GENERATION_TIMEOUT_MINUTES not set)");
        return None;
    };

    let watchdog = Arc::new(GenerationWatchdog::new(
        db,
        timeout_minutes,
        config.watchdog_interval_secs,
    ));

    Some(tokio::spawn(async move {
        watchdog.start().await;
    }))
}
