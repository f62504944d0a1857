use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::generation_status::{GenerationState, LogEntry};
use crate::models::requirement::RequirementStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What a poller learns from one status read.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: GenerationState,
    pub progress: Option<i32>,
    pub latest_log: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusFetch {
    Found(StatusSnapshot),
    /// No status record yet; carries whether the requirement is generating.
    NotFound { requirement_generating: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Pending,
    Progress(StatusSnapshot),
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Finished(StatusSnapshot),
    /// Neither a status record nor a running generation exists.
    Missing,
    Cancelled,
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self) -> Result<StatusFetch>;
}

/// Polls a status source on a fixed interval until the attempt is terminal.
pub struct StatusPoller<S> {
    source: S,
    interval: Duration,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S) -> Self {
        Self::with_interval(source, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(source: S, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub async fn run<F>(&self, cancel: &CancellationToken, mut on_event: F) -> PollOutcome
    where
        F: FnMut(&PollEvent),
    {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            match self.source.fetch().await {
                Ok(StatusFetch::Found(snapshot)) => {
                    if snapshot.status.is_terminal() {
                        on_event(&PollEvent::Progress(snapshot.clone()));
                        return PollOutcome::Finished(snapshot);
                    }
                    on_event(&PollEvent::Progress(snapshot));
                }
                Ok(StatusFetch::NotFound {
                    requirement_generating: true,
                }) => on_event(&PollEvent::Pending),
                Ok(StatusFetch::NotFound {
                    requirement_generating: false,
                }) => return PollOutcome::Missing,
                Err(e) => {
                    log::warn!("Status poll failed: {:#}", e);
                    on_event(&PollEvent::FetchFailed(format!("{:#}", e)));
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    status: GenerationState,
    progress: Option<i32>,
    #[serde(default)]
    logs: Vec<LogEntry>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequirementBody {
    status: RequirementStatus,
}

/// Reads status through the service's HTTP API.
pub struct HttpStatusSource {
    client: Client,
    base_url: String,
    bearer_token: String,
    requirement_id: Uuid,
}

impl HttpStatusSource {
    pub fn new(
        client: Client,
        base_url: &str,
        bearer_token: &str,
        requirement_id: Uuid,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.to_string(),
            requirement_id,
        }
    }

    fn status_url(&self) -> String {
        format!(
            "{}/generation/status?requirementId={}",
            self.base_url, self.requirement_id
        )
    }

    fn requirement_url(&self) -> String {
        format!("{}/requirements/{}", self.base_url, self.requirement_id)
    }

    async fn requirement_generating(&self) -> Result<bool> {
        let body: RequirementBody = self
            .client
            .get(self.requirement_url())
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .context("Failed to fetch requirement")?
            .error_for_status()
            .context("Requirement lookup rejected")?
            .json()
            .await
            .context("Malformed requirement response")?;

        Ok(body.status == RequirementStatus::Generating)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Result<StatusFetch> {
        let response = self
            .client
            .get(self.status_url())
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .context("Failed to fetch generation status")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(StatusFetch::NotFound {
                requirement_generating: self.requirement_generating().await?,
            });
        }

        let body: StatusBody = response
            .error_for_status()
            .context("Status request rejected")?
            .json()
            .await
            .context("Malformed status response")?;

        Ok(StatusFetch::Found(StatusSnapshot {
            status: body.status,
            progress: body.progress,
            latest_log: body.logs.last().map(|entry| entry.message.clone()),
            error: body.error,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted reads; repeats the last one when exhausted.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<StatusFetch, String>>>,
        reads: Mutex<usize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<StatusFetch, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                reads: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch(&self) -> Result<StatusFetch> {
            *self.reads.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            };
            next.map_err(|e| anyhow!(e))
        }
    }

    fn snapshot(status: GenerationState, progress: i32) -> StatusFetch {
        StatusFetch::Found(StatusSnapshot {
            status,
            progress: Some(progress),
            latest_log: Some(format!("at {}", progress)),
            error: None,
        })
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let source = ScriptedSource::new(vec![
            Ok(StatusFetch::NotFound {
                requirement_generating: true,
            }),
            Ok(snapshot(GenerationState::Pending, 0)),
            Err("connection reset".to_string()),
            Ok(snapshot(GenerationState::InProgress, 30)),
            Ok(snapshot(GenerationState::Completed, 100)),
        ]);
        let poller = StatusPoller::with_interval(source, Duration::from_millis(5));
        let mut events = Vec::new();

        let outcome = poller
            .run(&CancellationToken::new(), |event| events.push(event.clone()))
            .await;

        match outcome {
            PollOutcome::Finished(snapshot) => {
                assert_eq!(snapshot.status, GenerationState::Completed);
                assert_eq!(snapshot.latest_log.as_deref(), Some("at 100"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], PollEvent::Pending);
        assert!(matches!(events[2], PollEvent::FetchFailed(ref msg) if msg == "connection reset"));
        assert_eq!(*poller.source.reads.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_stops_on_failure_and_timeout() {
        for state in [GenerationState::Failed, GenerationState::Timeout] {
            let source = ScriptedSource::new(vec![Ok(snapshot(state, 40))]);
            let poller = StatusPoller::with_interval(source, Duration::from_millis(5));
            let outcome = poller.run(&CancellationToken::new(), |_| {}).await;
            assert!(matches!(outcome, PollOutcome::Finished(s) if s.status == state));
        }
    }

    #[tokio::test]
    async fn test_missing_record_without_generation_ends_polling() {
        let source = ScriptedSource::new(vec![Ok(StatusFetch::NotFound {
            requirement_generating: false,
        })]);
        let poller = StatusPoller::with_interval(source, Duration::from_millis(5));
        assert_eq!(
            poller.run(&CancellationToken::new(), |_| {}).await,
            PollOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let source = ScriptedSource::new(vec![Ok(snapshot(GenerationState::InProgress, 50))]);
        let poller = StatusPoller::with_interval(source, Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        let mut seen = 0;
        let outcome = poller
            .run(&cancel, |_| {
                seen += 1;
                if seen == 3 {
                    canceller.cancel();
                }
            })
            .await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_http_source_urls() {
        let id = Uuid::new_v4();
        let source = HttpStatusSource::new(Client::new(), "http://localhost:8080/", "t", id);
        assert_eq!(
            source.status_url(),
            format!("http://localhost:8080/generation/status?requirementId={}", id)
        );
        assert_eq!(
            source.requirement_url(),
            format!("http://localhost:8080/requirements/{}", id)
        );
    }
}
