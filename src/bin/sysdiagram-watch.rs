//! Follow (and optionally start) a diagram generation from the command line.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sysdiagram_backend::models::generation_status::GenerationState;
use sysdiagram_backend::services::status_poller::{
    HttpStatusSource, PollEvent, PollOutcome, StatusPoller,
};
use sysdiagram_backend::utils::auth::create_jwt;
use sysdiagram_backend::utils::http_client::create_http_client;

/// Arguments to the watcher.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Requirement to watch.
    requirement_id: Uuid,

    /// Base URL of the backend.
    #[arg(long, env = "SYSDIAGRAM_URL", default_value = "http://127.0.0.1:8080")]
    base_url: String,

    /// Bearer token for the requirement owner.
    #[arg(long, env = "SYSDIAGRAM_TOKEN")]
    token: Option<String>,

    /// Mint a token for `--user-id` with this secret instead of passing `--token`.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Owner of the requirement, used with `--jwt-secret`.
    #[arg(long)]
    user_id: Option<Uuid>,

    /// Start a new generation before watching.
    #[arg(long)]
    generate: bool,

    /// Seconds between status reads.
    #[arg(long, default_value_t = 5)]
    interval: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitBody {
    request_token: String,
}

impl Args {
    fn bearer_token(&self) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }

        match (&self.jwt_secret, self.user_id) {
            (Some(secret), Some(user_id)) => {
                create_jwt(user_id, secret, 1).context("Failed to mint token")
            }
            _ => bail!("pass --token, or --jwt-secret together with --user-id"),
        }
    }
}

async fn trigger(client: &Client, base_url: &str, token: &str, requirement_id: Uuid) -> Result<()> {
    let init: InitBody = client
        .post(format!("{}/generation/status/init", base_url))
        .bearer_auth(token)
        .json(&json!({ "requirementId": requirement_id }))
        .send()
        .await
        .context("Failed to initialise generation status")?
        .error_for_status()
        .context("Status init rejected")?
        .json()
        .await
        .context("Malformed status init response")?;

    client
        .post(format!("{}/generation/generate", base_url))
        .bearer_auth(token)
        .json(&json!({
            "requirementId": requirement_id,
            "requestToken": init.request_token,
        }))
        .send()
        .await
        .context("Failed to start generation")?
        .error_for_status()
        .context("Generation request rejected")?;

    Ok(())
}

async fn run(args: Args) -> Result<ExitCode> {
    let token = args.bearer_token()?;
    let base_url = args.base_url.trim_end_matches('/').to_string();
    let client = create_http_client(30).context("Failed to create HTTP client")?;

    if args.generate {
        trigger(&client, &base_url, &token, args.requirement_id).await?;
        println!("Generation started for {}", args.requirement_id);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let source = HttpStatusSource::new(client, &base_url, &token, args.requirement_id);
    let poller = StatusPoller::with_interval(source, Duration::from_secs(args.interval.max(1)));

    let mut last_log: Option<String> = None;
    let outcome = poller
        .run(&cancel, |event| match event {
            PollEvent::Pending => println!("waiting for the attempt to be tracked..."),
            PollEvent::Progress(snapshot) => {
                if snapshot.latest_log != last_log {
                    println!(
                        "[{:>3}%] {} {}",
                        snapshot.progress.unwrap_or(0),
                        snapshot.status.as_str(),
                        snapshot.latest_log.as_deref().unwrap_or("")
                    );
                    last_log = snapshot.latest_log.clone();
                }
            }
            PollEvent::FetchFailed(reason) => eprintln!("status read failed: {}", reason),
        })
        .await;

    Ok(match outcome {
        PollOutcome::Finished(snapshot) if snapshot.status == GenerationState::Completed => {
            println!("Generation completed");
            ExitCode::SUCCESS
        }
        PollOutcome::Finished(snapshot) => {
            eprintln!(
                "Generation {}: {}",
                snapshot.status.as_str(),
                snapshot.error.as_deref().unwrap_or("no error reported")
            );
            ExitCode::FAILURE
        }
        PollOutcome::Missing => {
            eprintln!("No generation is tracked for {}", args.requirement_id);
            ExitCode::FAILURE
        }
        PollOutcome::Cancelled => ExitCode::from(130),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Args::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
