use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::utils::config::Config;
use crate::utils::http_client::create_http_client;

/// Single request/response text completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Return the full completion for `prompt` under the given system role.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&Config> for OpenAiConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.ai_base_url.trim_end_matches('/').to_string(),
            api_key: config.ai_api_key.clone(),
            model: config.ai_model.clone(),
            timeout_secs: config.ai_timeout_secs,
            max_tokens: config.ai_max_tokens,
            temperature: config.ai_temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client =
            create_http_client(config.timeout_secs).context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        log::debug!(
            "Requesting completion from {} (model {}, {} prompt chars)",
            self.config.base_url,
            self.config.model,
            prompt.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach AI provider at {}", self.config.base_url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read AI provider response")?;

        if !status.is_success() {
            return Err(anyhow!(provider_error_message(status.as_u16(), &body)));
        }

        parse_completion(&body)
    }
}

fn provider_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => format!("AI provider error ({}): {}", status, parsed.error.message),
        Err(_) => format!("AI provider error ({}): {}", status, body.trim()),
    }
}

fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).context("AI provider returned malformed JSON")?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("AI provider returned an empty completion"))
}
