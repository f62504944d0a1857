use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub frontend_url: String,

    // AI completion provider
    pub ai_api_key: String,
    pub ai_base_url: String,
    pub ai_model: String,
    pub ai_timeout_secs: u64,
    pub ai_max_tokens: u32,
    pub ai_temperature: f32,

    // Best-effort Markdown copies of each diagram
    pub diagrams_dir: String,

    // Watchdog is disabled unless a timeout is configured
    pub generation_timeout_minutes: Option<i64>,
    pub watchdog_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let or_default =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            host: or_default("HOST", "127.0.0.1"),
            port: parse_var("PORT", or_default("PORT", "8080"))?,
            jwt_secret: required("JWT_SECRET")?,
            frontend_url: or_default("FRONTEND_URL", "http://localhost:3000"),
            ai_api_key: required("AI_API_KEY")?,
            ai_base_url: or_default("AI_BASE_URL", "https://api.openai.com/v1"),
            ai_model: or_default("AI_MODEL", "gpt-4o"),
            ai_timeout_secs: parse_var("AI_TIMEOUT_SECS", or_default("AI_TIMEOUT_SECS", "300"))?,
            ai_max_tokens: parse_var("AI_MAX_TOKENS", or_default("AI_MAX_TOKENS", "4096"))?,
            ai_temperature: parse_var("AI_TEMPERATURE", or_default("AI_TEMPERATURE", "0.7"))?,
            diagrams_dir: or_default("DIAGRAMS_DIR", "static/diagrams"),
            generation_timeout_minutes: lookup("GENERATION_TIMEOUT_MINUTES")
                .map(|value| parse_var("GENERATION_TIMEOUT_MINUTES", value))
                .transpose()?,
            watchdog_interval_secs: parse_var(
                "WATCHDOG_INTERVAL_SECS",
                or_default("WATCHDOG_INTERVAL_SECS", "60"),
            )?,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
