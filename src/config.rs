//! Environment-driven configuration for the synthesis service.

use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the synthesis core.
///
/// Only the completion model is required; every tunable falls back to its
/// documented default when unset (see
/// [`crate::synthesis::SynthesisConfig`]).
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Completion model identifier passed to the provider.
    pub completion_model: String,
    /// Base URL of the Ollama runtime serving completions.
    pub ollama_url: Option<String>,
    /// Context window of the completion model, in tokens.
    pub context_window: Option<usize>,
    /// Explicit per-chunk token budget override.
    pub chunk_budget: Option<usize>,
    /// Token overlap carried between adjacent chunks.
    pub chunk_overlap: Option<usize>,
    /// Minimum relevance score a document must reach to be synthesized.
    pub relevance_floor: Option<f64>,
    /// Upper bound on concurrent map-phase calls.
    pub map_concurrency: Option<usize>,
    /// Attempts per model call before giving up on it.
    pub retry_attempts: Option<usize>,
    /// Wall-clock budget for a whole synthesis run, in seconds.
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables, validating along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            completion_model: load_env("SUMMARY_MODEL")?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            context_window: parse_optional("SUMMARY_CONTEXT_WINDOW")?,
            chunk_budget: parse_optional("SUMMARY_CHUNK_BUDGET")?,
            chunk_overlap: parse_optional("SUMMARY_CHUNK_OVERLAP")?,
            relevance_floor: parse_optional("SUMMARY_RELEVANCE_FLOOR")?,
            map_concurrency: parse_optional("SUMMARY_MAP_CONCURRENCY")?,
            retry_attempts: parse_optional("SUMMARY_RETRY_ATTEMPTS")?,
            timeout_secs: parse_optional("SUMMARY_TIMEOUT_SECS")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        model = %config.completion_model,
        ollama_url = ?config.ollama_url,
        context_window = ?config.context_window,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
