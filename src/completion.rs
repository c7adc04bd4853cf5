//! Language-model call capability used by the synthesis engine.
//!
//! The engine never talks to a specific vendor directly; it is handed a
//! [`CompletionClient`] and issues `complete` calls through it. The concrete
//! Ollama adapter issues HTTP requests straight to the runtime and reports the
//! token counts the runtime returns, so usage accounting works without a
//! vendor SDK.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::get_config;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider was unreachable or refused the request.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Token counts reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced in the completion.
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Combined prompt and completion token count.
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Request payload passed to the completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Prompt assembled by the synthesis pipeline.
    pub prompt: String,
    /// Upper bound on completion tokens for the call.
    pub max_tokens: usize,
}

/// A provider response with its reported usage.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Completion text, trimmed of surrounding whitespace.
    pub text: String,
    /// Token counts for the call.
    pub usage: TokenUsage,
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a completion for the supplied prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;
}

/// Build the Ollama-backed completion client from configuration.
pub fn get_completion_client() -> Box<dyn CompletionClient + Send + Sync> {
    let config = get_config();
    let base_url = config
        .ollama_url
        .clone()
        .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
    Box::new(OllamaCompletionClient::new(base_url))
}

/// Completion client backed by a local Ollama runtime.
pub struct OllamaCompletionClient {
    http: Client,
    base_url: String,
}

impl OllamaCompletionClient {
    /// Construct a client targeting the given base URL.
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .user_agent("stakesum/completion")
            .build()
            .expect("Failed to construct reqwest::Client for completions");
        Self { http, base_url }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                // Lower temperature for reproducible summaries.
                "temperature": 0.1,
                "num_predict": request.max_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(CompletionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(Completion {
            text: body.response.trim().to_string(),
            usage: TokenUsage {
                prompt_tokens: body.prompt_eval_count.unwrap_or(0),
                completion_tokens: body.eval_count.unwrap_or(0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn test_client(base_url: String) -> OllamaCompletionClient {
        OllamaCompletionClient {
            http: Client::builder()
                .user_agent("stakesum-test")
                .build()
                .expect("client"),
            base_url,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama".into(),
            prompt: "Summarize".into(),
            max_tokens: 512,
        }
    }

    #[tokio::test]
    async fn ollama_client_reports_usage_on_success() {
        let server = MockServer::start_async().await;
        let client = test_client(server.base_url());

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "Summary text",
                    "done": true,
                    "prompt_eval_count": 120,
                    "eval_count": 45
                }));
            })
            .await;

        let completion = client.complete(request()).await.expect("completion");

        mock.assert();
        assert_eq!(completion.text, "Summary text");
        assert_eq!(completion.usage.prompt_tokens, 120);
        assert_eq!(completion.usage.completion_tokens, 45);
        assert_eq!(completion.usage.total(), 165);
    }

    #[tokio::test]
    async fn ollama_client_defaults_missing_usage_to_zero() {
        let server = MockServer::start_async().await;
        let client = test_client(server.base_url());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "Short",
                    "done": true
                }));
            })
            .await;

        let completion = client.complete(request()).await.expect("completion");
        assert_eq!(completion.usage.total(), 0);
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = test_client(server.base_url());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.complete(request()).await.expect_err("error response");
        assert!(matches!(error, CompletionError::GenerationFailed(message) if message.contains("500")));
    }

    #[tokio::test]
    async fn ollama_client_rejects_incomplete_response() {
        let server = MockServer::start_async().await;
        let client = test_client(server.base_url());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "partial",
                    "done": false
                }));
            })
            .await;

        let error = client.complete(request()).await.expect_err("incomplete");
        assert!(matches!(error, CompletionError::InvalidResponse(_)));
    }
}
