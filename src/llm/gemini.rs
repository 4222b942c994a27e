//! Google Gemini LLM client implementation.
//!
//! Implements the LlmClient trait against the generateContent endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{GenerationError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default model when none is configured.
const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "gemini-1.5-flash-latest").
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl GeminiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Google Gemini LLM client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    /// Creates a new Gemini client with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                GenerationError::ServiceUnavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `GOOGLE_API_KEY` (or `GEMINI_API_KEY`) for the API key and
    /// optionally `GEMINI_MODEL` for the model.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| {
                GenerationError::ServiceUnavailable(
                    "GOOGLE_API_KEY environment variable not set".to_string(),
                )
            })?;

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(GeminiConfig::new(api_key, model))
    }

    /// Splits messages into the system instruction and user contents the
    /// generateContent API expects.
    fn convert_messages(messages: &[Message]) -> (Option<GeminiSystemInstruction>, Vec<GeminiContent>) {
        let system_text = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = if system_text.is_empty() {
            None
        } else {
            Some(GeminiSystemInstruction {
                parts: vec![GeminiPart { text: system_text }],
            })
        };

        let contents = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        (system, contents)
    }

    /// Parses an API error response into a generation error.
    fn parse_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return GenerationError::ServiceUnavailable(
                "Authentication failed. Check your GOOGLE_API_KEY.".to_string(),
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return GenerationError::ServiceUnavailable(
                "Quota exceeded or rate limited. Please wait and try again.".to_string(),
            );
        }

        if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(body) {
            return GenerationError::ServiceUnavailable(format!(
                "Gemini API error: {}",
                error_response.error.message
            ));
        }

        GenerationError::ServiceUnavailable(format!("Gemini API error ({status}): {body}"))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let (system_instruction, contents) = Self::convert_messages(messages);
        let request = GeminiRequest {
            system_instruction,
            contents,
        };

        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.config.model);
        debug!(model = %self.config.model, "Gemini generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::ServiceUnavailable("Request timed out.".to_string())
                } else if e.is_connect() {
                    GenerationError::ServiceUnavailable(
                        "Failed to connect to the Gemini API. Check your network.".to_string(),
                    )
                } else {
                    GenerationError::ServiceUnavailable(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GenerationError::ServiceUnavailable(format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body).into());
        }

        let response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::ServiceUnavailable(format!("Failed to parse response: {e}"))
        })?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyOutput.into());
        }

        Ok(text)
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "system_instruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
