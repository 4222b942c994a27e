//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating the generation client.
//! The client is constructed once at startup and passed by reference into
//! the pipeline; its lifecycle (and any caching) lives here, not there.

use crate::config::LlmConfig;
use crate::error::{GenerationError, Result};
use crate::llm::{
    GeminiClient, GeminiConfig, LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig,
};
use std::sync::Arc;

/// Creates an LLM client for the given provider.
///
/// If `api_key` is provided, it takes precedence over environment variables
/// (`GOOGLE_API_KEY` / `OPENAI_API_KEY`). The model comes from the config,
/// falling back to each provider's default.
pub fn create_client(
    provider: LlmProvider,
    config: &LlmConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn LlmClient>> {
    match provider {
        LlmProvider::Gemini => {
            let client = match (api_key, config.model.as_deref()) {
                (Some(key), Some(model)) => GeminiClient::new(
                    GeminiConfig::new(key, model).with_timeout(config.timeout_secs),
                )?,
                (Some(key), None) => GeminiClient::new(
                    GeminiConfig::new(key, "gemini-1.5-flash-latest")
                        .with_timeout(config.timeout_secs),
                )?,
                (None, _) => GeminiClient::from_env().map_err(|_| {
                    GenerationError::ServiceUnavailable(
                        "No API key configured. Set GOOGLE_API_KEY or pass --api-key.".to_string(),
                    )
                })?,
            };
            Ok(Arc::new(client))
        }
        LlmProvider::OpenAi => {
            let client = match (api_key, config.model.as_deref()) {
                (Some(key), Some(model)) => OpenAiClient::new(
                    OpenAiConfig::new(key, model).with_timeout(config.timeout_secs),
                )?,
                (Some(key), None) => OpenAiClient::new(
                    OpenAiConfig::new(key, "gpt-4o").with_timeout(config.timeout_secs),
                )?,
                (None, _) => OpenAiClient::from_env().map_err(|_| {
                    GenerationError::ServiceUnavailable(
                        "No API key configured. Set OPENAI_API_KEY or pass --api-key.".to_string(),
                    )
                })?,
            };
            Ok(Arc::new(client))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
