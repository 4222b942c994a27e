//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns, so the pipeline
//! can be exercised without an API key.

use async_trait::async_trait;

use crate::error::{GenerationError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), checked first.
    custom_responses: Vec<(String, String)>,
    /// When set, every call fails with ServiceUnavailable.
    fail_with: Option<String>,
    /// When true, calls return an empty string to exercise the pipeline's
    /// empty-output handling.
    return_empty: bool,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the last user message contains `pattern`, the mock returns
    /// `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Makes every call fail as if the service were unreachable.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Makes every call return an empty string.
    pub fn returning_empty(mut self) -> Self {
        self.return_empty = true;
        self
    }

    /// Generates a mock response based on the input.
    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input_lower.contains("how many") || input_lower.contains("count") {
            return "```sql\nSELECT COUNT(*) FROM patients\n```".to_string();
        }

        if input_lower.contains("all patients") || input_lower.contains("list patients") {
            return "```sql\nSELECT * FROM patients\n```".to_string();
        }

        if input_lower.contains("appointment") {
            return "```sql\nSELECT a.* FROM appointments a\nJOIN patients p ON a.patient_id = p.patient_id\n```"
                .to_string();
        }

        "```sql\nSELECT 1\n```".to_string()
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Some(message) = &self.fail_with {
            return Err(GenerationError::ServiceUnavailable(message.clone()).into());
        }
        if self.return_empty {
            return Ok(String::new());
        }

        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}
