//! Mock LLM client for testing.
//!
//! Returns canned responses keyed on patterns in the last user message and
//! records every prompt it receives.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::{AskError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), checked in order.
    responses: Vec<(String, String)>,
    /// Response when no pattern matches; `None` makes the call fail.
    fallback: Option<String>,
    /// Last user message of every call.
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// Creates a mock client that fails every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the prompt contains `pattern` (case-insensitive), the mock
    /// returns `response`.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((pattern.into(), response.into()));
        self
    }

    /// Sets the response used when no pattern matches.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Returns the prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

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
        let input = Self::extract_user_input(messages);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(input.clone());
        }

        let input_lower = input.to_lowercase();
        self.responses
            .iter()
            .find(|(pattern, _)| input_lower.contains(&pattern.to_lowercase()))
            .map(|(_, response)| response.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| AskError::llm("Mock LLM has no response for this prompt"))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
