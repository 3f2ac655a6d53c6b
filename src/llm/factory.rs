//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use crate::error::{AskError, Result};
use crate::llm::anthropic::DEFAULT_ANTHROPIC_MODEL;
use crate::llm::openai::DEFAULT_OPENAI_MODEL;
use crate::llm::{
    AnthropicClient, AnthropicConfig, GenerationSettings, LlmClient, LlmProvider, OpenAiClient,
    OpenAiConfig,
};

/// Creates an LLM client for a remote provider.
///
/// API keys come from `OPENAI_API_KEY` or `ANTHROPIC_API_KEY`. When `model`
/// is `None` the provider's default model is used. `OPENAI_BASE_URL`
/// overrides the OpenAI endpoint.
pub fn create_client(
    provider: LlmProvider,
    model: Option<&str>,
    settings: GenerationSettings,
) -> Result<Arc<dyn LlmClient>> {
    match provider {
        LlmProvider::OpenAi => {
            let key = api_key("OPENAI_API_KEY")?;
            let mut config = OpenAiConfig::new(key, model.unwrap_or(DEFAULT_OPENAI_MODEL))
                .with_settings(settings);
            if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
                config = config.with_api_url(url);
            }
            Ok(Arc::new(OpenAiClient::new(config)?))
        }
        LlmProvider::Anthropic => {
            let key = api_key("ANTHROPIC_API_KEY")?;
            let config = AnthropicConfig::new(key, model.unwrap_or(DEFAULT_ANTHROPIC_MODEL))
                .with_settings(settings);
            Ok(Arc::new(AnthropicClient::new(config)?))
        }
        LlmProvider::Rules => Err(AskError::config(
            "The rules provider runs offline and has no LLM client",
        )),
    }
}

fn api_key(variable: &str) -> Result<String> {
    std::env::var(variable)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| AskError::llm(format!("No API key configured. Set {variable}.")))
}
