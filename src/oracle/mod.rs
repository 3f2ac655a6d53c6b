//! Text-generation oracles.
//!
//! An oracle answers one prompt kind (intent, SQL or insight) given named
//! variables. The workflow treats every oracle output as untrusted text.

pub mod rules;

pub use rules::RuleBasedOracle;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::{FailurePolicy, LlmConfig};
use crate::error::{AskError, Result};
use crate::llm::{
    build_messages, create_client, extract_sql, LlmClient, LlmProvider, PromptKind, PromptVars,
};

/// Source of generated text for the workflow.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generates text for `kind` from `vars`.
    async fn generate(&self, kind: PromptKind, vars: &PromptVars) -> Result<String>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Oracle that renders prompt templates and calls an LLM.
pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
}

impl LlmOracle {
    /// Creates an oracle over the given client.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn generate(&self, kind: PromptKind, vars: &PromptVars) -> Result<String> {
        let messages = build_messages(kind, vars);
        debug!(kind = %kind, model = self.client.name(), "Calling LLM");

        let response = self.client.complete(&messages).await?;

        match kind {
            PromptKind::Sql => {
                extract_sql(&response).ok_or_else(|| AskError::llm("LLM returned no SQL"))
            }
            PromptKind::Intent | PromptKind::Insight => {
                let text = response.trim();
                if text.is_empty() {
                    return Err(AskError::llm(format!("LLM returned an empty {kind}")));
                }
                Ok(text.to_string())
            }
        }
    }

    fn name(&self) -> &str {
        self.client.name()
    }
}

/// Oracle that falls back to a second oracle when the first one fails.
pub struct FallbackOracle {
    primary: Arc<dyn Oracle>,
    fallback: Arc<dyn Oracle>,
}

impl FallbackOracle {
    /// Creates a fallback chain.
    pub fn new(primary: Arc<dyn Oracle>, fallback: Arc<dyn Oracle>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Oracle for FallbackOracle {
    async fn generate(&self, kind: PromptKind, vars: &PromptVars) -> Result<String> {
        match self.primary.generate(kind, vars).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(
                    kind = %kind,
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    "Primary oracle failed, falling back: {}",
                    e
                );
                self.fallback.generate(kind, vars).await
            }
        }
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}

type Script = HashMap<PromptKind, VecDeque<std::result::Result<String, String>>>;

/// Oracle that replays queued responses per prompt kind.
///
/// Queued responses are consumed first; afterwards the kind's default is
/// returned, or an error when none is set. Every call is recorded.
#[derive(Default)]
pub struct ScriptedOracle {
    queued: Mutex<Script>,
    defaults: HashMap<PromptKind, String>,
    calls: Mutex<Vec<(PromptKind, PromptVars)>>,
}

impl ScriptedOracle {
    /// Creates an oracle with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response for `kind`.
    pub fn then(self, kind: PromptKind, response: impl Into<String>) -> Self {
        self.push(kind, Ok(response.into()))
    }

    /// Queues a failure for `kind`.
    pub fn then_fail(self, kind: PromptKind, message: impl Into<String>) -> Self {
        self.push(kind, Err(message.into()))
    }

    /// Sets the response returned once the queue for `kind` is empty.
    pub fn always(mut self, kind: PromptKind, response: impl Into<String>) -> Self {
        self.defaults.insert(kind, response.into());
        self
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<(PromptKind, PromptVars)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Returns the variables of every call of one kind.
    pub fn calls_for(&self, kind: PromptKind) -> Vec<PromptVars> {
        self.calls()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, vars)| vars)
            .collect()
    }

    fn push(self, kind: PromptKind, entry: std::result::Result<String, String>) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.entry(kind).or_default().push_back(entry);
        }
        self
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, kind: PromptKind, vars: &PromptVars) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((kind, vars.clone()));
        }

        let next = self
            .queued
            .lock()
            .ok()
            .and_then(|mut queued| queued.get_mut(&kind).and_then(VecDeque::pop_front));

        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AskError::llm(message)),
            None => self
                .defaults
                .get(&kind)
                .cloned()
                .ok_or_else(|| AskError::llm(format!("No scripted {kind} response"))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Creates the oracle described by the LLM configuration.
pub fn create_oracle(config: &LlmConfig) -> Result<Arc<dyn Oracle>> {
    if config.provider == LlmProvider::Rules {
        return Ok(Arc::new(RuleBasedOracle::new()));
    }

    let client = create_client(
        config.provider,
        config.model.as_deref(),
        config.generation_settings(),
    );

    match (client, config.on_failure) {
        (Ok(client), FailurePolicy::Fail) => Ok(Arc::new(LlmOracle::new(client))),
        (Ok(client), FailurePolicy::Fallback) => Ok(Arc::new(FallbackOracle::new(
            Arc::new(LlmOracle::new(client)),
            Arc::new(RuleBasedOracle::new()),
        ))),
        (Err(e), FailurePolicy::Fallback) => {
            warn!("LLM provider unavailable, using offline rules: {}", e);
            Ok(Arc::new(RuleBasedOracle::new()))
        }
        (Err(e), FailurePolicy::Fail) => Err(e),
    }
}
