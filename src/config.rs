//! Configuration management for askdb.
//!
//! Handles loading configuration from a TOML file, then applies
//! environment overrides (a `.env` file is loaded first by the binary).

use crate::db::{SchemaDescriptor, TableSpec};
use crate::error::{AskError, Result};
use crate::llm::{GenerationSettings, LlmProvider};
use crate::safety::LimitPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Main configuration structure for askdb.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Text-generation settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Datastore settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Execution and row-limit settings.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Table whitelist.
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// What to do when the LLM provider fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Report the failure to the workflow.
    #[default]
    Fail,
    /// Answer with the offline rules instead.
    Fallback,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Provider: "rules", "openai" or "anthropic".
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name; the provider default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Behaviour on provider failure.
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_max_tokens() -> u32 {
    GenerationSettings::default().max_tokens
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl LlmConfig {
    /// Returns the sampling settings.
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Datastore configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite://banking.db`.
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://banking.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Execution limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Deadline for one query, in seconds.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Maximum rows returned by the execution guard.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,

    /// LIMIT appended to queries without one.
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Largest LIMIT a query may keep.
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,

    /// Longest candidate SQL the validator will inspect, in characters.
    #[serde(default = "default_max_sql_length")]
    pub max_sql_length: usize,
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_max_result_rows() -> usize {
    1000
}

fn default_limit() -> u64 {
    LimitPolicy::default().default_limit
}

fn default_max_limit() -> u64 {
    LimitPolicy::default().max_limit
}

fn default_max_sql_length() -> usize {
    LimitPolicy::default().max_sql_length
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout_secs(),
            max_result_rows: default_max_result_rows(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_sql_length: default_max_sql_length(),
        }
    }
}

/// Table whitelist configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SchemaConfig {
    /// Whitelisted tables; the banking schema when empty.
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("askdb")
            .join("config.toml")
    }

    /// Loads configuration and applies environment overrides.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(AskError::config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::load_from_file(path)?
            }
            None => Self::load_from_file(&Self::default_path())?,
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AskError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AskError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    ///
    /// Recognized: `LLM_PROVIDER`, `LLM_MODEL`, `LLM_TEMPERATURE`,
    /// `LLM_MAX_TOKENS`, `DATABASE_URL`, `QUERY_TIMEOUT`, `MAX_RESULT_ROWS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("LLM_PROVIDER") {
            self.llm.provider = provider
                .parse()
                .map_err(|e: String| AskError::config(format!("LLM_PROVIDER: {e}")))?;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(value) = get("LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = get("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("LLM_MAX_TOKENS", &value)?;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(value) = get("QUERY_TIMEOUT") {
            self.limits.query_timeout_secs = parse_env("QUERY_TIMEOUT", &value)?;
        }
        if let Some(value) = get("MAX_RESULT_ROWS") {
            self.limits.max_result_rows = parse_env("MAX_RESULT_ROWS", &value)?;
        }

        Ok(())
    }

    /// Checks value ranges and the whitelist.
    pub fn validate(&self) -> Result<()> {
        if self.limits.query_timeout_secs == 0 {
            return Err(AskError::config(
                "limits.query_timeout_secs must be greater than zero",
            ));
        }
        if self.limits.max_result_rows == 0 {
            return Err(AskError::config(
                "limits.max_result_rows must be greater than zero",
            ));
        }
        if self.limits.max_limit == 0 {
            return Err(AskError::config("limits.max_limit must be greater than zero"));
        }
        if self.limits.default_limit == 0 || self.limits.default_limit > self.limits.max_limit {
            return Err(AskError::config(format!(
                "limits.default_limit must be between 1 and limits.max_limit ({})",
                self.limits.max_limit
            )));
        }
        if self.limits.max_sql_length == 0 {
            return Err(AskError::config(
                "limits.max_sql_length must be greater than zero",
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AskError::config("llm.temperature must be between 0.0 and 2.0"));
        }
        if self.llm.max_tokens == 0 {
            return Err(AskError::config("llm.max_tokens must be greater than zero"));
        }
        Url::parse(&self.database.url)
            .map_err(|e| AskError::config(format!("Invalid database.url: {e}")))?;
        self.schema_descriptor()?;
        Ok(())
    }

    /// Builds the schema descriptor from the configured whitelist.
    pub fn schema_descriptor(&self) -> Result<SchemaDescriptor> {
        if self.schema.tables.is_empty() {
            return Ok(SchemaDescriptor::banking());
        }
        SchemaDescriptor::new(self.schema.tables.clone())
    }

    /// Returns the row-limit policy for the validator.
    pub fn limit_policy(&self) -> LimitPolicy {
        LimitPolicy {
            default_limit: self.limits.default_limit,
            max_limit: self.limits.max_limit,
            max_sql_length: self.limits.max_sql_length,
        }
    }

    /// Returns the query deadline.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.query_timeout_secs)
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AskError::config(format!("Invalid value for {name} ('{value}'): {e}")))
}

/// Returns a display-safe form of a connection URL (password hidden).
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}
