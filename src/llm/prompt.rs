//! Prompt construction for LLM requests.
//!
//! Each workflow stage has a system prompt and a user template. Templates
//! use `{name}` placeholders filled from [`PromptVars`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::llm::types::Message;

/// Which stage of the workflow a prompt is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Restate the question as a precise data request.
    Intent,
    /// Produce one SQL SELECT statement.
    Sql,
    /// Summarize an execution result.
    Insight,
}

impl PromptKind {
    /// Returns the kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Sql => "sql",
            Self::Insight => "insight",
        }
    }

    /// Placeholders the user template reads.
    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            Self::Intent => &["user_query", "schema"],
            Self::Sql => &["user_query", "intent", "schema"],
            Self::Insight => &["user_query", "sql", "result"],
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Self::Intent => INTENT_SYSTEM_PROMPT,
            Self::Sql => SQL_SYSTEM_PROMPT,
            Self::Insight => INSIGHT_SYSTEM_PROMPT,
        }
    }

    fn user_template(&self) -> &'static str {
        match self {
            Self::Intent => INTENT_TEMPLATE,
            Self::Sql => SQL_TEMPLATE,
            Self::Insight => INSIGHT_TEMPLATE,
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named values substituted into a prompt template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptVars {
    values: BTreeMap<String, String>,
}

impl PromptVars {
    /// Creates an empty variable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a variable.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Returns a variable's value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns a variable's value, or "" when absent.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }
}

const INTENT_SYSTEM_PROMPT: &str = "You are a banking data analyst. You turn a customer-service \
question into one precise sentence describing the data to retrieve. Mention the tables, filters, \
ordering and row limits involved. Reply with that sentence only.";

const INTENT_TEMPLATE: &str = r#"{schema}
Question: {user_query}

Data request:"#;

const SQL_SYSTEM_PROMPT: &str = r#"You write SQLite queries for a read-only banking database.

RULES:
- Return exactly one SELECT statement
- Use only the tables and columns listed in the schema
- Never use UNION, data modification, PRAGMA or ATTACH
- Prefer explicit column lists and an ORDER BY when returning rows
- Add a LIMIT when returning rows

OUTPUT FORMAT:
Return the SQL query wrapped in ```sql code blocks and nothing else."#;

const SQL_TEMPLATE: &str = r#"{schema}
Question: {user_query}
Data request: {intent}"#;

const SQL_RETRY_SECTION: &str = r#"

PREVIOUS ATTEMPT FAILED:
{error_message}
Write a corrected query that avoids this problem."#;

const INSIGHT_SYSTEM_PROMPT: &str = r#"You explain query results to bank staff in plain language.

Reply with a JSON object and nothing else:
{"summary": "<one or two sentences>", "chart": "<table|metric|bar|line|pie|card|none>"}"#;

const INSIGHT_TEMPLATE: &str = r#"Question: {user_query}
SQL: {sql}
Result:
{result}"#;

/// Renders the user prompt for `kind`.
///
/// Missing variables render as empty text. For [`PromptKind::Sql`] a
/// non-empty `error_message` adds a section asking for a corrected query.
pub fn render(kind: PromptKind, vars: &PromptVars) -> String {
    let mut template = kind.user_template().to_string();
    if kind == PromptKind::Sql && !vars.get_or_empty("error_message").trim().is_empty() {
        template.push_str(SQL_RETRY_SECTION);
    }

    let mut names: Vec<&str> = kind.placeholders().to_vec();
    names.push("error_message");

    names.iter().fold(template, |text, name| {
        text.replace(&format!("{{{name}}}"), vars.get_or_empty(name))
    })
}

/// Builds the complete message list for one oracle request.
pub fn build_messages(kind: PromptKind, vars: &PromptVars) -> Vec<Message> {
    vec![
        Message::system(kind.system_prompt()),
        Message::user(render(kind, vars)),
    ]
}
