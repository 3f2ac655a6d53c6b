//! Transport-agnostic command output types.
//!
//! Handlers return [`CommandOutput`]; the binary renders it as text or JSON.

use serde_json::Value as JsonValue;

/// Output from a command handler.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Informational message.
    Info(String),

    /// Error message; the process exits non-zero.
    Error(String),

    /// Structured table data for display.
    Table {
        /// Column headers.
        headers: Vec<String>,
        /// Row data (each row is a vector of cell values).
        rows: Vec<Vec<String>>,
    },

    /// Machine-readable document.
    Json(JsonValue),

    /// Multiple outputs, rendered in order.
    Multiple(Vec<CommandOutput>),
}

impl CommandOutput {
    /// Creates an info message.
    pub fn info(msg: impl Into<String>) -> Self {
        Self::Info(msg.into())
    }

    /// Creates an error message.
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    /// Creates a table output.
    pub fn table(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self::Table { headers, rows }
    }

    /// Returns true if this output, or any nested output, is an error.
    pub fn is_error(&self) -> bool {
        match self {
            Self::Error(_) => true,
            Self::Multiple(outputs) => outputs.iter().any(Self::is_error),
            _ => false,
        }
    }

    /// Renders the output for a terminal.
    pub fn render(&self) -> String {
        match self {
            Self::Info(msg) => msg.clone(),
            Self::Error(msg) => format!("Error: {msg}"),
            Self::Table { headers, rows } => format_table(headers, rows),
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Self::Multiple(outputs) => outputs
                .iter()
                .map(Self::render)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// Formats a table as a string for display.
pub fn format_table(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }

    let width_of = |s: &str| s.chars().count();

    let mut widths: Vec<usize> = headers.iter().map(|h| width_of(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(width_of(cell));
            }
        }
    }

    let pad = |cell: &str, width: usize| {
        let mut padded = cell.to_string();
        padded.extend(std::iter::repeat(' ').take(width.saturating_sub(width_of(cell))));
        padded
    };

    let mut output = String::new();

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| pad(h, widths[i]))
        .collect();
    output.push_str(&header_line.join(" │ "));
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    output.push_str(&separator.join("─┼─"));
    output.push('\n');

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, widths.get(i).copied().unwrap_or(0)))
            .collect();
        output.push_str(&row_line.join(" │ "));
        output.push('\n');
    }

    output
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}
