//! The response contract and its formatting helpers.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::query::ExecutionOutcome;

/// Longest error message returned to callers.
const MAX_ERROR_CHARS: usize = 200;

/// Rows included in the insight prompt.
const PROMPT_SAMPLE_ROWS: usize = 20;

/// Chart kinds callers know how to draw.
pub const CHART_KINDS: &[&str] = &["table", "metric", "bar", "line", "pie", "card", "none"];

/// What every request returns.
///
/// On success `error` is null; on failure every other field is null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub validated_sql: Option<String>,
    pub summary: Option<String>,
    pub chart_suggestion: Option<String>,
    pub error: Option<String>,
}

impl QueryResponse {
    /// Builds a failure response with a sanitized message.
    pub fn failure(message: &str) -> Self {
        Self {
            error: Some(sanitize_error(message)),
            ..Self::default()
        }
    }

    /// Returns true if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Reduces an error to one short, non-empty line.
pub fn sanitize_error(message: &str) -> String {
    let line = message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    if line.is_empty() {
        return "Request failed".to_string();
    }

    if line.chars().count() <= MAX_ERROR_CHARS {
        return line.to_string();
    }

    let mut cut: String = line.chars().take(MAX_ERROR_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

/// Suggests a chart from the shape of a result.
pub fn suggest_chart(outcome: &ExecutionOutcome) -> &'static str {
    match outcome.row_count {
        0 => "none",
        1 => "card",
        n if outcome.columns.len() == 2 => {
            if n > 5 {
                "bar"
            } else {
                "pie"
            }
        }
        _ => "table",
    }
}

/// Normalizes an oracle chart hint, or `None` if it is not a known kind.
pub fn normalize_chart(hint: &str) -> Option<&'static str> {
    let hint = hint.trim().to_lowercase();
    CHART_KINDS.iter().copied().find(|kind| *kind == hint)
}

/// Summary used when the oracle cannot describe the result.
pub fn fallback_summary(outcome: &ExecutionOutcome) -> String {
    let noun = if outcome.row_count == 1 { "row" } else { "rows" };
    let mut summary = format!("Query returned {} {}", outcome.row_count, noun);
    if outcome.truncated {
        summary.push_str(" (truncated)");
    }
    summary.push('.');
    summary
}

/// Renders a result compactly for the insight prompt.
pub fn render_result_for_prompt(outcome: &ExecutionOutcome) -> String {
    let columns: Vec<&str> = outcome.columns.iter().map(|c| c.name.as_str()).collect();
    let sample: Vec<_> = outcome.rows.iter().take(PROMPT_SAMPLE_ROWS).collect();

    json!({
        "columns": columns,
        "row_count": outcome.row_count,
        "truncated": outcome.truncated,
        "rows": sample,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, QueryResult, Value};
    use std::time::Duration;

    fn outcome(columns: usize, rows: usize) -> ExecutionOutcome {
        let cols = (0..columns)
            .map(|i| ColumnInfo::new(format!("c{i}"), "INTEGER"))
            .collect();
        let data = (0..rows)
            .map(|r| (0..columns).map(|_| Value::Int(r as i64)).collect())
            .collect();
        ExecutionOutcome::from_result(QueryResult::with_data(cols, data), Duration::ZERO)
    }

    #[test]
    fn test_suggest_chart_by_shape() {
        assert_eq!(suggest_chart(&outcome(3, 0)), "none");
        assert_eq!(suggest_chart(&outcome(3, 1)), "card");
        assert_eq!(suggest_chart(&outcome(2, 3)), "pie");
        assert_eq!(suggest_chart(&outcome(2, 8)), "bar");
        assert_eq!(suggest_chart(&outcome(4, 8)), "table");
    }

    #[test]
    fn test_normalize_chart() {
        assert_eq!(normalize_chart(" Bar "), Some("bar"));
        assert_eq!(normalize_chart("scatter"), None);
    }

    #[test]
    fn test_sanitize_error_first_line() {
        assert_eq!(
            sanitize_error("\n  Execution error: locked\nstack trace here"),
            "Execution error: locked"
        );
    }

    #[test]
    fn test_sanitize_error_caps_length() {
        let long = "x".repeat(500);
        let sanitized = sanitize_error(&long);
        assert_eq!(sanitized.chars().count(), MAX_ERROR_CHARS);
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn test_sanitize_error_never_empty() {
        assert_eq!(sanitize_error("  \n "), "Request failed");
    }

    #[test]
    fn test_failure_response() {
        let response = QueryResponse::failure("boom");
        assert!(!response.is_success());
        assert_eq!(response.validated_sql, None);
        assert_eq!(response.summary, None);
        assert_eq!(response.chart_suggestion, None);
    }

    #[test]
    fn test_fallback_summary() {
        assert_eq!(fallback_summary(&outcome(1, 1)), "Query returned 1 row.");
        assert_eq!(fallback_summary(&outcome(1, 4)), "Query returned 4 rows.");
    }

    #[test]
    fn test_render_result_for_prompt() {
        let rendered = render_result_for_prompt(&outcome(2, 30));
        let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(json["row_count"], 30);
        assert_eq!(json["columns"], serde_json::json!(["c0", "c1"]));
        assert_eq!(json["rows"].as_array().unwrap().len(), PROMPT_SAMPLE_ROWS);
        assert_eq!(json["rows"][1]["c0"], 1);
    }
}
