//! Response parsing for LLM outputs.
//!
//! Extracts SQL and insight payloads from responses that may wrap them in
//! markdown code blocks.

use serde::Deserialize;

/// Summary and chart hint parsed from an insight response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInsight {
    /// Plain-language summary of the result.
    pub summary: String,
    /// Suggested visualization, if the model gave one.
    pub chart: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightPayload {
    summary: String,
    #[serde(default, alias = "chart_suggestion")]
    chart: Option<String>,
}

/// Extracts SQL from a generation response.
///
/// Prefers a ```sql block, then a bare ``` block, then the whole text.
/// Surrounding whitespace and one trailing `;` are removed. Returns `None`
/// when nothing is left.
pub fn extract_sql(response: &str) -> Option<String> {
    let body = extract_code_block(response, "sql")
        .or_else(|| extract_code_block(response, ""))
        .unwrap_or_else(|| response.to_string());

    let trimmed = body.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses an insight response.
///
/// Accepts a JSON object `{"summary": ..., "chart": ...}`, optionally inside
/// a ```json block. Anything else is taken verbatim as the summary. Returns
/// `None` for an empty response.
pub fn parse_insight(response: &str) -> Option<ParsedInsight> {
    let candidate = extract_code_block(response, "json").unwrap_or_else(|| response.to_string());

    if let Ok(payload) = serde_json::from_str::<InsightPayload>(candidate.trim()) {
        let summary = payload.summary.trim().to_string();
        if summary.is_empty() {
            return None;
        }
        let chart = payload
            .chart
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        return Some(ParsedInsight { summary, chart });
    }

    let summary = response.trim();
    if summary.is_empty() {
        return None;
    }

    Some(ParsedInsight {
        summary: summary.to_string(),
        chart: None,
    })
}

/// Extracts content from a markdown code block with the specified language.
///
/// Pass an empty string for `lang` to match blocks without a language specifier.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let start_pattern = format!("```{}", lang);
    let start_idx = text.find(&start_pattern)?;
    let after_pattern = start_idx + start_pattern.len();

    let content_start = text[after_pattern..]
        .find('\n')
        .map(|i| after_pattern + i + 1)?;

    // A generic block must not carry a language tag.
    if lang.is_empty() && !text[start_idx + 3..content_start - 1].trim().is_empty() {
        return None;
    }

    let end_idx = text[content_start..].find("```")?;
    Some(text[content_start..content_start + end_idx].to_string())
}
