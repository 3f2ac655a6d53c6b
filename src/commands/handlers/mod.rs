//! Command handlers for askdb.
//!
//! Each handler takes what its command needs and returns a [`CommandOutput`].

use serde_json::json;

use crate::cli::OutputFormat;
use crate::commands::output::CommandOutput;
use crate::db::{DatabaseClient, SchemaDescriptor};
use crate::safety::SqlValidator;
use crate::workflow::{Orchestrator, WorkflowReport};

/// Handle `ask`: run one workflow.
pub async fn handle_ask(
    orchestrator: &Orchestrator,
    question: &str,
    format: OutputFormat,
) -> CommandOutput {
    let report = orchestrator.run(question).await;
    render_report(&report, format)
}

/// Renders a workflow report.
pub fn render_report(report: &WorkflowReport, format: OutputFormat) -> CommandOutput {
    let response = &report.response;

    if format == OutputFormat::Json {
        let value = serde_json::to_value(response).unwrap_or_else(|_| json!({}));
        return if response.is_success() {
            CommandOutput::Json(value)
        } else {
            CommandOutput::Multiple(vec![
                CommandOutput::Json(value),
                CommandOutput::error(response.error.clone().unwrap_or_default()),
            ])
        };
    }

    if let Some(error) = &response.error {
        return CommandOutput::error(error.clone());
    }

    let mut outputs = Vec::new();
    if let Some(sql) = &response.validated_sql {
        outputs.push(CommandOutput::info(format!("SQL: {sql}")));
    }

    if let Some(outcome) = &report.state.execution_outcome {
        if !outcome.columns.is_empty() {
            let headers = outcome.columns.iter().map(|c| c.name.clone()).collect();
            let rows = outcome
                .rows
                .iter()
                .map(|record| record.values().map(|v| v.to_display_string()).collect())
                .collect();
            outputs.push(CommandOutput::table(headers, rows));
        }

        let mut footer = format!("{} row(s) in {:?}", outcome.row_count, outcome.elapsed);
        if outcome.truncated {
            footer.push_str(" (truncated)");
        }
        outputs.push(CommandOutput::info(footer));
    }

    if let Some(summary) = &response.summary {
        let chart = response.chart_suggestion.as_deref().unwrap_or("none");
        outputs.push(CommandOutput::info(format!("{summary}\nChart: {chart}")));
    }

    CommandOutput::Multiple(outputs)
}

/// Handle `validate`: print the verdict for one SQL string.
pub fn handle_validate(validator: &SqlValidator, sql: &str, format: OutputFormat) -> CommandOutput {
    let verdict = validator.validate(sql);

    if format == OutputFormat::Json {
        let value = serde_json::to_value(&verdict).unwrap_or_else(|_| json!({}));
        return if verdict.is_valid {
            CommandOutput::Json(value)
        } else {
            CommandOutput::Multiple(vec![
                CommandOutput::Json(value),
                CommandOutput::error(verdict.reason),
            ])
        };
    }

    match verdict.cleaned_sql {
        Some(cleaned) if verdict.is_valid => {
            CommandOutput::info(format!("{}\n{}", verdict.reason, cleaned))
        }
        _ => CommandOutput::error(format!("INVALID: {}", verdict.reason)),
    }
}

/// Handle `schema`: print the whitelist.
pub fn handle_schema(schema: &SchemaDescriptor, format: OutputFormat) -> CommandOutput {
    match format {
        OutputFormat::Json => CommandOutput::Json(
            serde_json::to_value(schema.tables()).unwrap_or_else(|_| json!([])),
        ),
        OutputFormat::Text => CommandOutput::info(schema.format_for_llm().trim_end().to_string()),
    }
}

/// Handle `health`: check connectivity and that every whitelisted table exists.
pub async fn handle_health(
    db: &dyn DatabaseClient,
    schema: &SchemaDescriptor,
    format: OutputFormat,
) -> CommandOutput {
    let tables = match db.list_tables().await {
        Ok(tables) => tables,
        Err(e) => {
            return match format {
                OutputFormat::Json => CommandOutput::Multiple(vec![
                    CommandOutput::Json(json!({"database": "unreachable", "error": e.message()})),
                    CommandOutput::error(e.to_string()),
                ]),
                OutputFormat::Text => CommandOutput::error(e.to_string()),
            };
        }
    };

    let missing: Vec<&str> = schema
        .table_names()
        .into_iter()
        .filter(|name| !tables.iter().any(|t| t.eq_ignore_ascii_case(name)))
        .collect();

    let mut outputs = Vec::new();
    match format {
        OutputFormat::Json => outputs.push(CommandOutput::Json(json!({
            "database": "ok",
            "tables": tables.len(),
            "missing_tables": missing,
        }))),
        OutputFormat::Text => outputs.push(CommandOutput::info(format!(
            "Database: ok ({} tables)",
            tables.len()
        ))),
    }

    if missing.is_empty() {
        if format == OutputFormat::Text {
            outputs.push(CommandOutput::info("Whitelisted tables: all present"));
        }
    } else {
        outputs.push(CommandOutput::error(format!(
            "Whitelisted tables missing from the database: {}",
            missing.join(", ")
        )));
    }

    CommandOutput::Multiple(outputs)
}
