//! Workflow orchestration.
//!
//! One request is one traversal of the phase machine in [`state`]: interpret
//! the question, generate SQL, validate it, execute it and summarize the
//! result. Failed attempts loop back to SQL generation with the failure
//! reason as prompt context, at most [`MAX_RETRIES`] times.

pub mod events;
pub mod response;
pub mod state;

pub use events::{EventSink, RecordingSink, TracingSink, WorkflowEvent};
pub use response::{sanitize_error, suggest_chart, QueryResponse};
pub use state::{next, FailureKind, Phase, WorkflowState, MAX_RETRIES, MAX_TRANSITIONS};

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

use crate::llm::{extract_sql, parse_insight, PromptKind, PromptVars};
use crate::oracle::Oracle;
use crate::query::ExecutionGuard;
use crate::safety::SqlValidator;
use response::{fallback_summary, normalize_chart, render_result_for_prompt};
use state::attempt_failed;

/// Longest question accepted, in characters.
pub const MAX_QUESTION_CHARS: usize = 5000;

/// Everything known about a finished request.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub request_id: u64,
    pub response: QueryResponse,
    pub status: Phase,
    pub failure: Option<FailureKind>,
    /// Phases visited, starting with `Intent`.
    pub path: Vec<Phase>,
    pub state: WorkflowState,
}

impl WorkflowReport {
    /// Number of transitions taken.
    pub fn transitions(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

/// Drives workflows against shared collaborators.
///
/// Takes `&self` everywhere, so many workflows may run concurrently on one
/// orchestrator.
pub struct Orchestrator {
    oracle: Arc<dyn Oracle>,
    validator: Arc<SqlValidator>,
    guard: ExecutionGuard,
    sink: Arc<dyn EventSink>,
    max_transitions: usize,
    next_request_id: AtomicU64,
}

impl Orchestrator {
    /// Creates an orchestrator that reports events to `tracing`.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        validator: Arc<SqlValidator>,
        guard: ExecutionGuard,
    ) -> Self {
        Self {
            oracle,
            validator,
            guard,
            sink: Arc::new(TracingSink),
            max_transitions: MAX_TRANSITIONS,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Replaces the event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Overrides the transition ceiling.
    pub fn with_max_transitions(mut self, max_transitions: usize) -> Self {
        self.max_transitions = max_transitions;
        self
    }

    /// Answers a question with the response contract.
    pub async fn ask(&self, question: &str) -> QueryResponse {
        self.run(question).await.response
    }

    /// Answers a question and returns the full report.
    pub async fn run(&self, question: &str) -> WorkflowReport {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let question = match check_question(question) {
            Ok(question) => question,
            Err(message) => {
                let report = failure_report(
                    request_id,
                    WorkflowState::new(question),
                    FailureKind::InputError,
                    message,
                    Vec::new(),
                );
                self.emit_completed(&report);
                return report;
            }
        };

        self.emit(WorkflowEvent::Started {
            request_id,
            query_chars: question.chars().count(),
        });

        let report = match AssertUnwindSafe(self.drive(request_id, question))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(_) => {
                error!(request_id, "Workflow panicked");
                failure_report(
                    request_id,
                    WorkflowState::new(question),
                    FailureKind::SystemError,
                    "System error: the request could not be completed",
                    Vec::new(),
                )
            }
        };

        self.emit_completed(&report);
        report
    }

    async fn drive(&self, request_id: u64, question: &str) -> WorkflowReport {
        let mut state = WorkflowState::new(question);
        let mut phase = Phase::Intent;
        let mut path = vec![phase];

        while !phase.is_terminal() {
            if path.len() > self.max_transitions {
                error!(
                    request_id,
                    transitions = path.len() - 1,
                    "Transition ceiling reached"
                );
                return failure_report(
                    request_id,
                    state,
                    FailureKind::SystemError,
                    "System error: workflow did not terminate",
                    path,
                );
            }

            self.step(request_id, phase, &mut state).await;
            let to = next(phase, &state);

            if to == Phase::SqlGen && phase != Phase::Intent {
                state.begin_retry();
                self.emit(WorkflowEvent::Retry {
                    request_id,
                    retry_count: state.retry_count,
                    kind: state
                        .last_failure
                        .clone()
                        .unwrap_or(FailureKind::GenerationFailure),
                    reason: state.error_message.clone().unwrap_or_default(),
                });
            }

            self.emit(WorkflowEvent::Transition {
                request_id,
                from: phase,
                to,
                retry_count: state.retry_count,
            });

            if to == Phase::Failure {
                let (kind, message) = if attempt_failed(phase, &state) {
                    let last = state.error_message.as_deref().unwrap_or("unknown error");
                    (
                        FailureKind::RetryExhausted,
                        format!("Max retries ({MAX_RETRIES}) exceeded. Last error: {last}"),
                    )
                } else {
                    warn!(request_id, phase = %phase, "Inconsistent workflow state");
                    (
                        FailureKind::SystemError,
                        "System error: inconsistent workflow state".to_string(),
                    )
                };
                path.push(to);
                return failure_report(request_id, state, kind, &message, path);
            }

            path.push(to);
            phase = to;
        }

        WorkflowReport {
            request_id,
            response: QueryResponse {
                validated_sql: state.validated_sql.clone(),
                summary: state.summary.clone(),
                chart_suggestion: state.chart_suggestion.clone(),
                error: None,
            },
            status: Phase::Success,
            failure: None,
            path,
            state,
        }
    }

    async fn step(&self, request_id: u64, phase: Phase, state: &mut WorkflowState) {
        match phase {
            Phase::Intent => self.interpret(request_id, state).await,
            Phase::SqlGen => self.generate_sql(request_id, state).await,
            Phase::Validate => self.validate(request_id, state),
            Phase::Execute => self.execute(request_id, state).await,
            Phase::Insight => self.summarize(request_id, state).await,
            Phase::Success | Phase::Failure => {}
        }
    }

    fn base_vars(&self, state: &WorkflowState) -> PromptVars {
        PromptVars::new()
            .with("user_query", state.user_query.clone())
            .with("schema", self.validator.schema().format_for_llm())
    }

    async fn interpret(&self, request_id: u64, state: &mut WorkflowState) {
        let vars = self.base_vars(state);
        let intent = match self.oracle.generate(PromptKind::Intent, &vars).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(request_id, "Empty intent, using the question");
                state.user_query.clone()
            }
            Err(e) => {
                warn!(request_id, "Intent generation failed, using the question: {}", e);
                state.user_query.clone()
            }
        };
        state.interpreted_intent = Some(intent);
    }

    async fn generate_sql(&self, request_id: u64, state: &mut WorkflowState) {
        let mut vars = self
            .base_vars(state)
            .with("intent", state.interpreted_intent.clone().unwrap_or_default());
        if let Some(previous) = &state.error_message {
            vars = vars.with("error_message", previous.clone());
        }

        let result = match self.oracle.generate(PromptKind::Sql, &vars).await {
            Ok(text) => {
                extract_sql(&text).ok_or_else(|| "Failed to generate valid SQL".to_string())
            }
            Err(e) => Err(format!("SQL generation failed: {}", e.message())),
        };

        match result {
            Ok(sql) => {
                state.generated_sql = Some(sql);
                state.error_message = None;
            }
            Err(reason) => {
                warn!(request_id, attempt = state.retry_count + 1, "{}", reason);
                state.generated_sql = None;
                state.error_message = Some(reason);
                state.last_failure = Some(FailureKind::GenerationFailure);
            }
        }
    }

    fn validate(&self, request_id: u64, state: &mut WorkflowState) {
        let Some(sql) = state.generated_sql.as_deref() else {
            state.error_message = Some("No SQL to validate".to_string());
            state.last_failure = Some(FailureKind::GenerationFailure);
            return;
        };

        let verdict = self.validator.validate(sql);
        self.emit(WorkflowEvent::Verdict {
            request_id,
            is_valid: verdict.is_valid,
            reason: verdict.reason.clone(),
            rule: verdict.rejection.as_ref().map(|r| r.rule()),
        });

        if verdict.is_valid {
            state.validated_sql = verdict.cleaned_sql;
            state.error_message = None;
        } else {
            state.validated_sql = None;
            state.last_failure = Some(FailureKind::ValidationFailure(
                verdict
                    .rejection
                    .as_ref()
                    .map(|r| r.rule())
                    .unwrap_or("unknown")
                    .to_string(),
            ));
            state.error_message = Some(verdict.reason);
        }
    }

    async fn execute(&self, request_id: u64, state: &mut WorkflowState) {
        let Some(sql) = state.validated_sql.clone() else {
            return;
        };

        let outcome = self.guard.run(&sql).await;
        self.emit(WorkflowEvent::Executed {
            request_id,
            row_count: outcome.row_count,
            truncated: outcome.truncated,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            error: outcome.error.clone(),
        });

        if let Some(err) = &outcome.error {
            state.error_message = Some(format!("Execution error: {err}"));
            state.validated_sql = None;
            state.last_failure = Some(FailureKind::ExecutionFailure);
        }
        state.execution_outcome = Some(outcome);
    }

    async fn summarize(&self, request_id: u64, state: &mut WorkflowState) {
        let Some(outcome) = state.execution_outcome.as_ref() else {
            return;
        };

        let vars = PromptVars::new()
            .with("user_query", state.user_query.clone())
            .with("sql", state.validated_sql.clone().unwrap_or_default())
            .with("result", render_result_for_prompt(outcome));

        let parsed = match self.oracle.generate(PromptKind::Insight, &vars).await {
            Ok(text) => parse_insight(&text),
            Err(e) => {
                warn!(request_id, "Insight generation failed: {}", e);
                None
            }
        };

        let heuristic = suggest_chart(outcome);
        let (summary, chart) = match parsed {
            Some(insight) => {
                let chart = insight
                    .chart
                    .as_deref()
                    .and_then(normalize_chart)
                    .unwrap_or(heuristic);
                (insight.summary, chart)
            }
            None => (fallback_summary(outcome), heuristic),
        };

        state.summary = Some(summary);
        state.chart_suggestion = Some(chart.to_string());
    }

    /// Sends one event to the sink; a panicking sink loses the event only.
    fn emit(&self, event: WorkflowEvent) {
        let sink = &self.sink;
        if std::panic::catch_unwind(AssertUnwindSafe(|| sink.emit(&event))).is_err() {
            warn!(event = event.name(), "Event sink panicked, event dropped");
        }
    }

    fn emit_completed(&self, report: &WorkflowReport) {
        self.emit(WorkflowEvent::Completed {
            request_id: report.request_id,
            status: report.status,
            retry_count: report.state.retry_count,
            failure: report.failure.clone(),
        });
    }
}

/// Trims a question and rejects empty or over-long input.
fn check_question(question: &str) -> std::result::Result<&str, String> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err("Query cannot be empty or whitespace-only".to_string());
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(format!(
            "Query exceeds maximum length of {MAX_QUESTION_CHARS} characters"
        ));
    }
    Ok(trimmed)
}

fn failure_report(
    request_id: u64,
    mut state: WorkflowState,
    kind: FailureKind,
    message: impl AsRef<str>,
    path: Vec<Phase>,
) -> WorkflowReport {
    state.mark_failed();
    let response = QueryResponse::failure(message.as_ref());
    state.error_message = response.error.clone();

    WorkflowReport {
        request_id,
        response,
        status: Phase::Failure,
        failure: Some(kind),
        path,
        state,
    }
}
