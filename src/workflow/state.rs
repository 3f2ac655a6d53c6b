//! Workflow state and routing.
//!
//! [`next`] is the whole routing table. It reads only the state, never
//! mutates it, and sends anything it does not recognize to
//! [`Phase::Failure`].

use serde::Serialize;
use std::fmt;

use crate::query::ExecutionOutcome;

/// Retries allowed after the first SQL generation attempt.
pub const MAX_RETRIES: u32 = 2;

/// Upper bound on transitions in one workflow.
///
/// The longest legal path is intent, three full attempts of
/// generate/validate/execute, then insight and success.
pub const MAX_TRANSITIONS: usize = 3 * MAX_RETRIES as usize + 5;

/// A workflow phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Interpret the question.
    Intent,
    /// Generate SQL.
    SqlGen,
    /// Run the safety validator.
    Validate,
    /// Run the execution guard.
    Execute,
    /// Summarize the result.
    Insight,
    /// Terminal: a summary is available.
    Success,
    /// Terminal: an error message is available.
    Failure,
}

impl Phase {
    /// Returns true for `Success` and `Failure`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Returns the phase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::SqlGen => "sql_gen",
            Self::Validate => "validate",
            Self::Execute => "execute",
            Self::Insight => "insight",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a workflow, or one attempt within it, failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rule", rename_all = "snake_case")]
pub enum FailureKind {
    /// The question was rejected before the state machine started.
    InputError,
    /// The oracle produced no usable SQL.
    GenerationFailure,
    /// The validator rejected the SQL; carries the rule name.
    ValidationFailure(String),
    /// The datastore failed or timed out.
    ExecutionFailure,
    /// Every allowed attempt failed.
    RetryExhausted,
    /// Panic, transition ceiling or inconsistent state.
    SystemError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputError => f.write_str("input_error"),
            Self::GenerationFailure => f.write_str("generation_failure"),
            Self::ValidationFailure(rule) => write!(f, "validation_failure({rule})"),
            Self::ExecutionFailure => f.write_str("execution_failure"),
            Self::RetryExhausted => f.write_str("retry_exhausted"),
            Self::SystemError => f.write_str("system_error"),
        }
    }
}

/// Everything one workflow knows about its request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowState {
    pub user_query: String,
    pub interpreted_intent: Option<String>,
    pub generated_sql: Option<String>,
    pub validated_sql: Option<String>,
    pub execution_outcome: Option<ExecutionOutcome>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub summary: Option<String>,
    pub chart_suggestion: Option<String>,
    /// Kind of the most recent failed attempt.
    pub last_failure: Option<FailureKind>,
}

impl WorkflowState {
    /// Creates the initial state for a question.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Self::default()
        }
    }

    /// Prepares the state for another SQL generation attempt.
    ///
    /// Keeps `error_message` so the next prompt can refer to it.
    pub(crate) fn begin_retry(&mut self) {
        self.retry_count += 1;
        self.generated_sql = None;
        self.validated_sql = None;
        self.execution_outcome = None;
    }

    /// Clears everything a failed workflow must not report.
    pub(crate) fn mark_failed(&mut self) {
        self.validated_sql = None;
        self.summary = None;
        self.chart_suggestion = None;
    }
}

/// Returns true if the step that just ran in `phase` recorded a failed
/// attempt that the retry loop may handle.
pub fn attempt_failed(phase: Phase, state: &WorkflowState) -> bool {
    let has_error = state.error_message.is_some();
    match phase {
        Phase::SqlGen => state.generated_sql.is_none() && has_error,
        Phase::Validate => state.validated_sql.is_none() && has_error,
        Phase::Execute => {
            state.validated_sql.is_none()
                && has_error
                && state
                    .execution_outcome
                    .as_ref()
                    .is_some_and(|o| o.error.is_some())
        }
        _ => false,
    }
}

/// Routes from `phase` given the state its step left behind.
pub fn next(phase: Phase, state: &WorkflowState) -> Phase {
    if attempt_failed(phase, state) {
        return if state.retry_count < MAX_RETRIES {
            Phase::SqlGen
        } else {
            Phase::Failure
        };
    }

    let clean = state.error_message.is_none();
    match phase {
        Phase::Intent if state.interpreted_intent.is_some() => Phase::SqlGen,
        Phase::SqlGen if clean && state.generated_sql.is_some() => Phase::Validate,
        Phase::Validate if clean && state.validated_sql.is_some() => Phase::Execute,
        Phase::Execute
            if clean
                && state.validated_sql.is_some()
                && state
                    .execution_outcome
                    .as_ref()
                    .is_some_and(ExecutionOutcome::is_success) =>
        {
            Phase::Insight
        }
        Phase::Insight if clean && state.summary.is_some() => Phase::Success,
        Phase::Success => Phase::Success,
        _ => Phase::Failure,
    }
}
