//! Workflow observability events.
//!
//! The orchestrator emits one event per transition, verdict, retry,
//! execution outcome and terminal status. Sinks cannot fail the workflow.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::workflow::state::{FailureKind, Phase};

/// Something that happened inside one workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A question passed input validation.
    Started { request_id: u64, query_chars: usize },
    /// The state machine moved between phases.
    Transition {
        request_id: u64,
        from: Phase,
        to: Phase,
        retry_count: u32,
    },
    /// The validator returned a verdict.
    Verdict {
        request_id: u64,
        is_valid: bool,
        reason: String,
        rule: Option<&'static str>,
    },
    /// A failed attempt is being retried.
    Retry {
        request_id: u64,
        retry_count: u32,
        kind: FailureKind,
        reason: String,
    },
    /// The execution guard finished.
    Executed {
        request_id: u64,
        row_count: usize,
        truncated: bool,
        elapsed_ms: u64,
        error: Option<String>,
    },
    /// The workflow reached a terminal phase.
    Completed {
        request_id: u64,
        status: Phase,
        retry_count: u32,
        failure: Option<FailureKind>,
    },
}

/// Receives workflow events.
///
/// A panic inside `emit` drops that event; the workflow carries on.
pub trait EventSink: Send + Sync {
    /// Records one event. Should not block for long.
    fn emit(&self, event: &WorkflowEvent);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::Started {
                request_id,
                query_chars,
            } => info!(event = "started", request_id, query_chars, "Workflow started"),
            WorkflowEvent::Transition {
                request_id,
                from,
                to,
                retry_count,
            } => debug!(
                event = "transition",
                request_id,
                from = %from,
                phase = %to,
                retry_count,
                "Workflow transition"
            ),
            WorkflowEvent::Verdict {
                request_id,
                is_valid,
                reason,
                rule,
            } => info!(
                event = "verdict",
                request_id,
                is_valid,
                reason = %reason,
                rule = rule.unwrap_or("none"),
                "Validation verdict"
            ),
            WorkflowEvent::Retry {
                request_id,
                retry_count,
                kind,
                reason,
            } => warn!(
                event = "retry",
                request_id,
                retry_count,
                kind = %kind,
                reason = %reason,
                "Retrying SQL generation"
            ),
            WorkflowEvent::Executed {
                request_id,
                row_count,
                truncated,
                elapsed_ms,
                error,
            } => info!(
                event = "executed",
                request_id,
                row_count,
                truncated,
                elapsed_ms,
                error = error.as_deref().unwrap_or(""),
                "Query executed"
            ),
            WorkflowEvent::Completed {
                request_id,
                status,
                retry_count,
                failure,
            } => info!(
                event = "completed",
                request_id,
                phase = %status,
                retry_count,
                failure = %failure.as_ref().map(ToString::to_string).unwrap_or_default(),
                "Workflow completed"
            ),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events recorded so far.
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Returns the events of one request.
    pub fn events_for(&self, request_id: u64) -> Vec<WorkflowEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.request_id() == request_id)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &WorkflowEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

impl WorkflowEvent {
    /// Returns the request the event belongs to.
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Started { request_id, .. }
            | Self::Transition { request_id, .. }
            | Self::Verdict { request_id, .. }
            | Self::Retry { request_id, .. }
            | Self::Executed { request_id, .. }
            | Self::Completed { request_id, .. } => *request_id,
        }
    }

    /// Short event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Transition { .. } => "transition",
            Self::Verdict { .. } => "verdict",
            Self::Retry { .. } => "retry",
            Self::Executed { .. } => "executed",
            Self::Completed { .. } => "completed",
        }
    }
}
