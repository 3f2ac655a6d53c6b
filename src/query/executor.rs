//! Bounded query execution.
//!
//! The execution guard runs validator-approved SQL against a read-only
//! datastore handle under a deadline and a row cap. It never returns an
//! error: every failure is folded into [`ExecutionOutcome::error`] so the
//! workflow can route it back into the retry loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Record};
use crate::safety::{classify_sql, StatementType};

/// Default deadline for a single query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of rows returned.
pub const DEFAULT_ROW_CAP: usize = 1000;

/// Result of one execution attempt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionOutcome {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,
    /// Rows as ordered column-to-value records.
    pub rows: Vec<Record>,
    /// Number of rows actually returned.
    pub row_count: usize,
    /// True when the datastore had more rows than the cap.
    pub truncated: bool,
    /// Wall-clock time of the attempt, for observability only.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Set when the attempt failed; rows are empty in that case.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Builds a successful outcome from a datastore result.
    pub fn from_result(result: QueryResult, elapsed: Duration) -> Self {
        let rows = result.records();
        Self {
            row_count: rows.len(),
            columns: result.columns,
            rows,
            truncated: result.was_truncated,
            elapsed,
            error: None,
        }
    }

    /// Builds a failed outcome with no rows.
    pub fn failed(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            elapsed,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Returns true if the attempt succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Runs validated SQL under a deadline and a row cap.
#[derive(Clone)]
pub struct ExecutionGuard {
    db: Arc<dyn DatabaseClient>,
    timeout: Duration,
    row_cap: usize,
}

impl ExecutionGuard {
    /// Creates a guard over the given datastore handle.
    pub fn new(db: Arc<dyn DatabaseClient>, timeout: Duration, row_cap: usize) -> Self {
        Self {
            db,
            timeout,
            row_cap,
        }
    }

    /// Executes `sql` and reports the outcome.
    ///
    /// SQL that does not parse as one read-only statement is refused without
    /// touching the datastore. On timeout the query task is aborted and the
    /// outcome carries no rows; an in-flight SQLite call may still finish on
    /// its worker thread.
    pub async fn run(&self, sql: &str) -> ExecutionOutcome {
        let start = Instant::now();

        let classification = classify_sql(sql);
        let single = !matches!(classification.statement_type, StatementType::Multiple(_));
        if !(classification.is_read_only() && single) {
            let reason = classification.warning.unwrap_or_else(|| {
                format!("{} statements are not allowed", classification.statement_type)
            });
            warn!(level = %classification.level, "Refusing to execute: {}", reason);
            return ExecutionOutcome::failed(
                format!("Refused to execute: {reason}"),
                start.elapsed(),
            );
        }

        let db = Arc::clone(&self.db);
        let owned_sql = sql.to_string();
        let row_cap = self.row_cap;
        let mut task = tokio::spawn(async move { db.execute_query(&owned_sql, row_cap).await });

        let outcome = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(result))) => ExecutionOutcome::from_result(result, start.elapsed()),
            Ok(Ok(Err(e))) => ExecutionOutcome::failed(e.message(), start.elapsed()),
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    "Query task panicked"
                } else {
                    "Query task was cancelled"
                };
                ExecutionOutcome::failed(message, start.elapsed())
            }
            Err(_) => {
                task.abort();
                ExecutionOutcome::failed(
                    format!("Query exceeded {:?} timeout", self.timeout),
                    start.elapsed(),
                )
            }
        };

        match &outcome.error {
            None => debug!(
                row_count = outcome.row_count,
                truncated = outcome.truncated,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Query executed"
            ),
            Some(error) => warn!(
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Query failed: {}", error
            ),
        }

        outcome
    }
}
