//! Mock database clients for testing.
//!
//! Provides in-memory implementations for headless runs (`--mock-db`) and for
//! exercising the execution guard's failure paths.

use super::{ColumnInfo, DatabaseClient, QueryResult, Value};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A mock database client that returns a predefined result.
pub struct MockDatabaseClient {
    result: QueryResult,
    tables: Vec<String>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a mock that answers every query with one echo row.
    pub fn new() -> Self {
        Self {
            result: QueryResult::with_data(
                vec![ColumnInfo::new("result", "TEXT")],
                vec![vec![Value::from("mock row")]],
            ),
            tables: vec![
                "accounts".to_string(),
                "customers".to_string(),
                "transactions".to_string(),
            ],
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock that answers every query with the given result.
    pub fn with_result(result: QueryResult) -> Self {
        Self {
            result,
            ..Self::new()
        }
    }

    /// Sets the tables reported by `list_tables`.
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Returns every SQL string this client was asked to execute.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        let mut result = self.result.clone();
        if result.rows.len() > max_rows {
            result.rows.truncate(max_rows);
            result.was_truncated = true;
        }
        result.row_count = result.rows.len();
        result.execution_time = Duration::from_millis(1);
        Ok(result)
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A database client that fails every query with the given message.
pub struct FailingDatabaseClient {
    message: String,
}

impl FailingDatabaseClient {
    /// Creates a client whose queries fail with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn execute_query(&self, _sql: &str, _max_rows: usize) -> Result<QueryResult> {
        Err(AskError::query(self.message.clone()))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Err(AskError::connection(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A database client that sleeps before answering, for deadline tests.
pub struct SlowDatabaseClient {
    delay: Duration,
    inner: MockDatabaseClient,
}

impl SlowDatabaseClient {
    /// Creates a client that waits `delay` before every query.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: MockDatabaseClient::new(),
        }
    }
}

#[async_trait]
impl DatabaseClient for SlowDatabaseClient {
    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.execute_query(sql, max_rows).await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
