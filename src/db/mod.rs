//! Database abstraction layer for askdb.
//!
//! Provides a trait-based interface for read-only query execution, so the
//! execution guard can run against SQLite or an in-memory mock.

mod mock;
mod schema;
mod sqlite;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient, SlowDatabaseClient};
pub use schema::{SchemaDescriptor, TableSpec};
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, QueryResult, Record, Row, Value};

use crate::error::{AskError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens a database client for the given URL.
///
/// This is the central factory function for datastore handles.
pub async fn connect(url: &str) -> Result<Arc<dyn DatabaseClient>> {
    let parsed = url::Url::parse(url)
        .map_err(|e| AskError::config(format!("Invalid database URL '{url}': {e}")))?;

    match parsed.scheme() {
        "sqlite" => {
            let client = SqliteClient::connect(url).await?;
            Ok(Arc::new(client))
        }
        other => Err(AskError::config(format!(
            "Unsupported database scheme '{other}'. Only sqlite: URLs are supported."
        ))),
    }
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with AskError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a SQL query, returning at most `max_rows` rows.
    ///
    /// Sets `was_truncated` when more rows were available.
    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult>;

    /// Lists the user tables and views present in the datastore.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
