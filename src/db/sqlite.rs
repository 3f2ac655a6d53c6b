//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `DatabaseClient` trait
//! for SQLite databases using sqlx. Connections are opened read-only.

use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 200;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens a read-only pool for the given `sqlite:` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AskError::config(format!("Invalid database URL '{url}': {e}")))?
            .read_only(true);

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await;

            match result {
                Ok(pool) => {
                    debug!("Opened read-only database");
                    return Ok(Self { pool });
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, url)),
            }
        }
    }

    /// Creates a SqliteClient from an existing connection pool.
    ///
    /// The caller is responsible for the pool's access mode.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Column metadata for a statement that produced no rows.
    async fn fetch_column_metadata(&self, sql: &str) -> Result<Vec<ColumnInfo>> {
        let statement = (&self.pool)
            .prepare(sql)
            .await
            .map_err(|e| AskError::query(format_query_error(e)))?;

        Ok(statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), declared_type(col.type_info().name())))
            .collect())
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        let start = Instant::now();

        let mut stream = sqlx::query(sql).fetch(&self.pool);
        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        let mut was_truncated = false;

        // Pull at most max_rows + 1 rows; the extra one only signals truncation.
        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| AskError::query(format_query_error(e)))?
        {
            if columns.is_empty() {
                columns = row
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), declared_type(col.type_info().name())))
                    .collect();
            }

            if rows.len() == max_rows {
                was_truncated = true;
                break;
            }

            rows.push(convert_row(&row));
        }
        drop(stream);

        let execution_time = start.elapsed();

        if was_truncated {
            warn!("Query returned more than {} rows, truncating", max_rows);
        }

        if columns.is_empty() {
            columns = self.fetch_column_metadata(sql).await.unwrap_or_default();
        }

        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
            was_truncated,
        })
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type IN ('table', 'view')
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::query(format_query_error(e)))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Expression columns report "NULL" as their declared type.
fn declared_type(name: &str) -> &str {
    if name == "NULL" {
        ""
    } else {
        name
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a SqliteRow to our Value type.
///
/// Decoding follows the value's runtime storage class; the declared type is
/// consulted only to surface booleans.
fn convert_value(row: &SqliteRow, index: usize, declared: &str) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" => {
            let value = row.try_get_unchecked::<i64, _>(index).ok();
            if declared.to_uppercase().contains("BOOL") {
                value.map(|v| Value::Bool(v != 0)).unwrap_or(Value::Null)
            } else {
                value.map(Value::Int).unwrap_or(Value::Null)
            }
        }

        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .ok()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .ok()
            .map(Value::from)
            .unwrap_or(Value::Null),

        // Dates and times are stored as text and pass through unchanged.
        _ => row
            .try_get_unchecked::<String, _>(index)
            .ok()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    error_str.contains("database is locked")
        || error_str.contains("busy")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, url: &str) -> AskError {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("unable to open database file") {
        AskError::connection(format!(
            "Cannot open database '{path}'. Check that the file exists and is readable."
        ))
    } else if error_str.contains("file is not a database") {
        AskError::connection(format!("'{path}' is not a SQLite database."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        AskError::connection(format!(
            "Opening '{path}' timed out. Another process may hold a lock."
        ))
    } else {
        AskError::connection(error.to_string())
    }
}

/// Formats a query error, keeping the datastore's own message and code.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => {
            let mut result = format!("ERROR: {}", db_error.message());
            if let Some(code) = db_error.code() {
                result.push_str("\n  CODE: ");
                result.push_str(&code);
            }
            result
        }
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Creates an on-disk database through a writable pool, then reopens it read-only.
    async fn seeded_client() -> (TempDir, SqliteClient) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.db");

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE transactions (
                transaction_id INTEGER PRIMARY KEY,
                amount REAL,
                merchant TEXT,
                flagged BOOLEAN,
                transaction_date DATETIME,
                memo BLOB
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        for i in 1..=5 {
            sqlx::query(
                "INSERT INTO transactions (transaction_id, amount, merchant, flagged, transaction_date, memo)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(i as i64)
            .bind(i as f64 * 5000.0)
            .bind(format!("Merchant {i}"))
            .bind(i % 2 == 0)
            .bind(format!("2024-01-0{i} 10:00:00"))
            .bind(vec![0x68u8, 0x69, 0xff])
            .execute(&pool)
            .await
            .unwrap();
        }
        pool.close().await;

        let client = SqliteClient::connect(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        (dir, client)
    }

    #[tokio::test]
    async fn test_execute_select_converts_values() {
        let (_dir, client) = seeded_client().await;
        let result = client
            .execute_query(
                "SELECT transaction_id, amount, merchant, flagged, transaction_date, memo
                 FROM transactions WHERE transaction_id = 2",
                10,
            )
            .await
            .unwrap();

        assert_eq!(result.row_count, 1);
        assert!(!result.was_truncated);
        assert_eq!(result.columns[0].name, "transaction_id");
        assert_eq!(
            result.rows[0],
            vec![
                Value::Int(2),
                Value::Float(10000.0),
                Value::String("Merchant 2".to_string()),
                Value::Bool(true),
                Value::String("2024-01-02 10:00:00".to_string()),
                Value::String("hi\u{fffd}".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_query_truncates_at_cap() {
        let (_dir, client) = seeded_client().await;
        let result = client
            .execute_query("SELECT * FROM transactions", 3)
            .await
            .unwrap();

        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows.len(), 3);
        assert!(result.was_truncated);
    }

    #[tokio::test]
    async fn test_execute_query_exact_cap_is_not_truncated() {
        let (_dir, client) = seeded_client().await;
        let result = client
            .execute_query("SELECT * FROM transactions", 5)
            .await
            .unwrap();

        assert_eq!(result.row_count, 5);
        assert!(!result.was_truncated);
    }

    #[tokio::test]
    async fn test_empty_result_keeps_column_metadata() {
        let (_dir, client) = seeded_client().await;
        let result = client
            .execute_query("SELECT transaction_id, amount FROM transactions WHERE 1 = 0", 10)
            .await
            .unwrap();

        assert!(result.is_empty());
        let names: Vec<_> = result.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["transaction_id", "amount"]);
    }

    #[tokio::test]
    async fn test_execute_query_with_error() {
        let (_dir, client) = seeded_client().await;
        let err = client
            .execute_query("SELECT * FROM nonexistent_table", 10)
            .await
            .unwrap_err();

        assert_eq!(err.category(), "Query Error");
        assert!(err.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn test_connection_is_read_only() {
        let (_dir, client) = seeded_client().await;
        let err = client
            .execute_query("DELETE FROM transactions", 10)
            .await
            .unwrap_err();

        assert!(err.to_string().to_lowercase().contains("readonly"));
    }

    #[tokio::test]
    async fn test_list_tables() {
        let (_dir, client) = seeded_client().await;
        let tables = client.list_tables().await.unwrap();
        assert_eq!(tables, vec!["transactions".to_string()]);
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_error_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("missing.db").display());

        let err = SqliteClient::connect(&url).await.unwrap_err();
        assert_eq!(err.category(), "Connection Error");
        assert!(err.to_string().contains("missing.db"));
    }

    #[test]
    fn test_is_transient_error() {
        assert!(is_transient_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient_error(&sqlx::Error::RowNotFound));
    }
}
