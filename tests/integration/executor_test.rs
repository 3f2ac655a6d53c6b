//! Execution guard integration tests against a read-only SQLite file.

use std::sync::Arc;
use std::time::Duration;

use askdb::db::{SlowDatabaseClient, Value};
use askdb::query::ExecutionGuard;
use pretty_assertions::assert_eq;

use super::{seeded_bank, CUSTOMER_COUNT, TRANSACTION_COUNT};

#[tokio::test]
async fn test_rows_are_ordered_records() {
    let (_dir, db) = seeded_bank().await;
    let guard = ExecutionGuard::new(db, Duration::from_secs(5), 100);

    let outcome = guard
        .run("SELECT customer_id, name, phone FROM customers ORDER BY customer_id LIMIT 2")
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.row_count, 2);
    assert!(!outcome.truncated);

    let names: Vec<&str> = outcome.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["customer_id", "name", "phone"]);

    let first = &outcome.rows[0];
    assert_eq!(first.columns().collect::<Vec<_>>(), names);
    assert_eq!(first.get("customer_id"), Some(&Value::Int(1)));
    assert_eq!(first.get("name"), Some(&Value::String("Customer 1".to_string())));
    assert_eq!(first.get("phone"), Some(&Value::Null));
}

#[tokio::test]
async fn test_row_cap_truncates() {
    let (_dir, db) = seeded_bank().await;
    let guard = ExecutionGuard::new(db, Duration::from_secs(5), 10);

    let outcome = guard.run("SELECT * FROM transactions LIMIT 100").await;

    assert!(outcome.is_success());
    assert_eq!(outcome.row_count, 10);
    assert_eq!(outcome.rows.len(), 10);
    assert!(outcome.truncated);
}

#[tokio::test]
async fn test_exact_cap_is_not_truncated() {
    let (_dir, db) = seeded_bank().await;
    let guard = ExecutionGuard::new(db, Duration::from_secs(5), TRANSACTION_COUNT as usize);

    let outcome = guard.run("SELECT * FROM transactions").await;

    assert_eq!(outcome.row_count, TRANSACTION_COUNT as usize);
    assert!(!outcome.truncated);
}

#[tokio::test]
async fn test_aggregate_and_empty_results() {
    let (_dir, db) = seeded_bank().await;
    let guard = ExecutionGuard::new(db, Duration::from_secs(5), 100);

    let outcome = guard
        .run("SELECT COUNT(*) AS customer_count FROM customers WHERE account_type = 'premium'")
        .await;
    assert_eq!(outcome.row_count, 1);
    assert_eq!(outcome.rows[0].get("customer_count"), Some(&Value::Int(2)));

    let outcome = guard
        .run("SELECT name FROM customers WHERE customer_id > 1000")
        .await;
    assert!(outcome.is_success());
    assert_eq!(outcome.row_count, 0);
    assert_eq!(outcome.columns.len(), 1);
    assert_eq!(outcome.columns[0].name, "name");
}

#[tokio::test]
async fn test_datastore_error_becomes_outcome_error() {
    let (_dir, db) = seeded_bank().await;
    let guard = ExecutionGuard::new(db, Duration::from_secs(5), 100);

    let outcome = guard.run("SELECT no_such_column FROM customers").await;

    assert!(!outcome.is_success());
    assert!(outcome.rows.is_empty());
    assert_eq!(outcome.row_count, 0);
    assert!(outcome.error.unwrap().contains("no_such_column"));
}

#[tokio::test]
async fn test_writes_never_reach_the_datastore() {
    let (_dir, db) = seeded_bank().await;
    let guard = ExecutionGuard::new(Arc::clone(&db), Duration::from_secs(5), 100);

    let outcome = guard.run("DELETE FROM customers").await;
    assert!(outcome.error.unwrap().starts_with("Refused to execute"));

    // The handle itself is read-only as well.
    let err = db.execute_query("DELETE FROM customers", 10).await.unwrap_err();
    assert!(err.to_string().to_lowercase().contains("readonly"));

    let outcome = guard.run("SELECT COUNT(*) AS n FROM customers").await;
    assert_eq!(outcome.rows[0].get("n"), Some(&Value::Int(CUSTOMER_COUNT)));
}

#[tokio::test]
async fn test_timeout_returns_no_rows() {
    let guard = ExecutionGuard::new(
        Arc::new(SlowDatabaseClient::new(Duration::from_secs(5))),
        Duration::from_millis(50),
        100,
    );

    let outcome = guard.run("SELECT * FROM transactions").await;

    assert!(outcome.rows.is_empty());
    assert!(outcome.error.unwrap().contains("timeout"));
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_list_tables() {
    let (_dir, db) = seeded_bank().await;

    let tables = db.list_tables().await.unwrap();

    assert_eq!(tables, vec!["accounts", "customers", "transactions"]);
}
