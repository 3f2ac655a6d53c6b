//! Integration tests for askdb.
//!
//! Shared fixtures: an on-disk banking database opened read-only.

pub mod executor_test;
pub mod validator_test;
pub mod workflow_test;

use std::sync::Arc;

use askdb::db::{self, DatabaseClient, SchemaDescriptor};
use askdb::safety::{LimitPolicy, SqlValidator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tempfile::TempDir;

/// Number of seeded customers, two of them premium.
pub const CUSTOMER_COUNT: i64 = 6;

/// Number of seeded transactions.
pub const TRANSACTION_COUNT: i64 = 30;

/// Validator over the banking whitelist with the default limit policy.
pub fn banking_validator() -> Arc<SqlValidator> {
    Arc::new(SqlValidator::new(
        Arc::new(SchemaDescriptor::banking()),
        LimitPolicy::default(),
    ))
}

/// Creates the banking tables through a writable pool, then reopens the
/// file through the read-only client.
pub async fn seeded_bank() -> (TempDir, Arc<dyn DatabaseClient>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("banking.db");

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for ddl in [
        "CREATE TABLE customers (
            customer_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            account_type TEXT,
            created_at DATETIME,
            status TEXT
        )",
        "CREATE TABLE accounts (
            account_id INTEGER PRIMARY KEY,
            customer_id INTEGER REFERENCES customers(customer_id),
            account_number TEXT,
            balance REAL,
            account_type TEXT,
            created_at DATETIME,
            status TEXT
        )",
        "CREATE TABLE transactions (
            transaction_id INTEGER PRIMARY KEY,
            account_id INTEGER REFERENCES accounts(account_id),
            transaction_type TEXT,
            amount REAL,
            description TEXT,
            transaction_date DATETIME,
            status TEXT,
            merchant TEXT
        )",
    ] {
        sqlx::query(ddl).execute(&pool).await.unwrap();
    }

    for i in 1..=CUSTOMER_COUNT {
        let account_type = if i <= 2 { "premium" } else { "standard" };
        sqlx::query(
            "INSERT INTO customers (customer_id, name, email, account_type, status)
             VALUES (?, ?, ?, ?, 'active')",
        )
        .bind(i)
        .bind(format!("Customer {i}"))
        .bind(format!("customer{i}@example.com"))
        .bind(account_type)
        .execute(&pool)
        .await
        .unwrap();

        let kind = if i % 2 == 0 { "savings" } else { "checking" };
        sqlx::query(
            "INSERT INTO accounts (account_id, customer_id, account_number, balance, account_type, status)
             VALUES (?, ?, ?, ?, ?, 'open')",
        )
        .bind(i)
        .bind(i)
        .bind(format!("ACC-{i:04}"))
        .bind(i as f64 * 1000.0)
        .bind(kind)
        .execute(&pool)
        .await
        .unwrap();
    }

    for i in 1..=TRANSACTION_COUNT {
        let status = if i % 10 == 0 { "failed" } else { "completed" };
        sqlx::query(
            "INSERT INTO transactions
             (transaction_id, account_id, transaction_type, amount, description, transaction_date, status, merchant)
             VALUES (?, ?, 'debit', ?, ?, ?, ?, ?)",
        )
        .bind(i)
        .bind(i % CUSTOMER_COUNT + 1)
        .bind(i as f64 * 500.0)
        .bind(format!("Payment {i}"))
        .bind(format!("2024-03-{:02} 09:30:00", i))
        .bind(status)
        .bind(format!("Merchant {}", i % 4))
        .execute(&pool)
        .await
        .unwrap();
    }
    pool.close().await;

    let url = format!("sqlite://{}", path.display());
    let client = db::connect(&url).await.unwrap();
    (dir, client)
}
