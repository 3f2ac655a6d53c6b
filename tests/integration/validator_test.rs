//! Safety validator integration tests.
//!
//! Verdicts are checked against the banking whitelist, and accepted SQL is
//! run against a seeded database to confirm the cleaned form executes.

use std::sync::Arc;
use std::time::Duration;

use askdb::db::{SchemaDescriptor, TableSpec};
use askdb::query::ExecutionGuard;
use askdb::safety::{LimitPolicy, Rejection, SqlValidator};
use pretty_assertions::assert_eq;

use super::{banking_validator, seeded_bank, TRANSACTION_COUNT};

#[test]
fn test_missing_limit_gets_default() {
    let verdict = banking_validator().validate("SELECT * FROM transactions");

    assert!(verdict.is_valid);
    assert_eq!(verdict.reason, "VALID");
    assert_eq!(
        verdict.cleaned_sql.as_deref(),
        Some("SELECT * FROM transactions LIMIT 100")
    );
}

#[test]
fn test_stacked_drop_rejected() {
    let verdict =
        banking_validator().validate("SELECT * FROM transactions; DROP TABLE customers;");

    assert!(!verdict.is_valid);
    assert!(verdict.cleaned_sql.is_none());
    assert!(
        verdict.reason.contains("Multiple statements") || verdict.reason.contains("DROP"),
        "unexpected reason: {}",
        verdict.reason
    );
}

#[test]
fn test_unknown_table_named_in_reason() {
    let verdict = banking_validator().validate("SELECT * FROM nonexistent_table");

    assert!(!verdict.is_valid);
    assert!(verdict.reason.contains("nonexistent_table"));
    assert_eq!(
        verdict.rejection,
        Some(Rejection::UnknownTables(vec!["nonexistent_table".to_string()]))
    );
}

#[test]
fn test_rule_order_is_stable() {
    let validator = banking_validator();

    // NotSelect wins over everything after it.
    let verdict = validator.validate("DELETE FROM customers; SELECT 1");
    assert_eq!(verdict.rejection.map(|r| r.rule()), Some("not_select"));

    // Forbidden keywords are checked before the whitelist.
    let verdict = validator.validate("SELECT * FROM secrets WHERE x = 'a' OR drop_me");
    assert_eq!(verdict.rejection.map(|r| r.rule()), Some("unknown_tables"));

    let verdict = validator.validate("SELECT * FROM secrets WHERE DELETE");
    assert_eq!(verdict.rejection.map(|r| r.rule()), Some("forbidden_keywords"));
}

#[test]
fn test_keywords_inside_string_literals_are_ignored() {
    let verdict = banking_validator()
        .validate("SELECT * FROM transactions WHERE description = 'refund; drop shipping'");

    assert!(verdict.is_valid, "rejected: {}", verdict.reason);
}

#[test]
fn test_deeply_nested_query_rejected_by_length() {
    let sql = format!(
        "SELECT * FROM customers WHERE 1=0{}",
        " OR customer_id IN (SELECT customer_id FROM accounts LIMIT 1)".repeat(5000)
    );
    let verdict = banking_validator().validate(&sql);

    assert!(!verdict.is_valid);
    assert_eq!(verdict.rejection, Some(Rejection::TooLong(5000)));
}

#[test]
fn test_custom_whitelist_and_policy() {
    let schema = SchemaDescriptor::new(vec![TableSpec::new("ledger", ["entry_id", "amount"])]).unwrap();
    let validator = SqlValidator::new(
        Arc::new(schema),
        LimitPolicy {
            default_limit: 10,
            max_limit: 50,
            ..LimitPolicy::default()
        },
    );

    assert_eq!(
        validator.validate("SELECT * FROM ledger").cleaned_sql.as_deref(),
        Some("SELECT * FROM ledger LIMIT 10")
    );
    assert_eq!(
        validator
            .validate("SELECT * FROM ledger LIMIT 500")
            .cleaned_sql
            .as_deref(),
        Some("SELECT * FROM ledger LIMIT 50")
    );
    assert!(!validator.validate("SELECT * FROM transactions").is_valid);
}

#[tokio::test]
async fn test_cleaned_sql_executes() {
    let (_dir, db) = seeded_bank().await;
    let guard = ExecutionGuard::new(db, Duration::from_secs(5), 1000);
    let validator = banking_validator();

    for sql in [
        "SELECT * FROM transactions",
        "SELECT c.name, a.balance FROM customers c JOIN accounts a ON a.customer_id = c.customer_id",
        "SELECT * FROM customers WHERE customer_id IN (SELECT customer_id FROM accounts WHERE balance > 3000)",
        "SELECT merchant, COUNT(*) AS n FROM transactions GROUP BY merchant ORDER BY n DESC LIMIT 10, 2",
        "SELECT * FROM main.accounts -- trailing comment",
    ] {
        let verdict = validator.validate(sql);
        assert!(verdict.is_valid, "{sql}: {}", verdict.reason);

        let cleaned = verdict.cleaned_sql.unwrap();
        let outcome = guard.run(&cleaned).await;
        assert!(outcome.is_success(), "{cleaned}: {:?}", outcome.error);
    }

    let outcome = guard
        .run(
            validator
                .validate("SELECT * FROM transactions")
                .cleaned_sql
                .as_deref()
                .unwrap(),
        )
        .await;
    assert_eq!(outcome.row_count, TRANSACTION_COUNT as usize);
}
