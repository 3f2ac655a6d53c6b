//! Workflow integration tests.
//!
//! Scripted oracles drive the state machine through its retry paths while
//! the validator and execution guard run for real.

use std::sync::Arc;
use std::time::Duration;

use askdb::db::{DatabaseClient, SlowDatabaseClient, Value};
use askdb::llm::PromptKind;
use askdb::oracle::{Oracle, RuleBasedOracle, ScriptedOracle};
use askdb::query::ExecutionGuard;
use askdb::workflow::{
    FailureKind, Orchestrator, Phase, RecordingSink, WorkflowEvent, MAX_RETRIES, MAX_TRANSITIONS,
};
use pretty_assertions::assert_eq;

use super::{banking_validator, seeded_bank};

const INSIGHT: &str = r#"{"summary": "Premium customers listed.", "chart": "table"}"#;

fn orchestrator(
    oracle: Arc<dyn Oracle>,
    db: Arc<dyn DatabaseClient>,
    sink: Arc<RecordingSink>,
) -> Orchestrator {
    let guard = ExecutionGuard::new(db, Duration::from_secs(5), 1000);
    Orchestrator::new(oracle, banking_validator(), guard).with_sink(sink)
}

fn transitions(events: &[WorkflowEvent]) -> Vec<(Phase, Phase, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::Transition {
                from,
                to,
                retry_count,
                ..
            } => Some((*from, *to, *retry_count)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_third_attempt_succeeds_after_two_rejections() {
    let (_dir, db) = seeded_bank().await;
    let sink = Arc::new(RecordingSink::new());
    let oracle = Arc::new(
        ScriptedOracle::new()
            .always(PromptKind::Intent, "List premium customers")
            .then(PromptKind::Sql, "SELECT * FROM users")
            .then(PromptKind::Sql, "DROP TABLE customers")
            .then(
                PromptKind::Sql,
                "```sql\nSELECT name FROM customers WHERE account_type = 'premium';\n```",
            )
            .always(PromptKind::Insight, INSIGHT),
    );

    let report = orchestrator(oracle.clone(), db, Arc::clone(&sink))
        .run("Who are our premium customers?")
        .await;

    assert_eq!(report.status, Phase::Success);
    assert_eq!(report.state.retry_count, 2);
    assert_eq!(
        report.response.validated_sql.as_deref(),
        Some("SELECT name FROM customers WHERE account_type = 'premium' LIMIT 100")
    );
    assert_eq!(report.response.summary.as_deref(), Some("Premium customers listed."));
    assert_eq!(report.response.chart_suggestion.as_deref(), Some("table"));
    assert!(report.response.error.is_none());

    let outcome = report.state.execution_outcome.as_ref().unwrap();
    assert_eq!(outcome.row_count, 2);

    // Each retry sees the previous failure reason.
    let sql_calls = oracle.calls_for(PromptKind::Sql);
    assert_eq!(sql_calls.len(), 3);
    assert_eq!(sql_calls[0].get("error_message"), None);
    assert!(sql_calls[1].get("error_message").unwrap().contains("users"));
    assert_eq!(
        sql_calls[2].get("error_message"),
        Some("Only SELECT queries are allowed")
    );

    let verdicts: Vec<bool> = sink
        .events_for(report.request_id)
        .into_iter()
        .filter_map(|e| match e {
            WorkflowEvent::Verdict { is_valid, .. } => Some(is_valid),
            _ => None,
        })
        .collect();
    assert_eq!(verdicts, vec![false, false, true]);
}

#[tokio::test]
async fn test_three_rejections_fail_closed() {
    let (_dir, db) = seeded_bank().await;
    let sink = Arc::new(RecordingSink::new());
    let oracle = Arc::new(
        ScriptedOracle::new()
            .always(PromptKind::Intent, "Delete everything")
            .always(PromptKind::Sql, "DELETE FROM transactions"),
    );

    let report = orchestrator(oracle.clone(), Arc::clone(&db), Arc::clone(&sink))
        .run("Remove all transactions")
        .await;

    assert_eq!(report.status, Phase::Failure);
    assert_eq!(report.failure, Some(FailureKind::RetryExhausted));
    assert_eq!(report.state.retry_count, MAX_RETRIES);
    assert!(report.response.validated_sql.is_none());
    assert!(report.response.summary.is_none());
    assert_eq!(
        report.response.error.as_deref(),
        Some("Max retries (2) exceeded. Last error: Only SELECT queries are allowed")
    );
    assert_eq!(
        report.path,
        vec![
            Phase::Intent,
            Phase::SqlGen,
            Phase::Validate,
            Phase::SqlGen,
            Phase::Validate,
            Phase::SqlGen,
            Phase::Validate,
            Phase::Failure,
        ]
    );
    assert!(oracle.calls_for(PromptKind::Insight).is_empty());

    // Nothing was executed against the datastore.
    assert!(!sink
        .events()
        .iter()
        .any(|e| matches!(e, WorkflowEvent::Executed { .. })));
    let count = db
        .execute_query("SELECT COUNT(*) AS n FROM transactions", 1)
        .await
        .unwrap();
    assert_eq!(count.rows[0][0], Value::Int(super::TRANSACTION_COUNT));
}

#[tokio::test]
async fn test_execution_errors_feed_the_retry_loop() {
    let (_dir, db) = seeded_bank().await;
    let sink = Arc::new(RecordingSink::new());
    let oracle = Arc::new(
        ScriptedOracle::new()
            .always(PromptKind::Intent, "Average balance")
            .then(PromptKind::Sql, "SELECT AVG(balanse) FROM accounts")
            .then(PromptKind::Sql, "SELECT AVG(balanse) FROM accounts")
            .then(PromptKind::Sql, "SELECT AVG(balance) AS avg_balance FROM accounts")
            .always(PromptKind::Insight, r#"{"summary": "Average is 3500.", "chart": "metric"}"#),
    );

    let report = orchestrator(oracle.clone(), db, Arc::clone(&sink))
        .run("What is the average balance?")
        .await;

    assert_eq!(report.status, Phase::Success);
    assert_eq!(report.state.retry_count, 2);
    // Longest legal path: two failed executions, then success.
    assert_eq!(report.transitions(), MAX_TRANSITIONS);

    let retry_reason = oracle.calls_for(PromptKind::Sql)[1]
        .get("error_message")
        .unwrap()
        .to_string();
    assert!(retry_reason.starts_with("Execution error:"));
    assert!(retry_reason.contains("balanse"));

    let outcome = report.state.execution_outcome.unwrap();
    assert_eq!(outcome.rows[0].get("avg_balance"), Some(&Value::Float(3500.0)));

    let retries: Vec<(u32, FailureKind)> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            WorkflowEvent::Retry {
                retry_count, kind, ..
            } => Some((retry_count, kind)),
            _ => None,
        })
        .collect();
    assert_eq!(
        retries,
        vec![
            (1, FailureKind::ExecutionFailure),
            (2, FailureKind::ExecutionFailure)
        ]
    );
}

#[tokio::test]
async fn test_retry_count_never_decreases() {
    let (_dir, db) = seeded_bank().await;
    let sink = Arc::new(RecordingSink::new());
    let oracle = Arc::new(
        ScriptedOracle::new()
            .always(PromptKind::Intent, "x")
            .then(PromptKind::Sql, "no sql here")
            .then(PromptKind::Sql, "SELECT * FROM vault")
            .then(PromptKind::Sql, "SELECT * FROM accounts")
            .always(PromptKind::Insight, "Six accounts."),
    );

    let report = orchestrator(oracle, db, Arc::clone(&sink)).run("accounts").await;
    assert_eq!(report.status, Phase::Success);
    assert_eq!(report.response.summary.as_deref(), Some("Six accounts."));

    let events = sink.events_for(report.request_id);
    let steps = transitions(&events);
    assert!(steps.len() <= MAX_TRANSITIONS);
    assert!(steps.windows(2).all(|w| w[0].2 <= w[1].2));
    assert!(steps.iter().all(|(_, _, retries)| *retries <= MAX_RETRIES));

    assert!(matches!(events.first(), Some(WorkflowEvent::Started { .. })));
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Completed {
            status: Phase::Success,
            retry_count: 2,
            ..
        })
    ));
}

#[tokio::test]
async fn test_slow_datastore_times_out_every_attempt() {
    let sink = Arc::new(RecordingSink::new());
    let oracle = Arc::new(
        ScriptedOracle::new()
            .always(PromptKind::Intent, "all transactions")
            .always(PromptKind::Sql, "SELECT * FROM transactions"),
    );
    let guard = ExecutionGuard::new(
        Arc::new(SlowDatabaseClient::new(Duration::from_secs(10))),
        Duration::from_millis(30),
        1000,
    );
    let orchestrator =
        Orchestrator::new(oracle, banking_validator(), guard).with_sink(Arc::<RecordingSink>::clone(&sink));

    let report = orchestrator.run("show transactions").await;

    assert_eq!(report.failure, Some(FailureKind::RetryExhausted));
    assert!(report.response.error.unwrap().contains("timeout"));
    assert!(report.response.validated_sql.is_none());

    for event in sink.events() {
        if let WorkflowEvent::Executed {
            row_count, error, ..
        } = event
        {
            assert_eq!(row_count, 0);
            assert!(error.is_some());
        }
    }
}

#[tokio::test]
async fn test_rule_oracle_end_to_end() {
    let (_dir, db) = seeded_bank().await;
    let orchestrator = orchestrator(
        Arc::new(RuleBasedOracle::new()),
        db,
        Arc::new(RecordingSink::new()),
    );

    let report = orchestrator.run("How many premium customers do we have?").await;

    assert_eq!(report.status, Phase::Success);
    assert_eq!(
        report.response.validated_sql.as_deref(),
        Some("SELECT COUNT(*) as customer_count FROM customers WHERE account_type = 'premium' LIMIT 100")
    );
    assert_eq!(
        report.response.summary.as_deref(),
        Some("Counted the total number of customers matching the specified criteria.")
    );
    assert_eq!(report.response.chart_suggestion.as_deref(), Some("metric"));

    let outcome = report.state.execution_outcome.unwrap();
    assert_eq!(outcome.rows[0].get("customer_count"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_concurrent_workflows_are_isolated() {
    let (_dir, db) = seeded_bank().await;
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator(
        Arc::new(RuleBasedOracle::new()),
        db,
        Arc::clone(&sink),
    );

    let questions = [
        "How many customers do we have?",
        "What is the average balance of savings accounts?",
        "Show me the last 5 transactions above 10000",
        "Show failed transactions from the last week",
        "",
        "List everything",
    ];
    let reports =
        futures::future::join_all(questions.iter().map(|q| orchestrator.run(q))).await;

    let mut ids: Vec<u64> = reports.iter().map(|r| r.request_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), questions.len());

    for (question, report) in questions.iter().zip(&reports) {
        assert_eq!(report.state.user_query, *question);
        if question.is_empty() {
            assert_eq!(report.failure, Some(FailureKind::InputError));
        } else {
            assert_eq!(report.status, Phase::Success, "{question}: {:?}", report.response);
        }

        let events = sink.events_for(report.request_id);
        let completed = events
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::Completed { .. }))
            .count();
        assert_eq!(completed, 1);
        assert!(transitions(&events).len() <= MAX_TRANSITIONS);
    }
}
