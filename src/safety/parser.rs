//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the SQLite dialect to parse SQL and classify
//! statements by their safety level. Anything that fails to parse is
//! classified as destructive.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::error::{AskError, Result};

use super::{ClassificationResult, SafetyLevel, StatementType};

/// SQL classifier that parses and classifies SQL queries.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: SQLiteDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a new SQL classifier.
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    /// Classifies a SQL string and returns the classification result.
    ///
    /// If the SQL cannot be parsed, it is treated as destructive with a
    /// warning message.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        match self.parse_and_classify(sql) {
            Ok(result) => result,
            Err(e) => ClassificationResult::with_warning(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                format!("Could not parse SQL: {}", e.message()),
            ),
        }
    }

    fn parse_and_classify(&self, sql: &str) -> Result<ClassificationResult> {
        let statements = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| AskError::query(format!("SQL parse error: {}", e)))?;

        if statements.is_empty() {
            return Ok(ClassificationResult::with_warning(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                "Empty SQL statement",
            ));
        }

        if statements.len() == 1 {
            let (level, stmt_type) = classify_statement(&statements[0]);
            return Ok(ClassificationResult::new(level, stmt_type));
        }

        // Multiple statements: use the most dangerous classification
        let mut max_level = SafetyLevel::Safe;
        let mut max_stmt_type = StatementType::Select;

        for stmt in &statements {
            let (level, stmt_type) = classify_statement(stmt);
            if level_priority(&level) > level_priority(&max_level) {
                max_level = level;
                max_stmt_type = stmt_type;
            }
        }

        Ok(ClassificationResult::new(
            max_level,
            StatementType::Multiple(Box::new(max_stmt_type)),
        ))
    }
}

/// Convenience function to classify SQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> ClassificationResult {
    SqlClassifier::new().classify(sql)
}

/// Returns a priority value for safety levels (higher = more dangerous).
fn level_priority(level: &SafetyLevel) -> u8 {
    match level {
        SafetyLevel::Safe => 0,
        SafetyLevel::Mutating => 1,
        SafetyLevel::Destructive => 2,
    }
}

/// Keeps the more dangerous of two classifications; ties keep `current`.
fn most_dangerous(
    current: (SafetyLevel, StatementType),
    candidate: (SafetyLevel, StatementType),
) -> (SafetyLevel, StatementType) {
    if level_priority(&candidate.0) > level_priority(&current.0) {
        candidate
    } else {
        current
    }
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> (SafetyLevel, StatementType) {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                let (inner_level, _) = classify_statement(statement);
                (inner_level, StatementType::Explain)
            } else {
                (SafetyLevel::Safe, StatementType::Explain)
            }
        }

        // Mutating: data or connection-state modification
        Statement::Insert(_) => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),
        Statement::Merge { .. } => (SafetyLevel::Mutating, StatementType::Merge),
        Statement::Pragma { .. } => (SafetyLevel::Mutating, StatementType::Pragma),

        // Destructive: data loss, schema changes, or reaching other files
        Statement::Delete(_) => (SafetyLevel::Destructive, StatementType::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementType::Drop),
        Statement::Truncate { .. } => (SafetyLevel::Destructive, StatementType::Truncate),
        Statement::AlterTable { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::CreateTable { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateIndex { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateView { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::Grant { .. } => (SafetyLevel::Destructive, StatementType::Grant),
        Statement::Revoke { .. } => (SafetyLevel::Destructive, StatementType::Revoke),
        Statement::AttachDatabase { .. } => (SafetyLevel::Destructive, StatementType::Attach),

        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Query by recursively inspecting for data-modifying operations.
/// Returns the most dangerous (SafetyLevel, StatementType) found.
fn classify_query(query: &Query) -> (SafetyLevel, StatementType) {
    let mut max = (SafetyLevel::Safe, StatementType::Select);

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            max = most_dangerous(max, classify_query(&cte.query));
        }
    }

    most_dangerous(max, classify_set_expr(&query.body))
}

/// Classifies a SetExpr, detecting mutations and recursing into nested queries.
fn classify_set_expr(set_expr: &SetExpr) -> (SafetyLevel, StatementType) {
    match set_expr {
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::Select(select) => classify_select(select),

        // Set operations (UNION, INTERSECT, EXCEPT) - check both sides
        SetExpr::SetOperation { left, right, .. } => {
            most_dangerous(classify_set_expr(left), classify_set_expr(right))
        }

        SetExpr::Values(_) | SetExpr::Table(_) => (SafetyLevel::Safe, StatementType::Select),

        // Any other body (e.g. a data-modifying CTE) is not provably read-only
        #[allow(unreachable_patterns)]
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Select by checking its FROM clause for subqueries.
fn classify_select(select: &Select) -> (SafetyLevel, StatementType) {
    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous)
}

/// Classifies a TableWithJoins, checking the main relation and all joins.
fn classify_table_with_joins(twj: &TableWithJoins) -> (SafetyLevel, StatementType) {
    twj.joins
        .iter()
        .map(|join| classify_table_factor(&join.relation))
        .fold(classify_table_factor(&twj.relation), most_dangerous)
}

/// Classifies a TableFactor, recursing into derived tables (subqueries).
fn classify_table_factor(factor: &TableFactor) -> (SafetyLevel, StatementType) {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => (SafetyLevel::Safe, StatementType::Select),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_classification(sql: &str, expected_level: SafetyLevel, expected_type: StatementType) {
        let result = classify_sql(sql);
        assert_eq!(
            result.level, expected_level,
            "SQL: '{}' - expected level {:?}, got {:?}",
            sql, expected_level, result.level
        );
        assert_eq!(
            result.statement_type, expected_type,
            "SQL: '{}' - expected type {:?}, got {:?}",
            sql, expected_type, result.statement_type
        );
    }

    #[test]
    fn test_select_is_safe() {
        assert_classification(
            "SELECT * FROM transactions LIMIT 100",
            SafetyLevel::Safe,
            StatementType::Select,
        );
    }

    #[test]
    fn test_select_with_join_is_safe() {
        assert_classification(
            "SELECT c.name, a.balance FROM customers c JOIN accounts a ON c.customer_id = a.customer_id",
            SafetyLevel::Safe,
            StatementType::Select,
        );
    }

    #[test]
    fn test_select_with_subquery_is_safe() {
        assert_classification(
            "SELECT * FROM accounts WHERE customer_id IN (SELECT customer_id FROM customers)",
            SafetyLevel::Safe,
            StatementType::Select,
        );
    }

    #[test]
    fn test_select_with_date_function_is_safe() {
        assert_classification(
            "SELECT * FROM transactions WHERE status = 'failed' AND transaction_date >= DATE('now', '-7 days')",
            SafetyLevel::Safe,
            StatementType::Select,
        );
    }

    #[test]
    fn test_derived_table_is_safe() {
        assert_classification(
            "SELECT * FROM (SELECT amount FROM transactions) t LIMIT 5",
            SafetyLevel::Safe,
            StatementType::Select,
        );
    }

    #[test]
    fn test_insert_is_mutating() {
        assert_classification(
            "INSERT INTO customers (name, email) VALUES ('Alice', 'alice@test.com')",
            SafetyLevel::Mutating,
            StatementType::Insert,
        );
    }

    #[test]
    fn test_update_is_mutating() {
        assert_classification(
            "UPDATE accounts SET balance = 0 WHERE account_id = 1",
            SafetyLevel::Mutating,
            StatementType::Update,
        );
    }

    #[test]
    fn test_pragma_is_mutating() {
        assert_classification(
            "PRAGMA user_version = 1",
            SafetyLevel::Mutating,
            StatementType::Pragma,
        );
    }

    #[test]
    fn test_delete_is_destructive() {
        assert_classification(
            "DELETE FROM transactions WHERE status = 'failed'",
            SafetyLevel::Destructive,
            StatementType::Delete,
        );
    }

    #[test]
    fn test_drop_table_is_destructive() {
        assert_classification(
            "DROP TABLE customers",
            SafetyLevel::Destructive,
            StatementType::Drop,
        );
    }

    #[test]
    fn test_create_table_is_destructive() {
        assert_classification(
            "CREATE TABLE audit (id INTEGER PRIMARY KEY, note TEXT)",
            SafetyLevel::Destructive,
            StatementType::Create,
        );
    }

    #[test]
    fn test_attach_is_destructive() {
        assert_classification(
            "ATTACH DATABASE 'other.db' AS other",
            SafetyLevel::Destructive,
            StatementType::Attach,
        );
    }

    #[test]
    fn test_cte_select_is_safe() {
        assert_classification(
            "WITH big AS (SELECT * FROM transactions WHERE amount > 10000) SELECT * FROM big",
            SafetyLevel::Safe,
            StatementType::Select,
        );
    }

    #[test]
    fn test_cte_with_delete_is_not_read_only() {
        let result =
            classify_sql("WITH d AS (DELETE FROM customers RETURNING *) SELECT * FROM d");
        assert_eq!(result.level, SafetyLevel::Destructive);
    }

    #[test]
    fn test_multi_statement_uses_most_dangerous() {
        let result = classify_sql("SELECT * FROM transactions; DROP TABLE customers");
        assert_eq!(result.level, SafetyLevel::Destructive);
        match result.statement_type {
            StatementType::Multiple(inner) => assert_eq!(*inner, StatementType::Drop),
            _ => panic!("Expected Multiple statement type"),
        }
    }

    #[test]
    fn test_multi_statement_all_safe() {
        let result = classify_sql("SELECT * FROM customers; SELECT COUNT(*) FROM accounts");
        assert_eq!(result.level, SafetyLevel::Safe);
    }

    #[test]
    fn test_parse_failure_is_destructive() {
        let result = classify_sql("THIS IS NOT VALID SQL AT ALL");
        assert_eq!(result.level, SafetyLevel::Destructive);
        assert_eq!(result.statement_type, StatementType::Unknown);
        assert!(result.warning.unwrap().contains("Could not parse SQL"));
    }

    #[test]
    fn test_empty_sql_is_destructive() {
        assert_eq!(classify_sql("").level, SafetyLevel::Destructive);
        assert_eq!(classify_sql("   \n\t  ").level, SafetyLevel::Destructive);
    }

    #[test]
    fn test_case_insensitive() {
        for sql in [
            "select * from customers",
            "SELECT * FROM CUSTOMERS",
            "SeLeCt * FrOm CuStOmErS",
        ] {
            assert_classification(sql, SafetyLevel::Safe, StatementType::Select);
        }
    }

    #[test]
    fn test_classifier_default() {
        let classifier = SqlClassifier::default();
        assert!(classifier.classify("SELECT 1").is_read_only());
    }
}
