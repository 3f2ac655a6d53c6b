//! Deterministic offline oracle.
//!
//! Recognizes a handful of common banking questions by keyword and answers
//! with fixed intents, SQL and summaries. Useful for demos, tests and
//! environments without an API key.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::llm::{PromptKind, PromptVars};
use crate::oracle::Oracle;

/// Oracle backed by keyword rules over the banking schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedOracle;

impl RuleBasedOracle {
    /// Creates the oracle.
    pub fn new() -> Self {
        Self
    }

    /// Restates a question as a data request.
    pub fn intent_for(question: &str) -> String {
        let q = question.to_lowercase();

        if q.contains("last") && q.contains("transactions") {
            if q.contains("above") || q.contains('>') {
                return "Retrieve the most recent transactions where amount exceeds a threshold, \
                        ordered by transaction_date DESC with limited results"
                    .to_string();
            }
            return "Retrieve the most recent transactions, ordered by transaction_date DESC \
                    with limited results"
                .to_string();
        }

        if q.contains("how many") && q.contains("customers") {
            return "Count total number of customers, optionally filtered by account type or status"
                .to_string();
        }

        if q.contains("average") && q.contains("balance") {
            return "Calculate average account balance, optionally filtered by account type"
                .to_string();
        }

        if q.contains("failed") && q.contains("transactions") {
            return "Retrieve transactions where status = 'failed', with date range filter"
                .to_string();
        }

        format!("Extract and analyze data based on: {}", question.trim())
    }

    /// Picks SQL for a data request; `question` supplies filter words.
    pub fn sql_for(intent: &str, question: &str) -> String {
        let intent = intent.to_lowercase();
        let q = question.to_lowercase();

        if intent.contains("most recent transactions where amount exceeds") {
            return "SELECT * FROM transactions WHERE amount > 10000 \
                    ORDER BY transaction_date DESC LIMIT 5"
                .to_string();
        }

        if intent.contains("count total number of customers") {
            let mut sql = "SELECT COUNT(*) as customer_count FROM customers".to_string();
            if q.contains("premium") {
                sql.push_str(" WHERE account_type = 'premium'");
            }
            return sql;
        }

        if intent.contains("calculate average account balance") {
            let mut sql = "SELECT AVG(balance) as avg_balance FROM accounts".to_string();
            if q.contains("savings") {
                sql.push_str(" WHERE account_type = 'savings'");
            }
            return sql;
        }

        if intent.contains("status = 'failed'") {
            return "SELECT * FROM transactions WHERE status = 'failed' \
                    AND transaction_date >= DATE('now', '-7 days')"
                .to_string();
        }

        "SELECT * FROM transactions LIMIT 10".to_string()
    }

    /// Returns `(summary, chart)` for executed SQL.
    pub fn insight_for(sql: &str) -> (&'static str, &'static str) {
        if sql.contains("SELECT * FROM transactions WHERE amount >") {
            (
                "Retrieved high-value transactions exceeding the threshold amount, sorted by most recent first.",
                "table",
            )
        } else if sql.contains("COUNT(*)") && sql.contains("customers") {
            (
                "Counted the total number of customers matching the specified criteria.",
                "metric",
            )
        } else if sql.contains("AVG(balance)") {
            (
                "Calculated the average account balance across matching accounts.",
                "metric",
            )
        } else if sql.contains("status = 'failed'") {
            (
                "Retrieved all failed transactions within the specified time period.",
                "table",
            )
        } else {
            (
                "Query executed successfully and returned the requested data.",
                "table",
            )
        }
    }
}

#[async_trait]
impl Oracle for RuleBasedOracle {
    async fn generate(&self, kind: PromptKind, vars: &PromptVars) -> Result<String> {
        let question = vars.get_or_empty("user_query");

        Ok(match kind {
            PromptKind::Intent => Self::intent_for(question),
            PromptKind::Sql => {
                let intent = vars.get("intent").unwrap_or(question);
                Self::sql_for(intent, question)
            }
            PromptKind::Insight => {
                let (summary, chart) = Self::insight_for(vars.get_or_empty("sql"));
                json!({ "summary": summary, "chart": chart }).to_string()
            }
        })
    }

    fn name(&self) -> &str {
        "rules"
    }
}
