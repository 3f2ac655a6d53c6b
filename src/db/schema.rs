//! Schema descriptor for askdb.
//!
//! The descriptor is the authorization whitelist: the only tables a generated
//! query may reference, each with its ordered column names. It is built once
//! at startup and shared immutably between workflows.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AskError, Result};

/// A whitelisted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: String,

    /// Column names in declaration order.
    #[serde(default)]
    pub columns: Vec<String>,

    /// Optional description included in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TableSpec {
    /// Creates a table spec with the given name and columns.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Immutable whitelist of tables and their columns.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    tables: Vec<TableSpec>,
    /// Lower-cased table names for case-insensitive lookup.
    index: HashSet<String>,
}

impl SchemaDescriptor {
    /// Builds a descriptor from table specs.
    ///
    /// Fails on an empty whitelist, on blank names and on duplicate names
    /// (compared case-insensitively).
    pub fn new(tables: Vec<TableSpec>) -> Result<Self> {
        if tables.is_empty() {
            return Err(AskError::config("schema whitelist must contain at least one table"));
        }

        let mut index = HashSet::with_capacity(tables.len());
        for table in &tables {
            let name = table.name.trim();
            if name.is_empty() {
                return Err(AskError::config("schema table names must not be empty"));
            }
            if !index.insert(name.to_lowercase()) {
                return Err(AskError::config(format!(
                    "schema table '{name}' is declared more than once"
                )));
            }
        }

        Ok(Self { tables, index })
    }

    /// The built-in banking schema: customers, accounts and transactions.
    pub fn banking() -> Self {
        let tables = vec![
            TableSpec::new(
                "customers",
                [
                    "customer_id",
                    "name",
                    "email",
                    "phone",
                    "account_type",
                    "created_at",
                    "status",
                ],
            )
            .with_description("Customer information and account details"),
            TableSpec::new(
                "accounts",
                [
                    "account_id",
                    "customer_id",
                    "account_number",
                    "balance",
                    "account_type",
                    "created_at",
                    "status",
                ],
            )
            .with_description("Bank account information"),
            TableSpec::new(
                "transactions",
                [
                    "transaction_id",
                    "account_id",
                    "transaction_type",
                    "amount",
                    "description",
                    "transaction_date",
                    "status",
                    "merchant",
                ],
            )
            .with_description("Transaction history for all accounts"),
        ];

        let index = tables.iter().map(|t| t.name.to_lowercase()).collect();
        Self { tables, index }
    }

    /// Returns true if the table is whitelisted (case-insensitive).
    pub fn contains_table(&self, name: &str) -> bool {
        self.index.contains(&name.to_lowercase())
    }

    /// Returns the columns of a whitelisted table, if present.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(table))
            .map(|t| t.columns.as_slice())
    }

    /// Returns all whitelisted tables in declaration order.
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Returns the whitelisted table names in declaration order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Formats the schema for inclusion in an LLM prompt.
    pub fn format_for_llm(&self) -> String {
        let tables_text = self
            .tables
            .iter()
            .map(Self::format_table_for_llm)
            .collect::<Vec<_>>()
            .join("");

        format!("Database Schema:\n\n{}", tables_text)
    }

    fn format_table_for_llm(table: &TableSpec) -> String {
        let description = table
            .description
            .as_deref()
            .map(|d| format!("Description: {d}\n"))
            .unwrap_or_default();

        let column_lines = table
            .columns
            .iter()
            .map(|column| format!("  - {column}\n"))
            .collect::<Vec<_>>()
            .join("");

        format!("Table: {}\n{}Columns:\n{}\n", table.name, description, column_lines)
    }
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self::banking()
    }
}
