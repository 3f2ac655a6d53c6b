//! Rule-ordered SQL validator.
//!
//! The validator is the only gate between generated text and the datastore.
//! Rules run in a fixed order and the first failure wins:
//!
//! 1. comments are stripped; nothing left, or more than
//!    [`LimitPolicy::max_sql_length`] characters, is rejected
//! 2. the query must start with `SELECT`
//! 3. at most one statement (one trailing `;` is tolerated)
//! 4. no `UNION`
//! 5. no forbidden keyword anywhere outside string literals
//! 6. every `FROM`/`JOIN` relation must be whitelisted
//! 7. the top-level `LIMIT` is added or capped
//!
//! Validation is a pure function of its inputs and safe to call concurrently.

use regex::Regex;
use serde::Serialize;
use sqlparser::ast::{visit_relations, ObjectName};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, LazyLock};

use crate::db::SchemaDescriptor;

/// Keywords that may never appear in an accepted query.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP",
    "DELETE",
    "UPDATE",
    "INSERT",
    "ALTER",
    "CREATE",
    "TRUNCATE",
    "REPLACE",
    "MERGE",
    "GRANT",
    "REVOKE",
    "EXEC",
    "EXECUTE",
    "CALL",
    "PROCEDURE",
    "FUNCTION",
    "PRAGMA",
    "ATTACH",
    "DETACH",
    "LOAD",
    "COPY",
];

/// Schema SQLite resolves unqualified names against.
const DEFAULT_SCHEMA: &str = "main";

/// One identifier: bare, `"double-quoted"`, `` `backticked` `` or `[bracketed]`.
const IDENT: &str = r#"(?:"(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)"#;

static SELECT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT\b").expect("SELECT pattern is valid"));

static UNION_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUNION\b").expect("UNION pattern is valid"));

static FORBIDDEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = FORBIDDEN_KEYWORDS.join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("keyword pattern is valid")
});

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:FROM|JOIN)\s+({IDENT}(?:\s*\.\s*{IDENT})?)"
    ))
    .expect("table reference pattern is valid")
});

static IDENT_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IDENT).expect("identifier pattern is valid"));

static LIMIT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("LIMIT pattern is valid"));

static LIMIT_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s+(\d+)(?:\s*,\s*(\d+)|\s+OFFSET\s+(\d+))?\s*$")
        .expect("LIMIT tail pattern is valid")
});

/// Size limits applied by rules 1 and 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    /// LIMIT appended when the query has none.
    pub default_limit: u64,
    /// Hard cap; larger numeric limits are rewritten down to it.
    pub max_limit: u64,
    /// Longest query, in characters after comment stripping, that is parsed at all.
    pub max_sql_length: usize,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
            max_sql_length: 5000,
        }
    }
}

/// The rule a rejected query failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "detail", rename_all = "snake_case")]
pub enum Rejection {
    /// Nothing left after stripping comments.
    Empty,
    /// Longer than the configured maximum.
    TooLong(usize),
    /// Does not start with SELECT.
    NotSelect,
    /// More than one statement.
    MultipleStatements,
    /// Contains UNION.
    Union,
    /// Contains forbidden keywords, listed in canonical order.
    ForbiddenKeywords(Vec<String>),
    /// References relations outside the whitelist.
    UnknownTables(Vec<String>),
    /// The top-level LIMIT is not a numeric literal.
    InvalidLimit(String),
}

impl Rejection {
    /// Short rule name used in observability events.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooLong(_) => "too_long",
            Self::NotSelect => "not_select",
            Self::MultipleStatements => "multiple_statements",
            Self::Union => "union",
            Self::ForbiddenKeywords(_) => "forbidden_keywords",
            Self::UnknownTables(_) => "unknown_tables",
            Self::InvalidLimit(_) => "invalid_limit",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Query is empty"),
            Self::TooLong(max) => write!(
                f,
                "Query length exceeds maximum allowed length of {max} characters"
            ),
            Self::NotSelect => write!(f, "Only SELECT queries are allowed"),
            Self::MultipleStatements => write!(f, "Multiple statements are not allowed"),
            Self::Union => write!(f, "UNION queries are not allowed"),
            Self::ForbiddenKeywords(keywords) => {
                write!(f, "Forbidden keywords detected: {}", keywords.join(", "))
            }
            Self::UnknownTables(tables) => {
                write!(f, "Unknown tables referenced: {}", tables.join(", "))
            }
            Self::InvalidLimit(found) if found.is_empty() => {
                write!(f, "LIMIT must be followed by a non-negative integer")
            }
            Self::InvalidLimit(found) => write!(
                f,
                "LIMIT must be a non-negative integer literal (found '{found}')"
            ),
        }
    }
}

/// Outcome of validating one candidate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub is_valid: bool,
    /// "VALID", or the human-readable rejection reason.
    pub reason: String,
    /// The query to execute; present only when valid.
    pub cleaned_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl Verdict {
    /// Creates an accepting verdict.
    pub fn valid(cleaned_sql: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            reason: "VALID".to_string(),
            cleaned_sql: Some(cleaned_sql.into()),
            rejection: None,
        }
    }

    /// Creates a rejecting verdict.
    pub fn rejected(rejection: Rejection) -> Self {
        Self {
            is_valid: false,
            reason: rejection.to_string(),
            cleaned_sql: None,
            rejection: Some(rejection),
        }
    }
}

/// Validator bound to one schema whitelist and limit policy.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    schema: Arc<SchemaDescriptor>,
    policy: LimitPolicy,
}

impl SqlValidator {
    /// Creates a validator over the given whitelist.
    pub fn new(schema: Arc<SchemaDescriptor>, policy: LimitPolicy) -> Self {
        Self { schema, policy }
    }

    /// Returns the whitelist this validator enforces.
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Validates a candidate query.
    pub fn validate(&self, sql: &str) -> Verdict {
        match self.check(sql) {
            Ok(cleaned) => Verdict::valid(cleaned),
            Err(rejection) => Verdict::rejected(rejection),
        }
    }

    fn check(&self, sql: &str) -> Result<String, Rejection> {
        // Rule 1
        let stripped = strip_comments(sql);
        let trimmed = stripped.trim();
        if trimmed.is_empty() {
            return Err(Rejection::Empty);
        }
        if trimmed.chars().count() > self.policy.max_sql_length {
            return Err(Rejection::TooLong(self.policy.max_sql_length));
        }

        // Rule 2
        if !SELECT_PREFIX.is_match(trimmed) {
            return Err(Rejection::NotSelect);
        }

        // Rule 3
        let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        let masked = mask_string_literals(body);
        if masked.contains(';') {
            return Err(Rejection::MultipleStatements);
        }

        // Rule 4
        if UNION_KEYWORD.is_match(&masked) {
            return Err(Rejection::Union);
        }

        // Rule 5
        let found: HashSet<String> = FORBIDDEN_PATTERN
            .find_iter(&masked)
            .map(|m| m.as_str().to_uppercase())
            .collect();
        if !found.is_empty() {
            let keywords = FORBIDDEN_KEYWORDS
                .iter()
                .filter(|k| found.contains(**k))
                .map(|k| k.to_string())
                .collect();
            return Err(Rejection::ForbiddenKeywords(keywords));
        }

        // Rule 6
        let unknown: Vec<String> = referenced_relations(body, &masked)
            .into_iter()
            .filter(|parts| !self.is_whitelisted(parts))
            .map(|parts| parts.join("."))
            .collect();
        if !unknown.is_empty() {
            return Err(Rejection::UnknownTables(unknown));
        }

        // Rule 7
        self.enforce_limit(body, &masked)
    }

    fn is_whitelisted(&self, parts: &[String]) -> bool {
        match parts {
            [table] => self.schema.contains_table(table),
            [schema, table] => {
                schema.eq_ignore_ascii_case(DEFAULT_SCHEMA) && self.schema.contains_table(table)
            }
            _ => false,
        }
    }

    fn enforce_limit(&self, body: &str, masked: &str) -> Result<String, Rejection> {
        let cap = self.policy.max_limit;

        let Some(start) = top_level_limit(masked) else {
            return Ok(format!("{body} LIMIT {}", self.policy.default_limit));
        };

        let tail_start = start + "LIMIT".len();
        let Some(caps) = LIMIT_TAIL.captures(&masked[tail_start..]) else {
            return Err(Rejection::InvalidLimit(body[tail_start..].trim().to_string()));
        };

        let number = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX));
        let head = &body[..start];

        let cleaned = match (number(1), number(2), number(3)) {
            // LIMIT offset, count
            (Some(offset), Some(count), _) => {
                format!("{head}LIMIT {} OFFSET {offset}", count.min(cap))
            }
            (Some(count), None, Some(offset)) if count > cap => {
                format!("{head}LIMIT {cap} OFFSET {offset}")
            }
            (Some(count), None, None) if count > cap => format!("{head}LIMIT {cap}"),
            _ => body.to_string(),
        };

        Ok(cleaned)
    }
}

/// Validates `sql` against `schema` without building a [`SqlValidator`].
pub fn validate_sql(sql: &str, schema: &SchemaDescriptor, policy: LimitPolicy) -> Verdict {
    SqlValidator::new(Arc::new(schema.clone()), policy).validate(sql)
}

/// Replaces `-- line` and `/* block */` comments with a single space.
///
/// Comment markers inside quoted strings or identifiers are left alone. An
/// unterminated block comment runs to the end of the input.
pub fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(close) = quote {
            out.push(c);
            if c == close {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '[' => {
                quote = Some(']');
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                while chars.next_if(|&next| next != '\n').is_some() {}
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

/// Copy of `sql` with string literal contents blanked, byte offsets preserved.
fn mask_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(close) if c == close => {
                quote = None;
                out.push(c);
            }
            Some('\'') => out.extend(std::iter::repeat(' ').take(c.len_utf8())),
            Some(_) => out.push(c),
            None => {
                quote = match c {
                    '\'' | '"' | '`' => Some(c),
                    '[' => Some(']'),
                    _ => None,
                };
                out.push(c);
            }
        }
    }

    out
}

/// Relations named after FROM/JOIN, plus any the parser finds, deduplicated.
///
/// Each relation is returned as its unquoted name parts.
fn referenced_relations(body: &str, masked: &str) -> Vec<Vec<String>> {
    let mut relations: Vec<Vec<String>> = TABLE_REFERENCE
        .captures_iter(masked)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            IDENT_PART
                .find_iter(m.as_str())
                .map(|part| unquote(part.as_str()))
                .collect()
        })
        .collect();

    if let Ok(statements) = Parser::parse_sql(&SQLiteDialect {}, body) {
        let _ = visit_relations(&statements, |relation: &ObjectName| {
            relations.push(relation.0.iter().map(|ident| ident.value.clone()).collect());
            ControlFlow::<()>::Continue(())
        });
    }

    let mut seen = HashSet::new();
    relations
        .into_iter()
        .filter(|parts| seen.insert(parts.join(".").to_lowercase()))
        .collect()
}

fn unquote(ident: &str) -> String {
    let inner = |open: char, close: char| {
        ident
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
    };

    if let Some(name) = inner('"', '"') {
        name.replace("\"\"", "\"")
    } else if let Some(name) = inner('`', '`').or_else(|| inner('[', ']')) {
        name.to_string()
    } else {
        ident.to_string()
    }
}

/// Byte offset of the last LIMIT keyword outside any parentheses.
fn top_level_limit(masked: &str) -> Option<usize> {
    let bytes = masked.as_bytes();
    let mut depth = 0i64;
    let mut scanned = 0;

    LIMIT_KEYWORD
        .find_iter(masked)
        .filter(|m| {
            depth += paren_delta(&bytes[scanned..m.start()]);
            scanned = m.start();
            depth == 0
        })
        .map(|m| m.start())
        .last()
}

fn paren_delta(bytes: &[u8]) -> i64 {
    bytes.iter().fold(0, |depth, b| match b {
        b'(' => depth + 1,
        b')' => depth - 1,
        _ => depth,
    })
}
