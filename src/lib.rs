//! askdb - natural-language questions answered by safe, bounded, read-only SQL.
//!
//! This library exposes the core modules for the binary and for integration tests.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod oracle;
pub mod query;
pub mod safety;
pub mod workflow;
