//! Query execution for askdb.
//!
//! This module isolates bounded SQL execution from the workflow orchestrator.

pub mod executor;

pub use executor::{ExecutionGuard, ExecutionOutcome, DEFAULT_QUERY_TIMEOUT, DEFAULT_ROW_CAP};
