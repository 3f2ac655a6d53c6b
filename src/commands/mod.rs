//! Command handling for the askdb binary.
//!
//! Handlers return transport-agnostic [`CommandOutput`] values that the
//! binary renders as text or JSON.

pub mod handlers;
pub mod output;

pub use handlers::{handle_ask, handle_health, handle_schema, handle_validate, render_report};
pub use output::CommandOutput;
