//! Shared HTTP request loop for chat-completion providers.
//!
//! Transient failures (timeouts, connection errors, 429 and 5xx responses)
//! are retried with exponential backoff.

use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AskError, Result};
use crate::llm::types::Message;

/// Maximum number of attempts for one completion.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// A provider endpoint that turns messages into one HTTP request.
pub(crate) trait ChatEndpoint: Send + Sync {
    /// Provider name used in messages and logs.
    fn provider_name(&self) -> &'static str;

    /// Builds the request for one attempt.
    fn build_request(&self, messages: &[Message]) -> RequestBuilder;

    /// Maps a non-success response to an error and whether it is retryable.
    fn parse_error(&self, status: StatusCode, body: &str) -> (AskError, bool);

    /// Extracts the completion text from a success body.
    fn extract_text(&self, body: &str) -> Result<String>;
}

/// Sends a completion request, retrying transient failures.
pub(crate) async fn send_with_retry<E: ChatEndpoint>(
    endpoint: &E,
    messages: &[Message],
) -> Result<String> {
    let provider = endpoint.provider_name();
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt = 1;

    loop {
        debug!(
            "{} API request attempt {} of {}",
            provider, attempt, MAX_RETRY_ATTEMPTS
        );

        let (error, is_retryable) = match endpoint.build_request(messages).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| AskError::llm(format!("Failed to read response: {}", e)))?;

                if status.is_success() {
                    return endpoint.extract_text(&body);
                }

                endpoint.parse_error(status, &body)
            }
            Err(e) => request_error(provider, &e),
        };

        if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
            return Err(error);
        }

        warn!(
            "{} API request failed (attempt {}), retrying in {:?}: {}",
            provider, attempt, delay, error
        );
        tokio::time::sleep(delay).await;
        delay *= 2;
        attempt += 1;
    }
}

/// Maps a transport-level error to a user-facing error and retryability.
fn request_error(provider: &str, error: &reqwest::Error) -> (AskError, bool) {
    if error.is_timeout() {
        (AskError::llm("Request timed out. Try again."), true)
    } else if error.is_connect() {
        (
            AskError::llm(format!(
                "Failed to connect to {provider} API. Check your network."
            )),
            true,
        )
    } else {
        (AskError::llm(format!("Request failed: {}", error)), false)
    }
}

/// Status-code handling shared by all providers.
///
/// Returns `None` when the provider should inspect the body itself.
pub(crate) fn common_status_error(
    status: StatusCode,
    key_variable: &str,
) -> Option<(AskError, bool)> {
    if status == StatusCode::UNAUTHORIZED {
        return Some((
            AskError::llm(format!("Authentication failed. Check your {key_variable}.")),
            false,
        ));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some((AskError::llm("Rate limited. Please wait and try again."), true));
    }

    None
}
