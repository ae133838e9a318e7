//! HTTP Client Factory
//!
//! Builds the shared reqwest client used by the provider adapters.

use std::time::Duration;

use super::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` with a transport-level timeout.
///
/// The bounded-call wrapper enforces the per-attempt budget; this timeout is a
/// backstop so a stalled connection never outlives it by much.
pub fn build_http_client(timeout: Duration) -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| LlmError::Other {
            message: format!("Failed to build HTTP client: {}", e),
        })
}
