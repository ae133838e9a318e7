//! Bounded Provider Calls
//!
//! Every provider call goes through `call_bounded`: each attempt is capped by
//! a timeout, and a retryable failure (timeout, 5xx, rate limit, network) gets
//! at most `retries` further attempts. A call that times out on its last
//! attempt surfaces as `LlmError::Timeout`, same as any other provider failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::types::{LlmError, LlmResult};

/// Timeout and retry budget for one logical provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub retries: u32,
    /// Pause before a retry
    pub retry_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retries: 1,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            timeout,
            retries,
            ..Default::default()
        }
    }
}

/// Run `op` under `policy`.
///
/// `op` is called once per attempt, so it must build a fresh future each time.
pub async fn call_bounded<T, F, Fut>(policy: &CallPolicy, label: &str, mut op: F) -> LlmResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LlmResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                seconds: policy.timeout.as_secs(),
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.retries && e.is_retryable() => {
                attempt += 1;
                warn!(call = label, attempt, error = %e, "provider call failed, retrying");
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
