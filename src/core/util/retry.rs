use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::{sleep, timeout};

/// Retry policy for a single outbound call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub delay: Duration,
    /// Upper bound for each individual attempt.
    pub attempt_timeout: Duration,
    /// Whether a timed-out attempt may be repeated. Off for calls that must
    /// not be duplicated when the first one actually went through.
    pub retry_timeouts: bool,
}

/// Runs `op` until it succeeds or the policy is exhausted. Each attempt is
/// bounded by `attempt_timeout`; a timed-out attempt counts as a failure and
/// ends the loop unless `retry_timeouts` is set.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_retries.saturating_add(1);
    let mut last_error = anyhow!("{label}: no attempt made");

    for attempt in 1..=attempts {
        match timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => last_error = e,
            Err(_) => {
                last_error = anyhow!("{label}: timed out after {:?}", policy.attempt_timeout);
                if !policy.retry_timeouts {
                    return Err(last_error.context(format!("{label} not retried after timeout")));
                }
            }
        }

        tracing::debug!(attempt, attempts, error = %last_error, "{label} failed");

        if attempt < attempts {
            sleep(policy.delay).await;
        }
    }

    Err(last_error.context(format!("{label} failed after {attempts} attempt(s)")))
}
