// SPDX-License-Identifier: Apache-2.0

use node_validator_core::ValidatorError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Constant-delay retry bounded by both an attempt count and total elapsed time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            backoff: Duration::from_secs(4),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy is
/// exhausted. The last error is returned.
pub async fn retry_async<T, F, Fut>(
    policy: &RetryPolicy,
    what: &'static str,
    mut op: F,
) -> Result<T, ValidatorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ValidatorError>>,
{
    let started = Instant::now();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(err) => err,
        };
        let out_of_time = started.elapsed() + policy.backoff > policy.max_elapsed;
        if !err.is_retryable() || attempt >= policy.max_attempts || out_of_time {
            return Err(err);
        }
        warn!(attempt, error = %err, "{what} failed, retrying");
        tokio::time::sleep(policy.backoff).await;
    }
}
