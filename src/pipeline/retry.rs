//! Bounded retry with exponential backoff.

use std::future::Future;

use tracing::warn;

use super::config::RetryPolicy;

/// The last error of an operation whose retry budget ran out.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Attempts made, including the first one.
    pub attempts: u32,
    /// Error returned by the final attempt.
    pub last_error: E,
}

/// Runs `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// Sleeps `policy.delay_for(n)` between attempt `n` and `n + 1`. Each retry
/// is logged at `warn` with the operation name.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
