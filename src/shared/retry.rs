//! Retry Combinator
//!
//! Every outbound HTTP caller in the system (client chunk PUTs, worker
//! fan-out, coordinator repair copies, heartbeat posts) retries the same
//! way: bounded attempts, exponential backoff with jitter, and a predicate
//! deciding which errors are worth another attempt.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Client-facing transfers: 1 s base doubling, up to 3 retries.
    pub fn transfer() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Short intra-cluster calls where waiting long is worse than failing.
    pub fn internal() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(150),
            backoff_factor: 2,
            max_delay: Duration::from_millis(1200),
        }
    }
}

/// Runs `op` until it succeeds, the attempts are exhausted, or the error is
/// not retriable. Sleeps `base * factor^n` plus up to 100 ms of jitter
/// between attempts, capped at `max_delay`.
pub async fn retry_async<T, E, Fut, Op, Pred>(
    policy: &RetryPolicy,
    is_retriable: Pred,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Pred: Fn(&E) -> bool,
{
    let mut delay = policy.base_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= policy.max_attempts.max(1) || !is_retriable(&e) {
                    return Err(e);
                }
                let jitter = Duration::from_millis(rand::random::<u64>() % 100);
                tokio::time::sleep(delay + jitter).await;
                delay = (delay * policy.backoff_factor).min(policy.max_delay);
            }
        }
    }
}
