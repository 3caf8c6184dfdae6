//! Bounded polling for services that are still starting up
//!
//! Loops are bounded by attempt counters, not wall-clock deadlines.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// A single attempt, no waiting
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up. The last error is returned.
pub async fn retry_while<T, E, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if attempt < attempts && is_retryable(&err) => {
                warn!(
                    "{} not ready (attempt {}/{}): {}",
                    label, attempt, attempts, err
                );
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
