use crate::errors::JobError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Bounded exponential retry for a flaky remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_tries: u32,
    /// No new attempt starts after this much time has passed.
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    pub const fn new(max_tries: u32, max_elapsed: Duration) -> Self {
        Self {
            max_tries,
            max_elapsed,
        }
    }

    pub const MERGE: RetryPolicy = RetryPolicy::new(5, Duration::from_secs(5));
    pub const FETCH: RetryPolicy = RetryPolicy::new(2, Duration::from_secs(5));
    pub const PULL_AND_PUSH: RetryPolicy = RetryPolicy::new(10, Duration::from_secs(5));

    fn delay_for(&self, attempt: u32) -> Duration {
        INITIAL_DELAY.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Run `op` until it succeeds, fails with something other than a failed
/// command, or the policy is exhausted. The last error is returned.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JobError>>,
{
    let started = Instant::now();
    let mut attempt = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        attempt += 1;

        if err.failed_command().is_none() || attempt >= policy.max_tries {
            return Err(err);
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.max_elapsed {
            return Err(err);
        }

        let delay = policy.delay_for(attempt - 1).min(policy.max_elapsed - elapsed);
        debug!(what, attempt, ?delay, error = %err, "Retrying after failure");
        sleep(delay).await;
    }
}
