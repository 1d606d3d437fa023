//! Retry for short catalog writes that hit SQLite's writer lock
//!
//! Only "database is locked"/"busy" errors are retried. Everything else,
//! including a lock that outlives `max_lock_wait_ms`, is returned to the
//! caller.

use std::time::{Duration, Instant};
use stash_common::{Error, Result};

const FIRST_DELAY_MS: u64 = 10;
const MAX_DELAY_MS: u64 = 1000;

/// Doubling delay schedule bounded by an overall deadline
struct Backoff {
    started: Instant,
    budget: Duration,
    next_delay_ms: u64,
    attempts: u32,
}

impl Backoff {
    fn new(budget_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: Duration::from_millis(budget_ms),
            next_delay_ms: FIRST_DELAY_MS,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    fn next(&mut self) -> Option<Duration> {
        if self.started.elapsed() >= self.budget {
            return None;
        }
        let delay = Duration::from_millis(self.next_delay_ms);
        self.next_delay_ms = (self.next_delay_ms * 2).min(MAX_DELAY_MS);
        Some(delay)
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// Run `operation` until it stops failing with a lock error or
/// `max_wait_ms` has passed
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(max_wait_ms);

    loop {
        backoff.attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if backoff.attempts > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempts = backoff.attempts,
                        elapsed_ms = backoff.elapsed_ms() as u64,
                        "Catalog write went through after lock contention"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_database_locked() => err,
            Err(err) => return Err(err),
        };

        let Some(delay) = backoff.next() else {
            tracing::error!(
                operation = operation_name,
                attempts = backoff.attempts,
                max_wait_ms,
                error = %err,
                "Gave up waiting for the catalog lock"
            );
            return Err(Error::Internal(format!(
                "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                backoff.attempts,
                backoff.elapsed_ms(),
                max_wait_ms
            )));
        };

        tracing::debug!(
            operation = operation_name,
            attempt = backoff.attempts,
            delay_ms = delay.as_millis() as u64,
            "Catalog locked, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
