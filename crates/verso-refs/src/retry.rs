//! Bounded, randomized retry for operations that lose a compare-and-swap.

use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;
use verso_store::RetryPolicy;

/// An operation kept losing until its attempt budget or timeout ran out.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{operation} gave up after {attempts} attempts in {elapsed_ms} ms")]
pub struct RetryExhausted {
    pub operation: String,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Randomized sleep window that doubles after every attempt.
#[derive(Clone, Debug)]
pub struct Backoff {
    lower: Duration,
    upper: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            lower: Duration::from_millis(policy.initial_sleep_lower_ms),
            upper: Duration::from_millis(policy.initial_sleep_upper_ms),
            max: Duration::from_millis(policy.max_sleep_ms),
        }
    }

    /// Pick a sleep inside the current window, then widen the window.
    pub fn next_sleep(&mut self) -> Duration {
        let sleep = if self.upper > self.lower {
            rand::thread_rng().gen_range(self.lower..=self.upper)
        } else {
            self.lower
        };
        self.lower = (self.lower * 2).min(self.max);
        self.upper = (self.upper * 2).min(self.max);
        sleep
    }
}

/// Run `op` until it succeeds, fails with an error `should_retry` rejects,
/// or the policy's attempt count or timeout is exhausted.
///
/// `op` receives the 1-based attempt number and must re-read whatever state
/// it depends on; nothing is carried over between attempts.
pub fn retry<T, E, F, R>(
    policy: &RetryPolicy,
    operation: &str,
    should_retry: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: From<RetryExhausted> + std::fmt::Display,
{
    let start = Instant::now();
    let deadline = start + policy.timeout();
    let mut backoff = Backoff::new(policy);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => e,
        };
        let now = Instant::now();
        if attempt >= policy.max_attempts || now >= deadline {
            debug!(operation, attempt, error = %err, "retries exhausted");
            return Err(RetryExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                elapsed_ms: start.elapsed().as_millis() as u64,
            }
            .into());
        }
        let sleep = backoff.next_sleep().min(deadline - now);
        debug!(operation, attempt, sleep_ms = sleep.as_millis() as u64, error = %err, "retrying");
        thread::sleep(sleep);
    }
}
