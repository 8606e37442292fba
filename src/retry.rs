//! Exponential backoff for remote calls.
//!
//! Only errors that report themselves as transient are retried. The
//! cancellation token is checked before each attempt, while an attempt is in
//! flight, and while sleeping between attempts.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, QueryError};

pub const MAX_MULTIPLIER: f64 = 100.0;

pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for QueryError {
    fn is_transient(&self) -> bool {
        QueryError::is_transient(self)
    }
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Upper bound of the extra fraction added to each delay. Jitter only
    /// lengthens delays, and each delay is at least the previous actual delay
    /// times `multiplier` until `max_delay`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 1.5,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
        Self {
            max_retries,
            multiplier,
            ..Default::default()
        }
    }

    /// Rejects multipliers that are non-finite, below 1 or above `MAX_MULTIPLIER`.
    pub fn check_multiplier(multiplier: f64) -> Result<(), String> {
        if multiplier.is_finite() && (1.0..=MAX_MULTIPLIER).contains(&multiplier) {
            Ok(())
        } else {
            Err(format!("must be between 1 and {MAX_MULTIPLIER}, got {multiplier}"))
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry `n` (1-indexed), without jitter.
    pub fn delay_for_retry(&self, n: u32) -> Duration {
        if n == 0 {
            return Duration::ZERO;
        }
        let exp = i32::try_from(n - 1).unwrap_or(i32::MAX);
        self.capped(self.initial_delay.as_secs_f64() * self.multiplier.powi(exp))
    }

    /// Delay before the next retry given the delay actually slept before the
    /// previous one (`None` for the first retry). Jitter is applied on top of
    /// `max(base, previous * multiplier)`.
    pub fn next_delay(&self, n: u32, previous: Option<Duration>) -> Duration {
        let base = self.delay_for_retry(n).as_secs_f64();
        let floor = previous.map_or(0.0, |p| p.as_secs_f64() * self.multiplier);
        let mut secs = base.max(floor);
        if self.jitter > 0.0 {
            secs *= 1.0 + rand::rng().random_range(0.0..self.jitter);
        }
        self.capped(secs)
    }

    /// Cap in f64 seconds before building a `Duration`, so huge or non-finite
    /// products never reach `Duration` arithmetic.
    fn capped(&self, secs: f64) -> Duration {
        let max = self.max_delay.as_secs_f64();
        if secs.is_nan() || secs >= max {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.max_delay)
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    Cancelled { attempts: u32 },
    /// Permanent failure, or the last transient failure once retries ran out.
    Failed { attempts: u32, source: E },
}

/// Run `op` until it succeeds, fails permanently, exhausts the policy, or the
/// token is cancelled. `op` receives the 1-indexed attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    let mut previous_delay = None;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            r = op(attempt) => r,
        };

        let err = match result {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        let retries_used = attempt - 1;
        if !err.is_transient() || retries_used >= policy.max_retries {
            if err.is_transient() {
                tracing::error!(
                    "{operation}: giving up after {attempt} attempt(s): {err}"
                );
            }
            return Err(RetryError::Failed {
                attempts: attempt,
                source: err,
            });
        }

        let delay = policy.next_delay(attempt, previous_delay);
        previous_delay = Some(delay);
        tracing::warn!(
            "{operation}: attempt {attempt}/{} failed, retrying in {delay:?}: {err}",
            policy.max_retries + 1
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
