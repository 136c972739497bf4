//! Bounded retry around a fallible async operation.
use std::future::Future;
use std::num::NonZeroU8;
use std::time::Duration;

use log::debug;
use tokio::time;

use super::prober::ProbeOutcome;

/// How an attempt went, as far as retrying is concerned.
pub trait Attempt {
    /// Whether the attempt did what was asked.
    fn succeeded(&self) -> bool;

    /// Whether a failed attempt is worth repeating. Only consulted when
    /// [`succeeded`](Attempt::succeeded) is `false`.
    fn retryable(&self) -> bool {
        true
    }
}

impl Attempt for bool {
    fn succeeded(&self) -> bool {
        *self
    }
}

impl<T, E> Attempt for Result<T, E> {
    fn succeeded(&self) -> bool {
        self.is_ok()
    }
}

/// A confirmed absence is final. Only transport failures are retried.
impl Attempt for ProbeOutcome {
    fn succeeded(&self) -> bool {
        *self == Self::Found
    }

    fn retryable(&self) -> bool {
        *self == Self::TransportError
    }
}

/// Up to `attempts` tries with an optional pause in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: NonZeroU8,
    delay: Duration,
}

impl RetryPolicy {
    /// A budget of 0 is corrected to 1.
    pub fn new(attempts: u8) -> Self {
        Self {
            attempts: NonZeroU8::new(attempts).unwrap_or(NonZeroU8::MIN),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    /// Sleep for `delay` between attempts.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total attempts, including the first.
    pub const fn attempts(&self) -> u8 {
        self.attempts.get()
    }

    /// Runs `operation` until it succeeds, fails for good, or the budget is
    /// spent. The attempt number (starting at 1) is passed in.
    ///
    /// Running out of budget is not an error; it just yields `false`.
    pub async fn run<F, Fut, A>(&self, mut operation: F) -> bool
    where
        F: FnMut(u8) -> Fut,
        Fut: Future<Output = A>,
        A: Attempt,
    {
        let tries = self.attempts.get();
        for nr_try in 1..=tries {
            let outcome = operation(nr_try).await;
            if outcome.succeeded() {
                debug!("Succeeded after {nr_try} tries");
                return true;
            }
            if !outcome.retryable() {
                return false;
            }
            if nr_try < tries {
                debug!("Retrying ({} retries left)...", tries - nr_try);
                if !self.delay.is_zero() {
                    time::sleep(self.delay).await;
                }
            }
        }

        debug!("Max retries reached");
        false
    }
}

/// Shorthand for [`RetryPolicy::run`] without a delay.
pub async fn with_retry<F, Fut, A>(operation: F, budget: u8) -> bool
where
    F: FnMut(u8) -> Fut,
    Fut: Future<Output = A>,
    A: Attempt,
{
    RetryPolicy::new(budget).run(operation).await
}
