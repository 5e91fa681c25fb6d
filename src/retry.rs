//! Bounded retry with a deadline.
//!
//! A single primitive shared by every polling site in the install workflow.
//! An attempt runs immediately; retryable failures sleep according to the
//! [`Backoff`] and try again until the policy's deadline or attempt budget
//! is spent. The final sleep is clamped so the last attempt lands exactly on
//! the deadline.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation failed with an error the predicate considered fatal.
    #[error(transparent)]
    Permanent(E),

    /// The deadline or attempt budget ran out. Carries the last error seen.
    #[error("gave up after {attempts} attempts ({elapsed:?}): {last}")]
    Exhausted {
        last: E,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// The underlying error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Permanent(e) => Some(e),
            Self::Exhausted { last, .. } => Some(last),
            Self::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay between every attempt.
    Constant(Duration),
    /// Delays follow the Fibonacci sequence scaled by the base: 1, 1, 2, 3, 5...
    Fibonacci(Duration),
}

impl Backoff {
    fn delays(self) -> impl Iterator<Item = Duration> {
        let mut state = (1u32, 1u32);
        std::iter::from_fn(move || {
            let delay = match self {
                Backoff::Constant(d) => d,
                Backoff::Fibonacci(base) => {
                    let (a, b) = state;
                    state = (b, a.saturating_add(b));
                    base.saturating_mul(a)
                }
            };
            Some(delay)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub max_duration: Option<Duration>,
    /// Total attempts, including the first one.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Exactly one attempt, never retried.
    pub fn once() -> Self {
        Self {
            backoff: Backoff::Constant(Duration::ZERO),
            max_duration: None,
            max_attempts: Some(1),
        }
    }

    pub fn constant(interval: Duration, max_duration: Duration) -> Self {
        Self {
            backoff: Backoff::Constant(interval),
            max_duration: Some(max_duration),
            max_attempts: None,
        }
    }

    pub fn fibonacci(base: Duration, max_duration: Duration) -> Self {
        Self {
            backoff: Backoff::Fibonacci(base),
            max_duration: Some(max_duration),
            max_attempts: None,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy gives up.
///
/// `is_retryable` decides which errors are worth another attempt. Every other
/// error is returned immediately as [`RetryError::Permanent`].
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let start = Instant::now();
    let deadline = policy.max_duration.map(|d| start + d);
    let mut delays = policy.backoff.delays();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        attempts += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(RetryError::Permanent(e)),
            Err(e) => e,
        };

        let exhausted = |last: E| RetryError::Exhausted {
            last,
            attempts,
            elapsed: start.elapsed(),
        };

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(exhausted(err));
        }

        let mut delay = delays.next().unwrap_or_default();
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(exhausted(err));
            }
            delay = delay.min(deadline - now);
        }

        debug!(attempt = attempts, ?delay, "retrying after backoff");
        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
