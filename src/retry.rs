//! Fixed-interval retry with a keep-going predicate
//!
//! The helper knows nothing about containers: the caller supplies the
//! attempt, the predicate consulted before every retry, and the
//! cancellation token that interrupts the wait between attempts.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often and how many times to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between two attempts
    pub interval: Duration,
    /// Total attempts allowed, `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry until success, the predicate or cancellation stops it
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` attempts
    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// How a retry sequence ended
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded
    Succeeded { value: T, attempts: u32 },
    /// The attempt budget ran out
    Exhausted { last_error: E, attempts: u32 },
    /// The predicate asked to stop before a retry
    Abandoned { last_error: E, attempts: u32 },
    /// Cancelled while waiting for the next attempt
    Cancelled { attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Abandoned { attempts, .. }
            | RetryOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

/// Run `attempt` until it succeeds
///
/// Attempts are numbered from 1. After a failure the helper waits
/// `policy.interval`, then asks `before_retry` whether to go on. The
/// predicate is never consulted before the first attempt.
pub async fn retry<T, E, A, AFut, P, PFut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: A,
    mut before_retry: P,
) -> RetryOutcome<T, E>
where
    A: FnMut(u32) -> AFut,
    AFut: Future<Output = Result<T, E>>,
    P: FnMut() -> PFut,
    PFut: Future<Output = bool>,
{
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);

        let last_error = match attempt(attempts).await {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts },
            Err(e) => e,
        };

        if !policy.allows(attempts) {
            return RetryOutcome::Exhausted {
                last_error,
                attempts,
            };
        }

        if !sleep_or_cancel(policy.interval, cancel).await {
            return RetryOutcome::Cancelled { attempts };
        }

        if !before_retry().await {
            return RetryOutcome::Abandoned {
                last_error,
                attempts,
            };
        }
    }
}

/// Sleep for `duration` unless cancelled first
///
/// Returns `false` when the token fired.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let outcome = retry(
            &policy,
            &cancel,
            |n| async move { if n < 4 { Err("not yet") } else { Ok(n) } },
            || async { true },
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                assert_eq!(value, 4);
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_policy_exhausts() {
        let policy = RetryPolicy::bounded(Duration::from_secs(1), 3);
        let cancel = CancellationToken::new();

        let outcome: RetryOutcome<(), &str> = retry(
            &policy,
            &cancel,
            |_| async { Err("down") },
            || async { true },
        )
        .await;

        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted { last_error: "down", attempts: 3 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_abandons_before_retry() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let checks = Cell::new(0);

        let outcome: RetryOutcome<(), &str> = retry(
            &policy,
            &cancel,
            |_| async { Err("refused") },
            || {
                checks.set(checks.get() + 1);
                let keep_going = checks.get() < 2;
                async move { keep_going }
            },
        )
        .await;

        assert_eq!(outcome.attempts(), 2);
        assert!(matches!(outcome, RetryOutcome::Abandoned { .. }));
        assert_eq!(checks.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_not_consulted_on_first_success() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let checks = Cell::new(0);

        let outcome: RetryOutcome<u8, &str> = retry(
            &policy,
            &cancel,
            |_| async { Ok(7) },
            || {
                checks.set(checks.get() + 1);
                async { true }
            },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Succeeded { value: 7, attempts: 1 }));
        assert_eq!(checks.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome: RetryOutcome<(), &str> = retry(
            &policy,
            &cancel,
            |_| async { Err("never") },
            || async { true },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Cancelled { attempts: 1 }));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_bounded_policy_needs_one_attempt() {
        let policy = RetryPolicy::bounded(Duration::ZERO, 0);
        assert_eq!(policy.max_attempts, Some(1));
        assert!(!policy.allows(1));
        assert!(RetryPolicy::unbounded(Duration::ZERO).allows(u32::MAX));
    }
}
