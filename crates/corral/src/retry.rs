//! A bounded-duration retry combinator with exponential backoff and jitter.
//!
//! This is a pure control-flow primitive: it has no side effects beyond the
//! wrapped operation's, and its attempt state (start time, attempt counter)
//! lives only for the duration of one call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{CacheContents, CacheError, ErrorKind};

/// The default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Retries `operation` until it succeeds or the time `budget` is spent.
///
/// If `retry_on` is given, only errors of that kind are retried; any other
/// error propagates immediately. Once the budget is exhausted, the last
/// error is returned wrapped in [`CacheError::RetryBudgetExhausted`].
///
/// The delay before attempt `n` is `base_delay * 2^n` plus a random jitter
/// of up to one `base_delay`, clamped to the remaining budget. There is no
/// attempt cap other than the budget.
pub async fn retry_with_backoff<T, F, Fut>(
    budget: Duration,
    base_delay: Duration,
    retry_on: Option<ErrorKind>,
    mut operation: F,
) -> CacheContents<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CacheContents<T>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if let Some(kind) = retry_on {
            if err.kind() != kind {
                return Err(err);
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= budget {
            return Err(CacheError::RetryBudgetExhausted {
                budget,
                source: Box::new(err),
            });
        }

        let remaining = budget - elapsed;
        tokio::time::sleep(backoff_delay(base_delay, attempt).min(remaining)).await;
        attempt += 1;
    }
}

/// Computes `base * 2^attempt + random(0, base)`, saturating.
fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    let exponential = base_delay.saturating_mul(1u32 << attempt.min(31));
    exponential.saturating_add(base_delay.mul_f64(rand::random::<f64>()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_success_is_immediate() {
        let calls = AtomicUsize::new(0);
        let res = retry_with_backoff(Duration::from_secs(1), DEFAULT_BASE_DELAY, None, || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Ok(42) }
        })
        .await;

        assert_eq!(res, Ok(42));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicUsize::new(0);
        let res = retry_with_backoff(
            Duration::from_secs(30),
            DEFAULT_BASE_DELAY,
            Some(ErrorKind::LockBusy),
            || {
                let call = calls.fetch_add(1, Ordering::Relaxed);
                async move {
                    if call < 2 {
                        Err(CacheError::LockBusy)
                    } else {
                        Ok("won")
                    }
                }
            },
        )
        .await;

        assert_eq!(res, Ok("won"));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates() {
        let calls = AtomicUsize::new(0);
        let res: CacheContents<()> = retry_with_backoff(
            Duration::from_secs(30),
            DEFAULT_BASE_DELAY,
            Some(ErrorKind::LockBusy),
            || {
                calls.fetch_add(1, Ordering::Relaxed);
                async { Err(CacheError::Store("connection reset".into())) }
            },
        )
        .await;

        assert_eq!(res, Err(CacheError::Store("connection reset".into())));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_carries_last_error() {
        let budget = Duration::from_secs(1);
        let start = Instant::now();
        let res: CacheContents<()> =
            retry_with_backoff(budget, DEFAULT_BASE_DELAY, Some(ErrorKind::LockBusy), || async {
                Err(CacheError::LockBusy)
            })
            .await;

        assert_eq!(
            res,
            Err(CacheError::RetryBudgetExhausted {
                budget,
                source: Box::new(CacheError::LockBusy),
            })
        );
        // The loop never sleeps past the budget: with instantaneous attempts
        // the total time spent is bounded by the budget itself.
        assert!(start.elapsed() <= budget + DEFAULT_BASE_DELAY);
    }
}
