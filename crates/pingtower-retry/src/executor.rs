//! Fixed-attempt retry executor driving the prober's classification loop.

use crate::events::RetryEvent;
use crate::policy::RetryPolicy;
use pingtower_core::clock::retry_backoff;
use pingtower_core::events::EventListeners;
use std::future::Future;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

/// What the caller's attempt closure decided about its own result.
pub enum AttemptOutcome<T> {
    /// Stop retrying and return this value: either a success or a failure
    /// the policy does not retry (e.g. a 4xx response).
    Done(T),
    /// This attempt failed in a retryable way; retry after backoff unless
    /// attempts are exhausted, in which case the value is still returned.
    Retryable(T),
}

/// Runs `attempt` up to `policy.max_attempts` times, sleeping
/// `base_backoff_ms * 2^(n-1) + uniform(0, jitter_ms)` between attempts that
/// were classified as [`AttemptOutcome::Retryable`]. No retry budget is
/// spent reaching exhaustion: attempt `max_attempts` is never retried even
/// if it reports `Retryable`.
pub async fn retry<F, Fut, T>(owner: &str, policy: &RetryPolicy, listeners: &EventListeners<RetryEvent>, mut attempt: F) -> T
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut n = 1;
    loop {
        let outcome = attempt(n).await;
        match outcome {
            AttemptOutcome::Done(value) => return value,
            AttemptOutcome::Retryable(value) => {
                if n >= policy.max_attempts {
                    listeners.emit(&RetryEvent::AttemptsExhausted {
                        owner: owner.to_string(),
                        timestamp: Instant::now(),
                        attempts: n,
                    });

                    #[cfg(feature = "metrics")]
                    counter!("pingtower_retry_exhausted_total", "owner" => owner.to_string())
                        .increment(1);

                    return value;
                }

                let backoff = retry_backoff(n, policy.base_backoff_ms, policy.jitter_ms);
                listeners.emit(&RetryEvent::RetryScheduled {
                    owner: owner.to_string(),
                    timestamp: Instant::now(),
                    attempt: n,
                    backoff,
                });

                #[cfg(feature = "metrics")]
                counter!("pingtower_retry_attempts_total", "owner" => owner.to_string())
                    .increment(1);

                tokio::time::sleep(backoff).await;
                n += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_try_without_sleeping() {
        let policy = RetryPolicy::new(3, 100, 0);
        let listeners = EventListeners::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result = retry("probe", &policy, &listeners, move |_n| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                AttemptOutcome::<u32>::Done(200)
            }
        })
        .await;

        assert_eq!(result, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_exhausted_then_returns_last_value() {
        let policy = RetryPolicy::new(4, 100, 0);
        let listeners = EventListeners::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let start = tokio::time::Instant::now();
        let result = retry("probe", &policy, &listeners, move |_n| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                AttemptOutcome::<u32>::Retryable(503)
            }
        })
        .await;

        assert_eq!(result, 503);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms of backoff observed between the 4 attempts.
        assert_eq!(start.elapsed(), std::time::Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_once_successful() {
        let policy = RetryPolicy::new(5, 100, 0);
        let listeners = EventListeners::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result = retry("probe", &policy, &listeners, move |n| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    AttemptOutcome::Retryable(503)
                } else {
                    AttemptOutcome::Done(200)
                }
            }
        })
        .await;

        assert_eq!(result, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
