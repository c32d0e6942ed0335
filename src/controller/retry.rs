//! Cancellable background retry with capped exponential backoff
//!
//! The managed path keeps reconciling until it succeeds. Each failure waits
//! for the next delay (with jitter) or for cancellation, whichever comes
//! first, so shutdown never waits on a sleeping retry.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 1.0 keeps the delay fixed
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Jittered into 0.5x..1.5x, never above the cap
    fn jittered(&self, delay: Duration) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(
            (delay.as_secs_f64() * jitter).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds. Returns `None` once `token` is
/// cancelled, including while an attempt is in flight.
pub async fn run_until_success<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    token: &CancellationToken,
    mut operation: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return None;
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            result = operation() => result,
        };

        let e = match result {
            Ok(value) => return Some(value),
            Err(e) => e,
        };

        let delay = policy.jittered(policy.delay_for(attempt));
        if e.is_retriable() {
            warn!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "Operation failed, retrying"
            );
        } else {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "Operation failed until the configuration is fixed, retrying"
            );
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy {
            multiplier: 1.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1), policy.delay_for(20));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let count = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();
        let c = Arc::clone(&count);

        let result = run_until_success(&fast_policy(), "reconcile", &token, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(Error::Timeout("kafka".to_string()))
                } else {
                    Ok("connected")
                }
            }
        })
        .await;

        assert_eq!(result, Some("connected"));
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_config_errors_keep_retrying() {
        let count = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();
        let c = Arc::clone(&count);

        let result = run_until_success(&fast_policy(), "reconcile", &token, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::ConfigError("missing bootstrap_server".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(result, Some(()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_loop() {
        let token = CancellationToken::new();
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 1.0,
        };

        let task = {
            let token = token.clone();
            tokio::spawn(async move {
                run_until_success(&policy, "reconcile", &token, || async {
                    Err::<(), _>(Error::Timeout("kafka".to_string()))
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop stops promptly")
            .expect("task");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let result = run_until_success(&fast_policy(), "reconcile", &token, || async {
            Ok::<_, Error>(1)
        })
        .await;
        assert_eq!(result, None);
    }
}
