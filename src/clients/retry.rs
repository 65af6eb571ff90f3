// src/clients/retry.rs
//! Bounded exponential backoff around a single remote call.

use super::{ServiceError, TransportError};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Deterministic doubling schedule (no jitter, no elapsed-time cap)
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. The closure receives the 1-based attempt number.
pub async fn retry_with_backoff<F, Fut, T>(
    service: &'static str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut schedule = policy.schedule();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(service, attempt, "✅ Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(service, attempt, "Permanent failure: {}", error);
                return Err(ServiceError::Permanent { service, source: error });
            }
            Err(error) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(service, attempt, "Giving up: {}", error);
                    return Err(ServiceError::Transport {
                        service,
                        attempts: attempt,
                        last: error,
                    });
                }
                let delay = schedule.next_backoff().unwrap_or(policy.max_delay);
                tracing::warn!(service, attempt, delay_ms = delay.as_millis() as u64, "Transient failure (retrying): {}", error);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts_with_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff("test", &policy(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(TransportError::Connect(format!("refused #{}", attempt))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ServiceError::Transport { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("refused #3"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff("test", &policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Rejected { status: 401, body: "bad token".into() }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ServiceError::Permanent { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_double_from_base() {
        let start = tokio::time::Instant::now();
        let mut seen = Vec::new();
        let result = retry_with_backoff("test", &policy(), |attempt| {
            seen.push(start.elapsed());
            async move {
                if attempt < 3 {
                    Err(TransportError::Unavailable("loading".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(
            seen,
            vec![Duration::ZERO, Duration::from_millis(100), Duration::from_millis(300)]
        );
    }
}
