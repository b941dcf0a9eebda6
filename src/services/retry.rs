use std::future::Future;
use std::time::Duration;

use crate::error::RecommendationError;

/// Decides whether a failed completion attempt is repeated.
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is the number of attempts made so far (1 after the first).
    /// Returns the delay before the next attempt, or `None` to give up.
    fn next_delay(&self, attempt: u32, error: &RecommendationError) -> Option<Duration>;
}

/// One attempt, no retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _error: &RecommendationError) -> Option<Duration> {
        None
    }
}

/// Doubling delay between attempts, for transport failures only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, error: &RecommendationError) -> Option<Duration> {
        if !error.kind.is_retryable() || attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Runs `operation` until it succeeds or `policy` gives up.
/// Returns the last outcome and the number of attempts made.
pub async fn with_retry<P, F, Fut, T>(policy: &P, mut operation: F) -> (Result<T, RecommendationError>, u32)
where
    P: RetryPolicy + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RecommendationError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return (Ok(value), attempt),
            Err(err) => match policy.next_delay(attempt, &err) {
                Some(delay) => {
                    tracing::warn!(
                        "Completion attempt {} failed ({}), retrying in {:?}",
                        attempt,
                        err.kind,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return (Err(err), attempt),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_backoff(max_attempts: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ExponentialBackoff {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        let err = RecommendationError::transport("reset");
        assert_eq!(policy.next_delay(1, &err), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2, &err), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3, &err), Some(Duration::from_millis(350)));
    }

    #[test]
    fn backoff_never_retries_auth_or_provider_failures() {
        let policy = fast_backoff(5);
        assert_eq!(policy.next_delay(1, &RecommendationError::auth("bad key")), None);
        assert_eq!(policy.next_delay(1, &RecommendationError::provider("429")), None);
    }

    #[tokio::test]
    async fn no_retry_makes_exactly_one_attempt() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retry(&NoRetry, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RecommendationError::transport("down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let (result, attempts) = with_retry(&fast_backoff(3), |attempt| async move {
            if attempt < 3 {
                Err(RecommendationError::transport("timeout"))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (result, attempts) = with_retry(&fast_backoff(2), |_| async {
            Err::<(), _>(RecommendationError::transport("timeout"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind, crate::error::FailureKind::Transport);
        assert_eq!(attempts, 2);
    }
}
