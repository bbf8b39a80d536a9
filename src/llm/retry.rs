//! Bounded retry with exponential backoff.
//!
//! The loop takes both the operation and the sleep as closures so attempt
//! counts and delays are observable without a network or a clock.

use super::LlmError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Why the retry loop gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: LlmError,
}

impl RetryFailure {
    pub fn message(&self) -> String {
        if self.error.is_transient() {
            format!(
                "LLM request failed after {} attempts: {}",
                self.attempts, self.error
            )
        } else {
            format!("LLM request failed: {}", self.error)
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// `op` receives the 1-based attempt number. `sleep` is awaited between
/// attempts with the policy's delay.
pub async fn call_with_retry<T, Op, Fut, Sleep, SleepFut>(
    policy: &RetryPolicy,
    mut op: Op,
    mut sleep: Sleep,
) -> Result<T, RetryFailure>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
    Sleep: FnMut(Duration) -> SleepFut,
    SleepFut: Future<Output = ()>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() || attempt >= policy.max_attempts => {
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "LLM request failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn transient() -> LlmError {
        LlmError::Http {
            status: 503,
            body: "busy".into(),
        }
    }

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let slept = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(Mutex::new(0u32));

        let result = call_with_retry(
            &policy,
            |attempt| {
                *calls.lock().unwrap() += 1;
                async move {
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |delay| {
                slept.lock().unwrap().push(delay);
                async {}
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(
            *slept.lock().unwrap(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let failure = call_with_retry(
            &policy,
            |_| async { Err::<(), _>(LlmError::Network("refused".into())) },
            |_| async {},
        )
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 2);
        assert!(failure.message().contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = Arc::new(Mutex::new(0u32));

        let failure = call_with_retry(
            &policy,
            |_| {
                *calls.lock().unwrap() += 1;
                async {
                    Err::<(), _>(LlmError::Http {
                        status: 401,
                        body: "invalid api key".into(),
                    })
                }
            },
            |_| async {},
        )
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(failure.message().contains("invalid api key"));
    }
}
