//! Retry with capped exponential backoff around a single provider call.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use super::GenerationError;

/// How many attempts a provider call gets and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Treated as at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the k-th retry (k starts at 1): `min(base * 2^(k-1), max)`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Drives `attempt` until it yields non-blank text, a non-retryable error occurs,
/// or the policy's attempts are used up. Blank text counts as `EmptyResponse`.
///
/// The closure receives the 1-based attempt number.
pub async fn generate_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<String, GenerationError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String, GenerationError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut number = 0;

    loop {
        number += 1;
        let outcome = attempt(number).await.and_then(|text| {
            if text.trim().is_empty() {
                Err(GenerationError::empty_response())
            } else {
                Ok(text)
            }
        });

        let err = match outcome {
            Ok(text) => {
                info!(
                    attempt = number,
                    response_length = text.len(),
                    "Content generated"
                );
                return Ok(text);
            }
            Err(err) => err,
        };

        let will_retry = err.kind.is_retryable() && number < max_attempts;
        warn!(
            attempt = number,
            max_attempts,
            kind = ?err.kind,
            will_retry,
            "Generation attempt failed: {}",
            err.message
        );

        if !will_retry {
            return Err(err);
        }

        let delay = policy.delay_before_retry(number);
        info!("Retrying in {}ms...", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;
    use crate::llm_client::GenerationErrorKind;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        }
    }

    fn overloaded() -> GenerationError {
        GenerationError::classify(Some(503), None, "overloaded")
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let p = policy(10);
        assert_eq!(p.delay_before_retry(1), Duration::from_millis(100));
        assert_eq!(p.delay_before_retry(2), Duration::from_millis(200));
        assert_eq!(p.delay_before_retry(3), Duration::from_millis(300));
        assert_eq!(p.delay_before_retry(40), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retryable_failures_with_backoff() {
        let p = policy(4);
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = calls.clone();

        let result = generate_with_retry(&p, |n| {
            recorder.lock().unwrap().push(Instant::now());
            async move {
                if n < 4 {
                    Err(overloaded())
                } else {
                    Ok("article".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "article");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        for k in 1..calls.len() {
            let waited = calls[k] - calls[k - 1];
            assert_eq!(waited, p.delay_before_retry(k as u32));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let mut seen = 0;
        let result = generate_with_retry(&policy(3), |n| {
            seen = n;
            async move {
                Err(GenerationError::classify(
                    Some(429),
                    None,
                    &format!("attempt {n}"),
                ))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(seen, 3);
        assert_eq!(err.kind, GenerationErrorKind::RateLimited);
        assert_eq!(err.message, "attempt 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let mut seen = 0;
        let result = generate_with_retry(&policy(5), |n| {
            seen = n;
            async { Err(GenerationError::classify(Some(404), None, "no such model")) }
        })
        .await;

        assert_eq!(seen, 1);
        assert_eq!(result.unwrap_err().kind, GenerationErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_text_is_empty_response_not_success() {
        let mut seen = 0;
        let result = generate_with_retry(&policy(3), |n| {
            seen = n;
            async { Ok("   \n ".to_string()) }
        })
        .await;

        assert_eq!(seen, 1);
        assert_eq!(result.unwrap_err().kind, GenerationErrorKind::EmptyResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_calls_once() {
        let result = generate_with_retry(&policy(0), |_| async { Ok("ok".to_string()) }).await;
        assert_eq!(result.unwrap(), "ok");
    }
}
