//! Bounded retry with per-attempt timeouts for external model calls.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{TemporaError, TemporaResult};

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call.
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds).
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (milliseconds).
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub multiplier: f32,
    /// Time bound for a single attempt (seconds).
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0_f32,
            timeout_secs: 120,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_max_times(self.max_retries as usize)
            .with_min_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_factor(self.multiplier)
    }
}

/// Run `operation` under `policy`.
///
/// Each attempt is bounded by the policy timeout. Only transient errors
/// (see [`TemporaError::is_transient`]) are retried; the last error is
/// returned once the attempts are exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> TemporaResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TemporaResult<T>>,
{
    let limit = policy.timeout();
    let attempt = || {
        let fut = f();
        async move {
            match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(TemporaError::timeout(operation, limit.as_millis() as u64)),
            }
        }
    };

    attempt
        .retry(policy.backoff())
        .when(|e: &TemporaError| e.is_transient())
        .notify(|err, dur| {
            tracing::warn!(
                "{} failed, retrying in {:?}: {}",
                operation,
                dur,
                err
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), "summarize", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TemporaError::rate_limit("slow down"))
                } else {
                    Ok("merged")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "merged");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: TemporaResult<()> = with_retry(&fast_policy(3), "classify", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TemporaError::classification("not json")) }
        })
        .await;

        assert!(matches!(result, Err(TemporaError::Classification { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: TemporaResult<()> = with_retry(&fast_policy(2), "extract", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TemporaError::llm("upstream failure")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_reported() {
        let policy = RetryPolicy {
            timeout_secs: 1,
            ..RetryPolicy::no_retry()
        };
        let result: TemporaResult<()> = with_retry(&policy, "summarize", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(TemporaError::Timeout { .. })));
    }
}
