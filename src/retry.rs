//! Retry/Timeout Harness (component B): wraps any fallible async operation
//! with policy-driven retries, per-attempt timeouts, and error
//! classification.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AgentError;

/// How long to wait between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffStrategy {
    Immediate,
    FixedDelay,
    ExponentialBackoff,
}

/// Soft cap applied to exponential backoff so a flaky endpoint can't push a
/// retry delay out to minutes.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

impl BackoffStrategy {
    fn delay_for(&self, attempt: u32, base: Duration) -> Duration {
        match self {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::FixedDelay => base,
            BackoffStrategy::ExponentialBackoff => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                std::cmp::min(base.saturating_mul(factor), MAX_BACKOFF)
            }
        }
    }
}

/// Decides whether a given error should be retried. The default
/// implementation matches spec §4.B's rule (network-level errors, HTTP
/// 408/425/429/5xx, explicit `retryable=true` metadata); callers may supply
/// their own per the open question in spec §9.
pub trait RetryClassifier: Send + Sync {
    fn is_retryable(&self, err: &AgentError) -> bool;
}

pub struct DefaultClassifier;

impl RetryClassifier for DefaultClassifier {
    fn is_retryable(&self, err: &AgentError) -> bool {
        err.is_retryable()
    }
}

/// Policy controlling one harness-wrapped call.
#[derive(Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
    pub strategy: BackoffStrategy,
    pub timeout: Option<Duration>,
    pub classifier: Arc<dyn RetryClassifier>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_millis(0),
            strategy: BackoffStrategy::Immediate,
            timeout: None,
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            retries,
            delay,
            strategy,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

/// Observes each retry as it happens (attempt number, 1-based, and the error
/// that triggered it). The spec requires each retry be "observable via a
/// hook"; a no-op closure is the default when callers don't care.
pub type RetryHook<'a> = &'a (dyn Fn(u32, &AgentError) + Send + Sync);

fn noop_hook(_attempt: u32, _err: &AgentError) {}

/// Runs `f` under `policy`, retrying per its strategy/classifier and racing
/// each attempt against `policy.timeout` when set.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    on_retry: Option<RetryHook<'_>>,
    mut f: F,
) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let hook: &(dyn Fn(u32, &AgentError) + Send + Sync) = on_retry.unwrap_or(&noop_hook);
    let max_attempts = policy.retries + 1;
    let mut last_err: Option<AgentError> = None;

    for attempt in 1..=max_attempts {
        let attempt_result = match policy.timeout {
            Some(t) => match tokio::time::timeout(t, f()).await {
                Ok(r) => r,
                Err(_) => Err(AgentError::TimeoutError(t)),
            },
            None => f().await,
        };

        match attempt_result {
            Ok(v) => return Ok(v),
            Err(err) => {
                let retryable = policy.classifier.is_retryable(&err);
                if !retryable || attempt == max_attempts {
                    if attempt > 1 {
                        return Err(AgentError::RetryExhaustedError {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    return Err(err);
                }
                hook(attempt, &err);
                last_err = Some(err);
                let wait = policy.strategy.delay_for(attempt, policy.delay);
                if wait > Duration::ZERO {
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    // Unreachable in practice: the loop above always returns on the final
    // attempt. Kept so the function is total.
    Err(last_err.unwrap_or(AgentError::TimeoutError(Duration::ZERO)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retryable_err() -> AgentError {
        AgentError::McpToolError {
            message: "flaky".into(),
            meta: crate::error::ErrorMeta::new("test", true),
        }
    }

    fn non_retryable_err() -> AgentError {
        AgentError::ValidationError("bad args".into())
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy::default();
        let result = with_retry(&policy, None, || async { Ok::<_, AgentError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_up_to_budget_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1), BackoffStrategy::Immediate);
        let result = with_retry(&policy, None, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(retryable_err())
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_short_circuits_immediately() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), BackoffStrategy::Immediate);
        let result: Result<i32, AgentError> = with_retry(&policy, None, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(non_retryable_err()) }
        })
        .await;
        assert!(matches!(result, Err(AgentError::ValidationError(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_reports_attempt_count() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), BackoffStrategy::Immediate);
        let result: Result<i32, AgentError> =
            with_retry(&policy, None, || async { Err(retryable_err()) }).await;
        match result {
            Err(AgentError::RetryExhaustedError { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetryExhaustedError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_hook_is_invoked_per_retry() {
        let seen = std::sync::Mutex::new(Vec::new());
        let hook = |attempt: u32, _err: &AgentError| seen.lock().unwrap().push(attempt);
        let policy = RetryPolicy::new(2, Duration::from_millis(1), BackoffStrategy::Immediate);
        let attempts = AtomicU32::new(0);
        let _ = with_retry(&policy, Some(&hook), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(retryable_err()) }
        })
        .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn timeout_wins_and_is_treated_as_retryable() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1), BackoffStrategy::Immediate)
            .with_timeout(Duration::from_millis(10));
        let result: Result<i32, AgentError> = with_retry(&policy, None, || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(AgentError::RetryExhaustedError { .. })));
    }

    #[test]
    fn exponential_backoff_caps_at_soft_limit() {
        let d = BackoffStrategy::ExponentialBackoff.delay_for(20, Duration::from_millis(100));
        assert_eq!(d, MAX_BACKOFF);
    }
}
