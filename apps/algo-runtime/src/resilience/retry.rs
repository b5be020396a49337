//! Bounded fixed-interval retry for fallible remote operations.
//!
//! Remote exchange calls fail transiently (timeouts, rate limits) and the
//! runtime must not run a strategy on unknown capital, so every gateway call
//! goes through [`RetryExecutor`]. The executor retries only errors the
//! operation marks as retryable, sleeps a fixed interval between attempts
//! (no jitter, no backoff multiplier - attempt counts must be exactly
//! reproducible in tests), and escalates to [`RetryError::Exhausted`] once
//! the attempt budget is spent.
//!
//! | Retried | Not retried |
//! |---------|-------------|
//! | Transient request failures | Bad credentials |
//! | Timeouts, rate limits | Unsupported order types |
//! | Connection resets | Validation failures |
//!
//! Sleeping and retry observation are both injected so tests can assert the
//! exact attempt count and sleep schedule without waiting on real time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors that can classify themselves as retryable.
pub trait Retryable {
    /// Whether a retry may succeed where this error failed.
    fn is_retryable(&self) -> bool;
}

/// Retry policy for remote exchange operations.
///
/// Configured once at runtime construction; immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first call (must be >= 1).
    pub max_attempts: u32,
    /// Fixed sleep between attempts.
    pub sleep_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            sleep_interval: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub const fn new(max_attempts: u32, sleep_interval: Duration) -> Self {
        Self {
            max_attempts,
            sleep_interval,
        }
    }

    /// Policy that never retries (single attempt).
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            sleep_interval: Duration::ZERO,
        }
    }
}

/// Errors from a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The attempt budget was spent without a success.
    #[error("{op} failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Name of the retried operation.
        op: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last error observed.
        #[source]
        source: E,
    },

    /// A non-retryable error was observed; no retry was attempted.
    #[error(transparent)]
    Fatal(E),
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The underlying error, regardless of variant.
    pub const fn source_error(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } | Self::Fatal(source) => source,
        }
    }
}

/// Injected sleep, so tests can record intervals instead of waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Observation sink invoked before each retry, for operator visibility.
///
/// Decouples the executor from any specific logging backend.
pub trait RetrySink: Send + Sync {
    /// Called before each retry with the failed attempt number.
    fn on_retry(&self, op: &str, attempt: u32, max_attempts: u32, error: &dyn fmt::Display);
}

/// Default sink: logs each retry at WARN through `tracing`.
#[derive(Debug, Default)]
pub struct TracingRetrySink;

impl RetrySink for TracingRetrySink {
    fn on_retry(&self, op: &str, attempt: u32, max_attempts: u32, error: &dyn fmt::Display) {
        tracing::warn!(
            op = %op,
            attempt,
            max_attempts,
            error = %error,
            "Retrying remote operation"
        );
    }
}

/// Bounded retry wrapper for any fallible remote operation.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn RetrySink>,
}

impl RetryExecutor {
    /// Create an executor with the production sleeper and tracing sink.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            sink: Arc::new(TracingRetrySink),
        }
    }

    /// Create an executor with injected sleeper and sink (tests).
    #[must_use]
    pub fn with_parts(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>, sink: Arc<dyn RetrySink>) -> Self {
        Self {
            policy,
            sleeper,
            sink,
        }
    }

    /// The configured policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `action` until it succeeds, a non-retryable error surfaces, or
    /// the attempt budget is spent.
    ///
    /// The attempt count is exact: a permanently failing retryable action is
    /// invoked exactly `max_attempts` times; a non-retryable error is
    /// invoked once and propagated immediately as [`RetryError::Fatal`].
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Exhausted`] after `max_attempts` retryable
    /// failures, or [`RetryError::Fatal`] on the first non-retryable one.
    pub async fn execute<T, E, F, Fut>(&self, op: &str, mut action: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match action().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() => {
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            op: op.to_string(),
                            attempts: attempt,
                            source: error,
                        });
                    }
                    self.sink.on_retry(op, attempt, max_attempts, &error);
                    self.sleeper.sleep(self.policy.sleep_interval).await;
                }
                Err(error) => return Err(RetryError::Fatal(error)),
            }
        }
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("transient: {0}")]
        Transient(&'static str),
        #[error("fatal: {0}")]
        Fatal(&'static str),
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Transient(_))
        }
    }

    /// Records requested sleep durations instead of waiting.
    #[derive(Debug, Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    #[derive(Debug, Default)]
    struct CountingSink {
        retries: AtomicU32,
    }

    impl RetrySink for CountingSink {
        fn on_retry(&self, _op: &str, _attempt: u32, _max: u32, _error: &dyn fmt::Display) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_executor(max_attempts: u32) -> (RetryExecutor, Arc<RecordingSleeper>, Arc<CountingSink>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let sink = Arc::new(CountingSink::default());
        let executor = RetryExecutor::with_parts(
            RetryPolicy::new(max_attempts, Duration::from_secs(5)),
            Arc::clone(&sleeper) as Arc<dyn Sleeper>,
            Arc::clone(&sink) as Arc<dyn RetrySink>,
        );
        (executor, sleeper, sink)
    }

    #[tokio::test]
    async fn permanent_transient_failure_invoked_exactly_max_attempts_times() {
        let (executor, sleeper, sink) = make_executor(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute("sync_positions", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient("timeout")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        // One sleep between each pair of attempts.
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
        assert_eq!(sink.retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_error_never_retries() {
        let (executor, sleeper, _) = make_executor(5);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute("sync_positions", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal("bad credentials")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let (executor, sleeper, _) = make_executor(3);
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("get_open_orders", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TestError::Transient("rate limited"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let slept = sleeper.slept.lock().unwrap();
        assert_eq!(slept.as_slice(), &[Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn first_attempt_success_sleeps_never() {
        let (executor, sleeper, sink) = make_executor(5);

        let result = executor
            .execute("get_order", || async { Ok::<_, TestError>("filled") })
            .await;

        assert_eq!(result.unwrap(), "filled");
        assert!(sleeper.slept.lock().unwrap().is_empty());
        assert_eq!(sink.retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_attempt_budget_is_clamped_to_one() {
        let (executor, _, _) = make_executor(0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute("cancel_order", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient("reset")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.sleep_interval, Duration::from_secs(5));
    }
}
