//! Timeout and transient-retry wrapper around any [`Oracle`].
//!
//! Every call is bounded by a wall-clock timeout, and a transport-level
//! failure (including the timeout itself) is retried exactly once.
//! Server-reported errors and empty responses pass through untouched.

use std::time::Duration;

use async_trait::async_trait;

use super::{Oracle, OracleError, OracleRequest};

/// Default per-request wall-clock bound.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wraps an inner oracle with a bounded timeout and one automatic retry on
/// transient connectivity loss.
pub struct RetryOracle {
    inner: Box<dyn Oracle>,
    timeout: Duration,
}

impl RetryOracle {
    pub fn new(inner: Box<dyn Oracle>) -> Self {
        Self {
            inner,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(inner: Box<dyn Oracle>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn generate_once(&self, request: &OracleRequest) -> Result<String, OracleError> {
        match tokio::time::timeout(self.timeout, self.inner.generate(request)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(OracleError::Network(format!(
                "request timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl Oracle for RetryOracle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        match self.generate_once(request).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(oracle = self.inner.name(), error = %e, "transient oracle failure, retrying once");
                self.generate_once(request).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Fails `failures` times with the given error, then succeeds.
    struct FlakyOracle {
        failures: AtomicUsize,
        error: OracleError,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Oracle for FlakyOracle {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            Ok("{}".to_string())
        }
    }

    fn flaky(failures: usize, error: OracleError) -> (RetryOracle, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = RetryOracle::new(Box::new(FlakyOracle {
            failures: AtomicUsize::new(failures),
            error,
            calls: calls.clone(),
        }));
        (oracle, calls)
    }

    #[tokio::test]
    async fn retries_once_on_network_error() {
        let (oracle, calls) = flaky(1, OracleError::Network("connection reset".into()));
        let result = oracle.generate(&OracleRequest::json("s", "u")).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_twice() {
        let (oracle, calls) = flaky(2, OracleError::Network("connection reset".into()));
        let result = oracle.generate(&OracleRequest::json("s", "u")).await;
        assert!(matches!(result, Err(OracleError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_server_errors() {
        let (oracle, calls) = flaky(1, OracleError::Server("overloaded".into()));
        let result = oracle.generate(&OracleRequest::json("s", "u")).await;
        assert!(matches!(result, Err(OracleError::Server(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_retries_empty_responses() {
        let (oracle, calls) = flaky(1, OracleError::Empty);
        let result = oracle.generate(&OracleRequest::json("s", "u")).await;
        assert!(matches!(result, Err(OracleError::Empty)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_maps_to_transient_and_retries() {
        struct SlowThenFast {
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Oracle for SlowThenFast {
            fn name(&self) -> &str {
                "slow-then-fast"
            }

            async fn generate(&self, _request: &OracleRequest) -> Result<String, OracleError> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok("late".to_string())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = RetryOracle::with_timeout(
            Box::new(SlowThenFast {
                calls: calls.clone(),
            }),
            Duration::from_millis(50),
        );
        let result = oracle.generate(&OracleRequest::json("s", "u")).await;
        assert_eq!(result.unwrap(), "late");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
