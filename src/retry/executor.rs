//! Retry executor: runs an upstream operation under a `BackoffPolicy`

use std::future::Future;

use tracing::{error, warn};

use super::BackoffPolicy;
use crate::error::UpstreamError;

/// Bookkeeping for one `run` call
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    last_error: Option<UpstreamError>,
}

/// Invokes an operation up to `max_retries + 1` times
///
/// Between retryable failures the executor sleeps on the tokio timer, so other
/// tasks keep running. A non-retryable failure is returned immediately, and
/// once attempts are exhausted the last failure is returned; the executor
/// never turns a failure into a success.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    policy: BackoffPolicy,
    max_retries: u32,
}

impl RetryExecutor {
    pub fn new(policy: BackoffPolicy, max_retries: u32) -> Self {
        Self {
            policy,
            max_retries,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `operation`, retrying according to the policy
    ///
    /// # Arguments
    /// * `label` - Name of the operation, used in log lines
    /// * `operation` - Produces a fresh future for every attempt
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let total = self.max_attempts();
        let mut state = RetryState {
            attempt: 0,
            last_error: None,
        };

        while state.attempt < total {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.policy.should_retry(&err) {
                warn!(operation = label, error = %err, "non-retryable upstream failure");
                return Err(err);
            }

            if state.attempt + 1 < total {
                let delay = self.policy.delay_for(&err, state.attempt);
                warn!(
                    operation = label,
                    attempt = state.attempt + 1,
                    total,
                    error = %err,
                    rate_limited = err.is_rate_limited(),
                    backoff_ms = delay.as_millis() as u64,
                    "upstream call failed, backing off"
                );
                tokio::time::sleep(delay).await;
            } else {
                error!(operation = label, total, error = %err, "all attempts failed");
            }

            state.last_error = Some(err);
            state.attempt += 1;
        }

        Err(state
            .last_error
            .unwrap_or_else(|| UpstreamError::Unclassified(format!("{label}: no attempt made"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    fn executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(
            BackoffPolicy::new(Duration::from_millis(500), Duration::from_secs(15)),
            max_retries,
        )
    }

    /// Runs the executor against a scripted sequence of results and returns
    /// the final result plus the instant of every attempt
    async fn run_script(
        executor: RetryExecutor,
        script: Vec<Result<u32, UpstreamError>>,
    ) -> (Result<u32, UpstreamError>, Vec<Instant>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(script.into_iter()));

        let result = executor
            .run("scripted", || {
                let calls = Arc::clone(&calls);
                let script = Arc::clone(&script);
                async move {
                    calls.lock().unwrap().push(Instant::now());
                    script
                        .lock()
                        .unwrap()
                        .next()
                        .unwrap_or_else(|| Err(UpstreamError::Transient("script exhausted".into())))
                }
            })
            .await;

        let calls = calls.lock().unwrap().clone();
        (result, calls)
    }

    fn gaps(instants: &[Instant]) -> Vec<Duration> {
        instants.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let (result, calls) = run_script(executor(3), vec![Ok(7)]).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_makes_exactly_one_attempt() {
        let (result, calls) = run_script(
            executor(3),
            vec![Err(UpstreamError::Client {
                status: 401,
                message: "bad key".into(),
            })],
        )
        .await;

        assert!(matches!(result, Err(UpstreamError::Client { status: 401, .. })));
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let (result, calls) = run_script(
            executor(3),
            vec![
                Err(UpstreamError::Transient("timeout".into())),
                Err(UpstreamError::Transient("503".into())),
                Ok(42),
            ],
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            gaps(&calls),
            vec![Duration::from_millis(500), Duration::from_secs(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_delays_grow_linearly_and_last_error_is_returned() {
        let script = (0..4)
            .map(|i| Err(UpstreamError::RateLimited(format!("429 #{i}"))))
            .collect();

        let (result, calls) = run_script(executor(3), script).await;

        assert_eq!(calls.len(), 4, "max_retries + 1 attempts");
        assert_eq!(
            gaps(&calls),
            vec![
                Duration::from_secs(15),
                Duration::from_secs(30),
                Duration::from_secs(45),
            ]
        );
        match result {
            Err(UpstreamError::RateLimited(msg)) => assert_eq!(msg, "429 #3"),
            other => panic!("expected last rate-limit error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let (result, calls) = run_script(
            executor(0),
            vec![Err(UpstreamError::Transient("down".into()))],
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_after_retry_stops_immediately() {
        let (result, calls) = run_script(
            executor(5),
            vec![
                Err(UpstreamError::Unclassified("weird".into())),
                Err(UpstreamError::Client {
                    status: 404,
                    message: "gone".into(),
                }),
                Ok(1),
            ],
        )
        .await;

        assert!(matches!(result, Err(UpstreamError::Client { status: 404, .. })));
        assert_eq!(calls.len(), 2);
    }
}
