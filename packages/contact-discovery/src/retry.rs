//! Generic exponential-backoff retry executor.
//!
//! Every network-touching stage routes its calls through [`Retryer`].
//! Failure is terminal once the retry condition says no or attempts are
//! exhausted; the caller decides whether to surface or swallow it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::message_is_retryable;
use crate::types::config::RetryOptions;

/// Why a retried operation ultimately failed.
#[derive(Debug, Error)]
pub enum RetryFailure<E> {
    /// Cancellation fired before or during an attempt.
    #[error("operation cancelled")]
    Cancelled,

    /// The last error, after a non-retryable failure or exhausted attempts.
    #[error("{0}")]
    Operation(E),
}

impl<E> RetryFailure<E> {
    /// The underlying operation error, if any.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryFailure::Cancelled => None,
            RetryFailure::Operation(e) => Some(e),
        }
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: std::result::Result<T, RetryFailure<E>>,
    /// Attempts actually made.
    pub attempts: u32,
    /// Wall-clock time across all attempts and sleeps.
    pub total_time: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Whether the operation eventually succeeded.
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Exponential-backoff executor.
pub struct Retryer {
    options: RetryOptions,
    cancel: Option<CancellationToken>,
}

impl Default for Retryer {
    fn default() -> Self {
        Self::new(RetryOptions::default())
    }
}

impl Retryer {
    /// Create an executor with the given options.
    pub fn new(options: RetryOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// Create an executor from a named preset
    /// (`ai_service`, `network`, `database`, `external_api`, `default`).
    pub fn preset(name: &str) -> Self {
        Self::new(RetryOptions::preset(name))
    }

    /// Thread a cancellation token through every suspension point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The options in effect.
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Run `op` with the default retry condition (message classification:
    /// network/timeout/5xx/429/overload retryable, other 4xx not).
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_with(op, |e: &E| message_is_retryable(&e.to_string()))
            .await
    }

    /// Run `op`, consulting `retry_condition` after each failure.
    pub async fn execute_with<T, E, F, Fut, C>(
        &self,
        mut op: F,
        retry_condition: C,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
        C: Fn(&E) -> bool,
    {
        let started = Instant::now();
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            if self.is_cancelled() {
                return RetryOutcome {
                    result: Err(RetryFailure::Cancelled),
                    attempts,
                    total_time: started.elapsed(),
                };
            }

            attempts += 1;
            let result = match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return RetryOutcome {
                                result: Err(RetryFailure::Cancelled),
                                attempts,
                                total_time: started.elapsed(),
                            };
                        }
                        result = op() => result,
                    }
                }
                None => op().await,
            };

            match result {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                        total_time: started.elapsed(),
                    };
                }
                Err(err) => {
                    let retryable = retry_condition(&err);
                    if !retryable || attempts >= max_attempts {
                        tracing::debug!(
                            attempts,
                            retryable,
                            "giving up after error: {}",
                            err
                        );
                        return RetryOutcome {
                            result: Err(RetryFailure::Operation(err)),
                            attempts,
                            total_time: started.elapsed(),
                        };
                    }

                    let delay = self.calculate_delay(attempts);
                    tracing::debug!(
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after error: {}",
                        err
                    );
                    match &self.cancel {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    return RetryOutcome {
                                        result: Err(RetryFailure::Cancelled),
                                        attempts,
                                        total_time: started.elapsed(),
                                    };
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                }
            }
        }
    }

    /// Run a batch of operations in fixed-size concurrent chunks.
    ///
    /// A failing operation does not cancel its siblings; all outcomes are
    /// collected in input order.
    pub async fn execute_batch<T, E, F, Fut>(
        &self,
        ops: Vec<F>,
        concurrency: usize,
    ) -> Vec<RetryOutcome<T, E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let concurrency = concurrency.max(1);
        let mut outcomes = Vec::with_capacity(ops.len());
        let mut ops = ops;

        while !ops.is_empty() {
            let take = concurrency.min(ops.len());
            let chunk: Vec<F> = ops.drain(..take).collect();
            let futures = chunk.into_iter().map(|op| self.execute(op));
            outcomes.extend(join_all(futures).await);
        }

        outcomes
    }

    /// Exponential delay for the next retry after `attempt` failures:
    /// `base * multiplier^(attempt-1)`, capped, optionally jittered ±25%.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = self.options.base_delay.as_secs_f64()
            * self.options.backoff_multiplier.powi(exponent as i32);
        let capped = raw.min(self.options.max_delay.as_secs_f64());

        if !self.options.jitter {
            return Duration::from_secs_f64(capped);
        }

        // Hash-based jitter; no RNG dependency needed.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let mut hasher = DefaultHasher::new();
        attempt.hash(&mut hasher);
        nanos.hash(&mut hasher);
        let fraction = (hasher.finish() % 1000) as f64 / 1000.0; // [0, 1)
        let jittered = capped * (0.75 + fraction * 0.5); // ±25%
        Duration::from_secs_f64(jittered.min(self.options.max_delay.as_secs_f64()))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_options() -> RetryOptions {
        RetryOptions::new()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(1))
            .without_jitter()
    }

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct StrError(String);

    #[tokio::test]
    async fn test_non_retryable_stops_after_one_attempt() {
        let retryer = Retryer::new(fast_options());
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let outcome: RetryOutcome<(), StrError> = retryer
            .execute(move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StrError("HTTP 404 not found".into()))
                }
            })
            .await;

        assert!(!outcome.success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retryable_exhausts_max_attempts() {
        let retryer = Retryer::new(fast_options());
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let outcome: RetryOutcome<(), StrError> = retryer
            .execute(move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StrError("ECONNREFUSED".into()))
                }
            })
            .await;

        assert!(!outcome.success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let retryer = Retryer::new(fast_options());
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let outcome: RetryOutcome<u32, StrError> = retryer
            .execute(move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StrError("connection reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert!(outcome.success());
        assert_eq!(outcome.attempts, 3);
        assert!(matches!(outcome.result, Ok(42)));
    }

    #[tokio::test]
    async fn test_custom_condition_overrides_default() {
        let retryer = Retryer::new(fast_options());

        // "404" is non-retryable by default but this caller insists.
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let outcome: RetryOutcome<(), StrError> = retryer
            .execute_with(
                move || {
                    let calls = calls_clone.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(StrError("404".into()))
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_delay_growth_capped() {
        let options = RetryOptions::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350))
            .without_jitter();
        let retryer = Retryer::new(options);

        assert_eq!(retryer.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(retryer.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(retryer.calculate_delay(3), Duration::from_millis(350));
        assert_eq!(retryer.calculate_delay(4), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let options = RetryOptions::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10));
        let retryer = Retryer::new(options);

        for attempt in 1..=5 {
            let delay = retryer.calculate_delay(attempt);
            let nominal = 100.0 * 2.0f64.powi(attempt as i32 - 1);
            let secs = delay.as_secs_f64() * 1000.0;
            assert!(secs >= nominal * 0.75 - 0.001, "attempt {attempt}: {secs}");
            assert!(secs <= nominal * 1.25 + 0.001, "attempt {attempt}: {secs}");
        }
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let retryer = Retryer::new(fast_options());

        let ops: Vec<_> = (0..5)
            .map(|i| {
                move || async move {
                    if i == 2 {
                        Err(StrError("400 bad request".into()))
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let outcomes = retryer.execute_batch(ops, 2).await;
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes[0].success());
        assert!(!outcomes[2].success());
        assert!(outcomes[4].success());
    }

    #[tokio::test]
    async fn test_cancellation_before_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let retryer = Retryer::new(fast_options()).with_cancellation(token);

        let outcome: RetryOutcome<(), StrError> =
            retryer.execute(|| async { Ok(()) }).await;
        assert!(matches!(outcome.result, Err(RetryFailure::Cancelled)));
        assert_eq!(outcome.attempts, 0);
    }
}
