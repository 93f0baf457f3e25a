//! Bounded retry with exponential backoff
//!
//! [`RetryPolicy::execute`] calls the transport at most `max_attempts` times
//! for one descriptor. Only retryable failures are retried; waits go through
//! a [`Sleeper`] and are abandoned as soon as the cancel signal is raised.

use super::config::{apply_jitter, calculate_backoff, RetrievalConfig, MAX_RETRY_AFTER};
use super::request::QueryDescriptor;
use crate::fetcher::retry_formatter::AttemptReport;
use crate::fetcher::{AttemptOutcome, Failure, Transport};
use crate::metrics;
use crate::shutdown::{self, SharedCancel};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Waits between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend for `duration`
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Final outcome of a retried request
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    /// First success or last failure
    pub outcome: AttemptOutcome,
    /// Transport calls made (zero when cancelled before the first)
    pub attempts: u32,
}

/// Retry policy for one request
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    jitter: bool,
    sleeper: Arc<dyn Sleeper>,
    cancel: Option<SharedCancel>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff_ms", &self.base_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` (at least one) and the given base backoff
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        let base_backoff_ms = u64::try_from(base_backoff.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff_ms,
            max_backoff_ms: base_backoff_ms.max(super::config::MAX_BACKOFF_MS),
            jitter: true,
            sleeper: Arc::new(TokioSleeper),
            cancel: None,
        }
    }

    /// Policy matching a retrieval configuration
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_attempts, config.base_backoff())
            .with_max_backoff(config.effective_max_backoff())
            .with_jitter(config.jitter)
    }

    /// Cap on the exponential delay, never below the base delay
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff_ms = u64::try_from(max_backoff.as_millis())
            .unwrap_or(u64::MAX)
            .max(self.base_backoff_ms);
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Observe a cancel signal
    pub fn with_cancel(mut self, cancel: Option<SharedCancel>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Maximum transport calls per request
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based)
    ///
    /// `min(base * 2^(attempt-1), max_backoff)`, jittered when enabled. A
    /// larger server `Retry-After` wins, capped at two minutes.
    pub fn backoff_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = calculate_backoff(
            self.base_backoff_ms,
            attempt.saturating_sub(1),
            self.max_backoff_ms,
        );
        let delay = if self.jitter {
            apply_jitter(exponential, &mut rand::thread_rng())
        } else {
            exponential
        };

        match retry_after {
            Some(server) => delay.max(server.min(MAX_RETRY_AFTER)),
            None => delay,
        }
    }

    /// Run `descriptor` through `transport` until success, a non-retryable
    /// failure, cancellation or the attempt bound
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        descriptor: &QueryDescriptor,
    ) -> RetryOutcome {
        let mut attempt = 0u32;

        loop {
            if shutdown::is_cancelled(self.cancel.as_ref()) {
                return cancelled(attempt);
            }

            attempt += 1;
            let outcome = match &self.cancel {
                Some(cancel) => {
                    // A completed call wins over a signal raised meanwhile
                    tokio::select! {
                        biased;
                        outcome = transport.execute(descriptor) => outcome,
                        _ = cancel.cancelled() => return cancelled(attempt),
                    }
                }
                None => transport.execute(descriptor).await,
            };

            let failure = match outcome {
                AttemptOutcome::Success(page) => {
                    if attempt > 1 {
                        info!(
                            feature_id = %descriptor.feature_id(),
                            attempt = attempt,
                            "{}",
                            self.report(descriptor, attempt).recovered()
                        );
                    }
                    return RetryOutcome {
                        outcome: AttemptOutcome::Success(page),
                        attempts: attempt,
                    };
                }
                AttemptOutcome::Failure(failure) => failure,
            };

            if !failure.retryable {
                return RetryOutcome {
                    outcome: AttemptOutcome::Failure(failure),
                    attempts: attempt,
                };
            }

            if attempt >= self.max_attempts {
                error!(
                    feature_id = %descriptor.feature_id(),
                    chunk = %descriptor.chunk(),
                    attempts = attempt,
                    "{}",
                    self.report(descriptor, attempt).gave_up(&failure, transport.base_url())
                );
                return RetryOutcome {
                    outcome: AttemptOutcome::Failure(failure),
                    attempts: attempt,
                };
            }

            let backoff = self.backoff_for(attempt, failure.retry_after);
            warn!(
                feature_id = %descriptor.feature_id(),
                chunk = %descriptor.chunk(),
                attempt = attempt,
                max_attempts = self.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %failure,
                "{}",
                self.report(descriptor, attempt).retrying(&failure, backoff)
            );
            metrics::record_retry_backoff(backoff, attempt);

            match &self.cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = self.sleeper.sleep(backoff) => {},
                        _ = cancel.cancelled() => return cancelled(attempt),
                    }
                }
                None => self.sleeper.sleep(backoff).await,
            }
        }
    }

    fn report<'a>(&self, descriptor: &'a QueryDescriptor, attempt: u32) -> AttemptReport<'a> {
        AttemptReport::new(descriptor, attempt, self.max_attempts)
    }
}

fn cancelled(attempts: u32) -> RetryOutcome {
    RetryOutcome {
        outcome: AttemptOutcome::Failure(Failure::cancelled()),
        attempts,
    }
}
