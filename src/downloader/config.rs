//! Retrieval configuration constants and backoff calculation

use super::RetrievalError;
use rand::Rng;
use std::time::Duration;

/// Default attempts per request (first try included).
/// Three attempts ride out a brief Hydrocron or network hiccup without
/// stretching a failing chunk past a few seconds.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound the CLI accepts for `--max-attempts`
pub const MAX_ATTEMPTS: u32 = 20;

/// Base backoff delay in milliseconds (delay before the second attempt).
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 500;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000; // 30 seconds

/// Longest server-requested `Retry-After` that is honoured.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// Default number of (feature, chunk) units in flight.
/// Hydrocron is a shared public service; a handful of concurrent requests
/// keeps throughput reasonable without tripping its throttling.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Upper bound the CLI accepts for `--concurrency`
pub const MAX_CONCURRENCY: usize = 32;

/// Default maximum chunk span in days.
pub const DEFAULT_CHUNK_MAX_SPAN_DAYS: u32 = 365;

/// Default maximum pages followed per chunk.
pub const DEFAULT_MAX_PAGES: usize = 1_000;

/// Tunables for one retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Attempts per request, first try included (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds
    pub base_backoff_ms: u64,
    /// Cap on the exponential delay in milliseconds; a base above the cap
    /// raises it
    pub max_backoff_ms: u64,
    /// (feature, chunk) units in flight
    pub max_concurrency: usize,
    /// Fail the whole call when no feature returned data
    pub strict_mode: bool,
    /// Maximum chunk span in days (>= 1)
    pub chunk_max_span_days: u32,
    /// Maximum pages followed per chunk (>= 1)
    pub max_pages: usize,
    /// Randomise backoff delays
    pub jitter: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            strict_mode: false,
            chunk_max_span_days: DEFAULT_CHUNK_MAX_SPAN_DAYS,
            max_pages: DEFAULT_MAX_PAGES,
            jitter: true,
        }
    }
}

impl RetrievalConfig {
    /// Set attempts per request
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base backoff
    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff_ms = u64::try_from(base_backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the backoff cap
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff_ms = u64::try_from(max_backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the concurrency bound
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Enable or disable strict mode
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Set the maximum chunk span
    pub fn with_chunk_max_span_days(mut self, days: u32) -> Self {
        self.chunk_max_span_days = days;
        self
    }

    /// Set the page bound per chunk
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Base backoff as a [`Duration`]
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    /// Backoff cap actually applied: never below the base delay
    pub fn effective_max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.base_backoff_ms))
    }

    /// Reject values outside their accepted ranges
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.max_attempts == 0 {
            return Err(RetrievalError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(RetrievalError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.chunk_max_span_days == 0 {
            return Err(RetrievalError::InvalidConfig(
                "chunk_max_span_days must be at least 1".to_string(),
            ));
        }
        if self.max_pages == 0 {
            return Err(RetrievalError::InvalidConfig(
                "max_pages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Calculate exponential backoff delay
///
/// `retry_count` is zero for the delay before the second attempt.
pub fn calculate_backoff(base_ms: u64, retry_count: u32, max_ms: u64) -> Duration {
    let factor = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(max_ms);
    Duration::from_millis(delay_ms)
}

/// Equal jitter: half the delay is kept, the other half is drawn uniformly
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if millis < 2 {
        return delay;
    }
    let half = millis / 2;
    Duration::from_millis(half + rng.gen_range(0..=millis - half))
}
