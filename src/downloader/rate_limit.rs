//! Request throttling shared by all concurrent requests
//!
//! Implements a request-per-window limiter: each request holds one permit for
//! the length of the window, so at most `max_requests` requests start in any
//! window.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Request-based rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: usize,
    semaphore: Arc<Semaphore>,
    window: Duration,
}

impl RateLimiter {
    /// Create a request-based rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests per window
    /// * `window` - Time window for rate limit
    pub fn request_based(max_requests: usize, window: Duration) -> Result<Self, RateLimitError> {
        if max_requests == 0 {
            return Err(RateLimitError::InvalidLimit(
                "max_requests must be at least 1".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(RateLimitError::InvalidLimit(
                "window must be longer than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            semaphore: Arc::new(Semaphore::new(max_requests)),
            window,
        })
    }

    /// Limiter derived from a requests-per-second rate
    ///
    /// Fractional rates below one stretch the window instead
    /// (0.5/s is one request per two seconds).
    pub fn per_second(rate: f64) -> Result<Self, RateLimitError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateLimitError::InvalidLimit(format!(
                "requests per second must be positive, got {rate}"
            )));
        }
        if rate >= 1.0 {
            Self::request_based(rate.floor() as usize, Duration::from_secs(1))
        } else {
            Self::request_based(1, Duration::from_secs_f64(1.0 / rate))
        }
    }

    /// Maximum requests per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Permits currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit
    ///
    /// The permit is held for the window duration on a background task, then
    /// released automatically.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        Ok(())
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire permits
    #[error("failed to acquire rate limit permits: {0}")]
    AcquireError(String),

    /// Limit parameters rejected
    #[error("invalid rate limit: {0}")]
    InvalidLimit(String),
}
