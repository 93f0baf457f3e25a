//! Hydrocron HTTP client
//!
//! Implements [`Transport`] against the Hydrocron `/timeseries` endpoint:
//! - One GET per call, bounded by the request timeout
//! - Shared rate limiter consulted before each send
//! - Status classification (429/5xx/network retryable, other 4xx and
//!   unsendable requests not)
//! - `Retry-After` capture for throttled responses

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::QueryDescriptor;
use crate::fetcher::hydrocron_config::HydrocronConfig;
use crate::fetcher::hydrocron_parser::HydrocronParser;
use crate::fetcher::retry_formatter::RequestProblem;
use crate::fetcher::{AttemptOutcome, Failure, FetcherError, FetcherResult, Transport};
use crate::metrics::RequestMetrics;

/// Longest response body excerpt carried in failure messages
const MAX_BODY_EXCERPT: usize = 512;

/// HTTP transport for the Hydrocron API
#[derive(Debug, Clone)]
pub struct HydrocronHttpClient {
    client: Arc<Client>,
    config: HydrocronConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl HydrocronHttpClient {
    /// Create a client with its own connection pool
    ///
    /// # Errors
    /// Returns `FetcherError::ClientBuild` if the TLS backend cannot be
    /// initialised, `FetcherError::InvalidConfig` for an empty base URL.
    pub fn new(config: HydrocronConfig) -> FetcherResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(FetcherError::InvalidConfig("base URL cannot be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetcherError::ClientBuild(e.to_string()))?;

        Ok(Self::with_client(Arc::new(client), config))
    }

    /// Client against the operational Hydrocron deployment
    pub fn with_defaults() -> FetcherResult<Self> {
        Self::new(HydrocronConfig::default())
    }

    /// Reuse an existing connection pool
    pub fn with_client(client: Arc<Client>, config: HydrocronConfig) -> Self {
        Self {
            client,
            config,
            rate_limiter: None,
        }
    }

    /// Throttle every request through `rate_limiter`
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Endpoint configuration
    pub fn config(&self) -> &HydrocronConfig {
        &self.config
    }

    /// Parse a `Retry-After` header given in seconds
    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Human-readable detail from an error body
    ///
    /// Hydrocron answers errors with `{"error": "..."}`; other bodies are
    /// truncated as-is.
    fn error_detail(body: &str) -> String {
        let from_json = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));

        let detail = from_json.unwrap_or_else(|| body.trim().to_string());
        if detail.len() <= MAX_BODY_EXCERPT {
            return detail;
        }
        let mut end = MAX_BODY_EXCERPT;
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &detail[..end])
    }

    async fn send(&self, descriptor: &QueryDescriptor) -> AttemptOutcome {
        if let Some(limiter) = &self.rate_limiter {
            if let Err(e) = limiter.acquire().await {
                return AttemptOutcome::Failure(Failure::transient(format!(
                    "rate limiter error: {e}"
                )));
            }
        }

        let url = self.config.timeseries_url();
        let params = descriptor.query_params(&self.config.cursor_param);
        let metrics = RequestMetrics::start(descriptor.feature_id().as_str());

        debug!(
            correlation_id = metrics.correlation_id(),
            url = %url,
            chunk = %descriptor.chunk(),
            cursor = ?descriptor.cursor(),
            "Sending Hydrocron request"
        );

        let response = match self
            .client
            .get(&url)
            .query(&params)
            .timeout(self.config.request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                metrics.record_network_error();
                let problem = RequestProblem::from_error(&e);
                warn!(
                    correlation_id = metrics.correlation_id(),
                    feature_id = %descriptor.feature_id(),
                    error = %e,
                    retryable = problem.kind().is_retryable(),
                    "Hydrocron request failed: {}",
                    problem.label()
                );
                return AttemptOutcome::Failure(Failure::new(
                    problem.kind(),
                    format!("{}: {e}", problem.label()),
                ));
            }
        };

        let status = response.status();
        metrics.record_status(status.as_u16());

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let retry_after = Self::parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let problem = RequestProblem::from_status(status);
            return AttemptOutcome::Failure(
                Failure::transient(format!("{}: {}", problem.label(), Self::error_detail(&body)))
                    .with_status(status.as_u16())
                    .with_retry_after(retry_after),
            );
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let problem = RequestProblem::from_status(status);
            return AttemptOutcome::Failure(Failure::client_error(
                status.as_u16(),
                format!("{}: {}", problem.label(), Self::error_detail(&body)),
            ));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::Failure(
                    Failure::transient(format!("failed to read response body: {e}"))
                        .with_status(status.as_u16()),
                );
            }
        };

        match HydrocronParser::parse_response(&body, descriptor, &self.config.cursor_field) {
            Ok(page) => {
                debug!(
                    correlation_id = metrics.correlation_id(),
                    rows = page.rows.len(),
                    has_next = page.next_cursor.is_some(),
                    "Hydrocron response parsed"
                );
                AttemptOutcome::Success(page)
            }
            Err(e) => AttemptOutcome::Failure(
                Failure::parse(match e {
                    FetcherError::ParseError(message) => message,
                    other => other.to_string(),
                })
                .with_status(status.as_u16()),
            ),
        }
    }
}

#[async_trait::async_trait]
impl Transport for HydrocronHttpClient {
    async fn execute(&self, descriptor: &QueryDescriptor) -> AttemptOutcome {
        self.send(descriptor).await
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }
}
