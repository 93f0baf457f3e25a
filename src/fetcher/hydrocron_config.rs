//! Hydrocron endpoint configuration
//!
//! Endpoint details that vary between deployments (UAT vs. operational) or
//! that the service does not document firmly (cursor naming) are kept here as
//! configuration rather than spread through the client.

use std::time::Duration;

/// Operational Hydrocron base URL
pub const DEFAULT_BASE_URL: &str = "https://soto.podaac.earthdatacloud.nasa.gov/hydrocron/v1";

/// Time-series endpoint path
pub const TIMESERIES_ENDPOINT: &str = "/timeseries";

/// Per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Hydrocron HTTP transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrocronConfig {
    /// Base URL without trailing slash
    pub base_url: String,

    /// Time-series endpoint path
    pub timeseries_endpoint: String,

    /// Timeout applied to each request (connect + body)
    pub request_timeout: Duration,

    /// Envelope field carrying the continuation cursor
    pub cursor_field: String,

    /// Query parameter used to send the cursor back
    pub cursor_param: String,

    /// User-Agent header value
    pub user_agent: String,
}

impl HydrocronConfig {
    /// Configuration pointing at a different base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL of the time-series endpoint
    pub fn timeseries_url(&self) -> String {
        format!("{}{}", self.base_url, self.timeseries_endpoint)
    }
}

impl Default for HydrocronConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeseries_endpoint: TIMESERIES_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cursor_field: "next".to_string(),
            cursor_param: "cursor".to_string(),
            user_agent: format!("hydrocron-downloader/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
