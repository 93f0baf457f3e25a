//! Prometheus metrics for Hydrocron retrievals
//!
//! Metrics are recorded unconditionally through the `metrics` facade; they are
//! only exported when [`init_metrics`] installs the Prometheus listener. Without
//! an installed recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(format!("Failed to install Prometheus exporter: {e}"));
    }

    describe_counter!(
        "hydrocron_requests_total",
        Unit::Count,
        "Total number of HTTP requests sent to Hydrocron, by outcome"
    );

    describe_histogram!(
        "hydrocron_request_duration_seconds",
        Unit::Seconds,
        "Hydrocron request duration in seconds"
    );

    describe_counter!(
        "hydrocron_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );

    describe_histogram!(
        "hydrocron_retry_backoff_seconds",
        Unit::Seconds,
        "Backoff applied before a retry"
    );

    describe_counter!(
        "hydrocron_chunk_failures_total",
        Unit::Count,
        "Chunks that could not be fully retrieved, by failure kind"
    );

    describe_counter!(
        "hydrocron_observations_total",
        Unit::Count,
        "Observations assembled into retrieval results"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Whether [`init_metrics`] has installed the exporter
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP request
pub struct RequestMetrics {
    feature_id: String,
    start_time: Instant,
    correlation_id: String,
}

impl RequestMetrics {
    /// Start recording a request for a feature
    pub fn start(feature_id: impl Into<String>) -> Self {
        let feature_id = feature_id.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            feature_id = %feature_id,
            "Starting Hydrocron request"
        );

        Self {
            feature_id,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record a response with an HTTP status
    pub fn record_status(&self, status_code: u16) {
        self.record(status_code.to_string());
    }

    /// Record a transport-level error (no status code)
    pub fn record_network_error(&self) {
        self.record("network_error".to_string());
    }

    fn record(&self, outcome: String) {
        let duration = self.start_time.elapsed();

        counter!("hydrocron_requests_total", "outcome" => outcome.clone()).increment(1);
        histogram!("hydrocron_request_duration_seconds").record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            feature_id = %self.feature_id,
            outcome = %outcome,
            duration_ms = duration.as_millis() as u64,
            "Hydrocron request completed"
        );
    }

    /// Correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry and the backoff applied before it
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("hydrocron_retries_total").increment(1);
    histogram!("hydrocron_retry_backoff_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record a chunk that ended with an error entry
pub fn record_chunk_failure(kind: &str) {
    counter!("hydrocron_chunk_failures_total", "kind" => kind.to_string()).increment(1);
}

/// Record observations added to a result
pub fn record_observations(count: u64) {
    counter!("hydrocron_observations_total").increment(count);
}
