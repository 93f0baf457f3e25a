//! Prometheus exporter wiring
//!
//! The recorder is process-global, so everything that needs the scrape
//! endpoint lives in one test.

use hydrocron_downloader::metrics::{self, RequestMetrics};
use std::net::SocketAddr;
use std::time::Duration;

async fn fetch_metrics_text(addr: SocketAddr) -> Result<String, reqwest::Error> {
    reqwest::get(format!("http://{addr}/metrics"))
        .await?
        .text()
        .await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exporter_serves_recorded_metrics() {
    let addr: SocketAddr = "127.0.0.1:19191".parse().unwrap();

    assert!(metrics::init_metrics(addr).is_ok());
    // Idempotent
    assert!(metrics::init_metrics(addr).is_ok());
    assert!(metrics::is_initialized());

    let request = RequestMetrics::start("63470800171");
    request.record_status(200);
    RequestMetrics::start("63470800171").record_status(503);
    metrics::record_retry_backoff(Duration::from_millis(500), 1);
    metrics::record_chunk_failure("TransientError");
    metrics::record_observations(12);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let text = fetch_metrics_text(addr).await.unwrap();

    assert!(text.contains("hydrocron_requests_total"));
    assert!(text.contains("outcome=\"503\""));
    assert!(text.contains("hydrocron_retries_total"));
    assert!(text.contains("hydrocron_chunk_failures_total"));
    assert!(text.contains("kind=\"TransientError\""));
    assert!(text.contains("hydrocron_observations_total"));
}
