//! HTTP client, orchestrator and CSV output wired together against a mock
//! Hydrocron server

use crate::support::*;
use hydrocron_downloader::catalog::PassthroughCatalog;
use hydrocron_downloader::downloader::{RetrievalConfig, RetrievalOrchestrator, Selection};
use hydrocron_downloader::fetcher::hydrocron_config::HydrocronConfig;
use hydrocron_downloader::fetcher::hydrocron_http::HydrocronHttpClient;
use hydrocron_downloader::fetcher::FailureKind;
use hydrocron_downloader::output::csv::write_retrieval_result;
use hydrocron_downloader::output::OutputPathBuilder;
use hydrocron_downloader::FeatureType;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIRST_CHUNK_CSV: &str = "reach_id,time_str,reach_q,wse,width\n\
63470800171,2023-01-04T11:02:13Z,0,101.25,88.0\n\
63470800171,2023-01-02T05:40:00Z,1,101.10,-999999999999.0\n";

#[tokio::test]
async fn test_retrieve_and_write_with_failed_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/timeseries"))
        .and(query_param("start_time", "2023-01-11T00:00:00Z"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/timeseries"))
        .and(query_param("start_time", "2023-01-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(FIRST_CHUNK_CSV, None)))
        .expect(1)
        .mount(&server)
        .await;

    let transport =
        HydrocronHttpClient::new(HydrocronConfig::default().with_base_url(server.uri())).unwrap();
    let config = RetrievalConfig::default()
        .with_chunk_max_span_days(10)
        .with_max_attempts(2)
        .with_jitter(false);
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator =
        RetrievalOrchestrator::new(Arc::new(transport), Arc::new(PassthroughCatalog), config)
            .unwrap()
            .with_sleeper(sleeper.clone());

    let selection = Selection::new(
        FeatureType::Reach,
        vec![REACH_A.to_string()],
        vec!["wse".to_string(), "width".to_string()],
        range("2023-01-01", "2023-01-20"),
    )
    .unwrap();

    let result = orchestrator.retrieve(selection).await.unwrap();

    // Two rows, two variables each; ascending by time, wse before width
    let observed: Vec<(String, &str)> = result
        .observations(REACH_A)
        .iter()
        .map(|o| (o.timestamp.to_rfc3339(), o.variable.as_str()))
        .collect();
    assert_eq!(
        observed,
        vec![
            ("2023-01-02T05:40:00+00:00".to_string(), "wse"),
            ("2023-01-02T05:40:00+00:00".to_string(), "width"),
            ("2023-01-04T11:02:13+00:00".to_string(), "wse"),
            ("2023-01-04T11:02:13+00:00".to_string(), "width"),
        ]
    );
    assert!(result.observations(REACH_A)[1].value.is_missing());

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, FailureKind::TransientError);
    assert_eq!(result.errors[0].chunk, range("2023-01-11", "2023-01-20"));
    assert_eq!(sleeper.delays().len(), 1);

    let dir = TempDir::new().unwrap();
    let paths = OutputPathBuilder::new(dir.path().to_path_buf(), REACH_A, FeatureType::Reach);
    let written = write_retrieval_result(&result, &paths).unwrap();

    assert_eq!(written.observations_written, 4);
    let report = std::fs::read_to_string(written.errors_file.unwrap()).unwrap();
    assert!(report.contains(&format!("{REACH_A},2023-01-11,2023-01-20,TransientError,false,")));
}
