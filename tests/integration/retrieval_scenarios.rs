//! End-to-end retrieval behaviour against a scripted transport
//!
//! The selection spans 2023-01-01..2023-01-20 with 10-day chunks, so every
//! feature is fetched in exactly two requests unless pagination kicks in.

use crate::support::*;
use hydrocron_downloader::catalog::{PassthroughCatalog, StaticCatalog};
use hydrocron_downloader::downloader::{
    RetrievalConfig, RetrievalError, RetrievalOrchestrator, Selection,
};
use hydrocron_downloader::fetcher::FailureKind;
use hydrocron_downloader::shutdown::CancelSignal;
use hydrocron_downloader::{FeatureId, FeatureType, ObservationValue};
use std::sync::Arc;
use std::time::Duration;

fn first_chunk() -> hydrocron_downloader::downloader::DateRange {
    range("2023-01-01", "2023-01-10")
}

fn second_chunk() -> hydrocron_downloader::downloader::DateRange {
    range("2023-01-11", "2023-01-20")
}

fn config() -> RetrievalConfig {
    RetrievalConfig::default()
        .with_chunk_max_span_days(10)
        .with_max_concurrency(1)
        .with_jitter(false)
}

fn selection(ids: &[&str]) -> Selection {
    Selection::new(
        FeatureType::Reach,
        ids.iter().map(|s| s.to_string()).collect(),
        vec!["wse".to_string()],
        range("2023-01-01", "2023-01-20"),
    )
    .unwrap()
}

/// One wse row per chunk, on the chunk's third day
fn rows_for(call: &Call) -> Vec<hydrocron_downloader::Observation> {
    let day = call.chunk.start().succ_opt().unwrap().succ_opt().unwrap();
    vec![observation(
        &call.feature_id,
        "wse",
        &format!("{day}T12:00:00Z"),
        100.0,
    )]
}

fn orchestrator(
    transport: Arc<ScriptedTransport>,
    config: RetrievalConfig,
) -> (RetrievalOrchestrator, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = RetrievalOrchestrator::new(transport, Arc::new(PassthroughCatalog), config)
        .unwrap()
        .with_sleeper(sleeper.clone());
    (orchestrator, sleeper)
}

#[tokio::test]
async fn test_two_chunk_success() {
    let transport = Arc::new(ScriptedTransport::new(|call| success(rows_for(call))));
    let (orchestrator, sleeper) = orchestrator(transport.clone(), config());

    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();

    assert!(result.is_complete());
    assert!(!result.cancelled);
    let timestamps: Vec<_> = result
        .observations(REACH_A)
        .iter()
        .map(|o| o.timestamp)
        .collect();
    assert_eq!(
        timestamps,
        vec![at("2023-01-03T12:00:00Z"), at("2023-01-13T12:00:00Z")]
    );
    assert_eq!(transport.calls().len(), 2);
    assert_eq!(result.stats.requests, 2);
    assert_eq!(result.stats.retries, 0);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_second_chunk_server_errors_keep_first_chunk() {
    let transport = Arc::new(ScriptedTransport::new(|call| {
        if call.chunk == second_chunk() {
            server_error()
        } else {
            success(rows_for(call))
        }
    }));
    let (orchestrator, sleeper) = orchestrator(transport.clone(), config().with_max_attempts(3));

    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();

    assert_eq!(result.observations(REACH_A).len(), 1);
    assert_eq!(result.observations(REACH_A)[0].timestamp, at("2023-01-03T12:00:00Z"));

    assert_eq!(result.errors.len(), 1);
    let entry = &result.errors[0];
    assert_eq!(entry.feature_id, REACH_A);
    assert_eq!(entry.chunk, second_chunk());
    assert_eq!(entry.kind, FailureKind::TransientError);
    assert!(!entry.partial);

    assert_eq!(transport.calls_for(REACH_A, second_chunk()), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
    assert_eq!(result.stats.retries, 2);
}

#[tokio::test]
async fn test_cancellation_between_chunks() {
    let cancel = CancelSignal::shared();
    let transport = Arc::new(ScriptedTransport::new({
        let cancel = cancel.clone();
        move |call| {
            // Raised while the first chunk is in flight
            cancel.cancel();
            success(rows_for(call))
        }
    }));
    let (orchestrator, _) = orchestrator(transport.clone(), config());
    let orchestrator = orchestrator.with_cancel(cancel);

    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();

    assert!(result.cancelled);
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(result.observations(REACH_A).len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].chunk, second_chunk());
    assert_eq!(result.errors[0].kind, FailureKind::Cancelled);
}

#[tokio::test]
async fn test_cancel_before_start_makes_no_calls() {
    let cancel = CancelSignal::shared();
    cancel.cancel();
    let transport = Arc::new(ScriptedTransport::new(|call| success(rows_for(call))));
    let (orchestrator, _) = orchestrator(transport.clone(), config().with_max_concurrency(4));
    let orchestrator = orchestrator.with_cancel(cancel);

    let result = orchestrator
        .retrieve(selection(&[REACH_A, REACH_B]))
        .await
        .unwrap();

    assert!(transport.calls().is_empty());
    assert!(result.cancelled);
    assert_eq!(result.errors.len(), 4);
    assert!(result.errors.iter().all(|e| e.kind == FailureKind::Cancelled));
}

#[tokio::test]
async fn test_client_error_is_not_retried_and_other_features_survive() {
    let transport = Arc::new(ScriptedTransport::new(|call| {
        if call.feature_id == REACH_B {
            not_found()
        } else {
            success(rows_for(call))
        }
    }));
    let (orchestrator, sleeper) = orchestrator(transport.clone(), config().with_max_concurrency(4));

    let result = orchestrator
        .retrieve(selection(&[REACH_A, REACH_B]))
        .await
        .unwrap();

    assert_eq!(result.observations(REACH_A).len(), 2);
    assert!(result.observations(REACH_B).is_empty());
    assert_eq!(result.errors.len(), 2);
    assert!(result
        .errors
        .iter()
        .all(|e| e.feature_id == REACH_B && e.kind == FailureKind::ClientError));
    assert_eq!(transport.calls_for(REACH_B, first_chunk()), 1);
    assert_eq!(transport.calls_for(REACH_B, second_chunk()), 1);
    assert!(sleeper.delays().is_empty());

    // Dataset follows selection order regardless of completion order
    let ids: Vec<_> = result.dataset.iter().map(|d| d.feature_id.as_str()).collect();
    assert_eq!(ids, vec![REACH_A, REACH_B]);
}

#[tokio::test]
async fn test_strict_mode_fails_when_nothing_retrieved() {
    let transport = Arc::new(ScriptedTransport::new(|_| not_found()));
    let (orchestrator, _) = orchestrator(transport, config().with_strict_mode(true));

    match orchestrator.retrieve(selection(&[REACH_A])).await {
        Err(RetrievalError::NoDataRetrieved { errors }) => assert_eq!(errors.len(), 2),
        other => panic!("expected NoDataRetrieved, got {other:?}"),
    }
}

#[tokio::test]
async fn test_strict_mode_accepts_partial_data() {
    let transport = Arc::new(ScriptedTransport::new(|call| {
        if call.chunk == first_chunk() {
            success(rows_for(call))
        } else {
            not_found()
        }
    }));
    let (orchestrator, _) = orchestrator(transport, config().with_strict_mode(true));

    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.total_observations(), 1);
}

#[tokio::test]
async fn test_follows_pages_within_a_chunk() {
    let transport = Arc::new(ScriptedTransport::new(|call| {
        match (call.chunk == first_chunk(), call.cursor.as_deref()) {
            (true, None) => page(
                vec![observation(&call.feature_id, "wse", "2023-01-02T08:00:00Z", 1.0)],
                Some("page-2"),
            ),
            (true, Some("page-2")) => success(vec![observation(
                &call.feature_id,
                "wse",
                "2023-01-05T08:00:00Z",
                2.0,
            )]),
            _ => success(Vec::new()),
        }
    }));
    let (orchestrator, _) = orchestrator(transport.clone(), config());

    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();

    assert!(result.is_complete());
    assert_eq!(result.observations(REACH_A).len(), 2);
    assert_eq!(result.stats.pages, 3);
    assert_eq!(transport.calls().len(), 3);
}

#[tokio::test]
async fn test_failed_later_page_is_partial() {
    let transport = Arc::new(ScriptedTransport::new(|call| match call.cursor.as_deref() {
        None if call.chunk == first_chunk() => page(
            vec![observation(&call.feature_id, "wse", "2023-01-02T08:00:00Z", 1.0)],
            Some("page-2"),
        ),
        Some(_) => not_found(),
        None => success(Vec::new()),
    }));
    let (orchestrator, _) = orchestrator(transport, config());

    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();

    assert_eq!(result.observations(REACH_A).len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].partial);
    assert_eq!(result.errors[0].chunk, first_chunk());
    assert!(result.errors[0].message.contains("page 2"));
}

#[tokio::test]
async fn test_duplicate_rows_across_chunks_are_dropped() {
    // Both chunks echo the same boundary observation
    let transport = Arc::new(ScriptedTransport::new(|call| {
        success(vec![observation(
            &call.feature_id,
            "wse",
            "2023-01-10T23:00:00Z",
            5.0,
        )])
    }));
    let (orchestrator, _) = orchestrator(transport, config());

    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();
    assert_eq!(result.observations(REACH_A).len(), 1);
}

#[tokio::test]
async fn test_retrieval_is_idempotent() {
    let transport = Arc::new(ScriptedTransport::new(|call| {
        if call.feature_id == REACH_B && call.chunk == second_chunk() {
            not_found()
        } else {
            success(rows_for(call))
        }
    }));
    let (orchestrator, _) = orchestrator(transport, config().with_max_concurrency(3));

    let first = orchestrator
        .retrieve(selection(&[REACH_A, REACH_B]))
        .await
        .unwrap();
    let second = orchestrator
        .retrieve(selection(&[REACH_A, REACH_B]))
        .await
        .unwrap();

    assert_eq!(first.dataset, second.dataset);
    assert_eq!(first.errors, second.errors);
}

#[tokio::test]
async fn test_unresolved_features_are_reported_not_fetched() {
    let transport = Arc::new(ScriptedTransport::new(|call| success(rows_for(call))));
    let catalog = StaticCatalog::from_ids(
        FeatureType::Reach,
        vec![FeatureId::parse(REACH_A).unwrap()],
    );
    let orchestrator = RetrievalOrchestrator::new(transport.clone(), Arc::new(catalog), config())
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::default()));

    let result = orchestrator
        .retrieve(selection(&[REACH_A, REACH_B]))
        .await
        .unwrap();

    assert!(transport.calls().iter().all(|c| c.feature_id == REACH_A));
    assert_eq!(result.dataset.len(), 2);
    assert!(result.observations(REACH_B).is_empty());
    let errors: Vec<_> = result.errors_for(REACH_B).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, FailureKind::InvalidSelection);
    assert_eq!(errors[0].chunk, range("2023-01-01", "2023-01-20"));
}

#[tokio::test(start_paused = true)]
async fn test_result_order_ignores_completion_order() {
    // Both chunks report 2023-01-10T12:00 with different values; the first
    // chunk answers last but its row must win
    let transport = Arc::new(
        ScriptedTransport::new(|call| {
            let id = call.feature_id.as_str();
            if call.chunk == first_chunk() {
                success(vec![
                    observation(id, "wse", "2023-01-10T12:00:00Z", 1.0),
                    observation(id, "wse", "2023-01-03T12:00:00Z", 10.0),
                ])
            } else {
                success(vec![
                    observation(id, "wse", "2023-01-15T12:00:00Z", 3.0),
                    observation(id, "wse", "2023-01-10T12:00:00Z", 2.0),
                ])
            }
        })
        .with_latency(|call| match (call.feature_id.as_str(), call.chunk == first_chunk()) {
            (REACH_A, true) => Duration::from_millis(300),
            (_, true) => Duration::from_millis(200),
            _ => Duration::from_millis(10),
        }),
    );
    let (orchestrator, _) = orchestrator(transport.clone(), config().with_max_concurrency(4));

    let result = orchestrator
        .retrieve(selection(&[REACH_A, REACH_B]))
        .await
        .unwrap();

    // Second chunks finished first, REACH_A's first chunk last
    let completed = transport.completed();
    assert_eq!(completed.len(), 4);
    assert_eq!(completed[0].chunk, second_chunk());
    assert_eq!(completed[3].feature_id, REACH_A);
    assert_eq!(completed[3].chunk, first_chunk());

    let ids: Vec<&str> = result.dataset.iter().map(|d| d.feature_id.as_str()).collect();
    assert_eq!(ids, vec![REACH_A, REACH_B]);

    for id in [REACH_A, REACH_B] {
        let series: Vec<_> = result
            .observations(id)
            .iter()
            .map(|o| (o.timestamp, o.value.clone()))
            .collect();
        assert_eq!(
            series,
            vec![
                (at("2023-01-03T12:00:00Z"), ObservationValue::Number(10.0)),
                (at("2023-01-10T12:00:00Z"), ObservationValue::Number(1.0)),
                (at("2023-01-15T12:00:00Z"), ObservationValue::Number(3.0)),
            ]
        );
    }
    assert!(result.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_call_in_flight() {
    let cancel = CancelSignal::shared();
    let transport = Arc::new(
        ScriptedTransport::new(|call| success(rows_for(call))).with_latency(|call| {
            if call.chunk == second_chunk() {
                Duration::from_secs(600)
            } else {
                Duration::ZERO
            }
        }),
    );
    let (orchestrator, _) = orchestrator(transport.clone(), config());
    let orchestrator = orchestrator.with_cancel(cancel.clone());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        }
    });

    let started = tokio::time::Instant::now();
    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.cancelled);
    assert_eq!(transport.calls_for(REACH_A, second_chunk()), 1);
    assert!(transport
        .completed()
        .iter()
        .all(|call| call.chunk == first_chunk()));
    assert_eq!(result.observations(REACH_A).len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].chunk, second_chunk());
    assert_eq!(result.errors[0].kind, FailureKind::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff_wait() {
    let cancel = CancelSignal::shared();
    let transport = Arc::new(ScriptedTransport::new(|call| {
        if call.chunk == second_chunk() {
            server_error()
        } else {
            success(rows_for(call))
        }
    }));
    // Real sleeper: the backoff wait itself must be abandoned
    let orchestrator = RetrievalOrchestrator::new(
        transport.clone(),
        Arc::new(PassthroughCatalog),
        config()
            .with_max_attempts(5)
            .with_base_backoff(Duration::from_secs(300)),
    )
    .unwrap()
    .with_cancel(cancel.clone());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        }
    });

    let started = tokio::time::Instant::now();
    let result = orchestrator.retrieve(selection(&[REACH_A])).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.cancelled);
    assert_eq!(transport.calls_for(REACH_A, second_chunk()), 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, FailureKind::Cancelled);
    assert_eq!(result.observations(REACH_A).len(), 1);
}
