//! Unit tests for RetryPolicy against a scripted transport

use crate::support::*;
use hydrocron_downloader::downloader::{QueryDescriptor, RequestBuilder, RetryPolicy};
use hydrocron_downloader::fetcher::{AttemptOutcome, Failure, FailureKind};
use hydrocron_downloader::shutdown::CancelSignal;
use hydrocron_downloader::FeatureType;
use std::sync::Arc;
use std::time::Duration;

fn descriptor() -> QueryDescriptor {
    RequestBuilder::build(
        REACH_A,
        FeatureType::Reach,
        vec!["wse".to_string()].into(),
        range("2023-01-01", "2023-01-31"),
        None,
    )
    .unwrap()
}

fn policy(max_attempts: u32, sleeper: Arc<RecordingSleeper>) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(100))
        .with_jitter(false)
        .with_sleeper(sleeper)
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let transport = ScriptedTransport::new(|call| {
        if call.attempt < 3 {
            server_error()
        } else {
            success(Vec::new())
        }
    });
    let sleeper = Arc::new(RecordingSleeper::default());

    let outcome = policy(5, sleeper.clone())
        .execute(&transport, &descriptor())
        .await;

    assert!(outcome.outcome.is_success());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn test_attempts_never_exceed_bound() {
    for max_attempts in [1, 2, 4] {
        let transport = ScriptedTransport::new(|_| server_error());
        let sleeper = Arc::new(RecordingSleeper::default());

        let outcome = policy(max_attempts, sleeper.clone())
            .execute(&transport, &descriptor())
            .await;

        assert_eq!(outcome.attempts, max_attempts);
        assert_eq!(transport.calls().len(), max_attempts as usize);
        assert_eq!(sleeper.delays().len(), max_attempts as usize - 1);
        assert_eq!(
            outcome.outcome.failure().map(|f| f.kind),
            Some(FailureKind::TransientError)
        );
    }
}

#[tokio::test]
async fn test_non_retryable_failure_short_circuits() {
    for failure in [
        Failure::client_error(400, "bad feature id"),
        Failure::parse("results.csv missing"),
    ] {
        let expected = failure.kind;
        let transport = ScriptedTransport::new(move |_| AttemptOutcome::Failure(failure.clone()));
        let sleeper = Arc::new(RecordingSleeper::default());

        let outcome = policy(5, sleeper.clone())
            .execute(&transport, &descriptor())
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.outcome.failure().map(|f| f.kind), Some(expected));
        assert!(sleeper.delays().is_empty());
    }
}

#[tokio::test]
async fn test_retry_after_extends_backoff() {
    let transport = ScriptedTransport::new(|call| {
        if call.attempt == 1 {
            AttemptOutcome::Failure(
                Failure::transient("HTTP 429: rate limited")
                    .with_status(429)
                    .with_retry_after(Some(Duration::from_secs(4))),
            )
        } else {
            success(Vec::new())
        }
    });
    let sleeper = Arc::new(RecordingSleeper::default());

    let outcome = policy(3, sleeper.clone())
        .execute(&transport, &descriptor())
        .await;

    assert!(outcome.outcome.is_success());
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(4)]);
}

#[tokio::test]
async fn test_cancelled_before_first_attempt() {
    let cancel = CancelSignal::shared();
    cancel.cancel();
    let transport = ScriptedTransport::new(|_| success(Vec::new()));

    let outcome = policy(3, Arc::new(RecordingSleeper::default()))
        .with_cancel(Some(cancel))
        .execute(&transport, &descriptor())
        .await;

    assert_eq!(outcome.attempts, 0);
    assert!(transport.calls().is_empty());
    assert_eq!(
        outcome.outcome.failure().map(|f| f.kind),
        Some(FailureKind::Cancelled)
    );
}

#[tokio::test]
async fn test_no_retry_after_cancellation() {
    let cancel = CancelSignal::shared();
    let transport = ScriptedTransport::new({
        let cancel = cancel.clone();
        move |_| {
            cancel.cancel();
            server_error()
        }
    });

    let outcome = policy(5, Arc::new(RecordingSleeper::default()))
        .with_cancel(Some(cancel))
        .execute(&transport, &descriptor())
        .await;

    assert_eq!(transport.calls().len(), 1);
    assert_eq!(
        outcome.outcome.failure().map(|f| f.kind),
        Some(FailureKind::Cancelled)
    );
}
