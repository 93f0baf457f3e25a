//! Test doubles shared by the unit and integration suites
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hydrocron_downloader::downloader::{DateRange, QueryDescriptor, Sleeper};
use hydrocron_downloader::fetcher::{AttemptOutcome, Failure, Page, Transport};
use hydrocron_downloader::{Observation, ObservationValue};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const REACH_A: &str = "63470800171";
pub const REACH_B: &str = "63470800181";

/// One transport call as seen by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub feature_id: String,
    pub chunk: DateRange,
    pub cursor: Option<String>,
    /// 1-based attempt number for this (feature, chunk, cursor)
    pub attempt: u32,
}

type Responder = dyn Fn(&Call) -> AttemptOutcome + Send + Sync;
type Latency = dyn Fn(&Call) -> Duration + Send + Sync;

/// Transport answering from a closure and recording every call
pub struct ScriptedTransport {
    responder: Box<Responder>,
    latency: Option<Box<Latency>>,
    calls: Mutex<Vec<Call>>,
    completed: Mutex<Vec<Call>>,
    attempts: Mutex<HashMap<(String, DateRange, Option<String>), u32>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Call) -> AttemptOutcome + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Answer each call only after the duration `latency` picks for it
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&Call) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    /// Calls that produced an answer, in the order they finished
    pub fn completed(&self) -> Vec<Call> {
        self.completed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, feature_id: &str, chunk: DateRange) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.feature_id == feature_id && c.chunk == chunk)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, descriptor: &QueryDescriptor) -> AttemptOutcome {
        let key = (
            descriptor.feature_id().to_string(),
            descriptor.chunk(),
            descriptor.cursor().map(str::to_string),
        );
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let call = Call {
            feature_id: key.0,
            chunk: key.1,
            cursor: key.2,
            attempt,
        };
        self.calls.lock().unwrap().push(call.clone());
        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(&call)).await;
        }
        let outcome = (self.responder)(&call);
        self.completed.lock().unwrap().push(call);
        outcome
    }

    fn base_url(&self) -> &str {
        "mock://hydrocron"
    }
}

/// Sleeper that returns immediately and remembers every requested delay
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

pub fn range(start: &str, end: &str) -> DateRange {
    DateRange::parse(start, end).unwrap()
}

pub fn at(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn observation(feature_id: &str, variable: &str, timestamp: &str, value: f64) -> Observation {
    Observation {
        feature_id: feature_id.to_string(),
        variable: variable.to_string(),
        timestamp: at(timestamp),
        value: ObservationValue::Number(value),
        quality: Some(0),
    }
}

pub fn success(rows: Vec<Observation>) -> AttemptOutcome {
    page(rows, None)
}

pub fn page(rows: Vec<Observation>, next_cursor: Option<&str>) -> AttemptOutcome {
    AttemptOutcome::Success(Page {
        rows,
        next_cursor: next_cursor.map(str::to_string),
    })
}

pub fn server_error() -> AttemptOutcome {
    AttemptOutcome::Failure(Failure::transient("HTTP 500: internal error").with_status(500))
}

pub fn not_found() -> AttemptOutcome {
    AttemptOutcome::Failure(Failure::client_error(
        400,
        "Results with the specified Feature ID were not found",
    ))
}

/// Hydrocron envelope around a CSV body
pub fn envelope(csv: &str, next: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "status": "200 OK",
        "time": 12.5,
        "hits": csv.lines().count().saturating_sub(1),
        "results": { "csv": csv, "geojson": {} },
    });
    if let Some(cursor) = next {
        body["next"] = serde_json::Value::String(cursor.to_string());
    }
    body
}
