//! Transport layer for the Hydrocron API
//!
//! A [`Transport`] performs exactly one attempt for one
//! [`QueryDescriptor`](crate::downloader::QueryDescriptor) and classifies the
//! result as an [`AttemptOutcome`]. Retrying, pagination and assembly live
//! above this layer.

use crate::downloader::QueryDescriptor;
use crate::Observation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod hydrocron_config;
pub mod hydrocron_http;
pub mod hydrocron_parser;
pub mod pagination;
pub mod retry_formatter;

/// Fetcher setup errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    ClientBuild(String),

    /// Invalid transport configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Response payload could not be understood
    #[error("parse error: {0}")]
    ParseError(String),
}

/// Result type for fetcher setup
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Classification of a failed attempt or chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Date range rejected (start after end, zero span)
    #[serde(rename = "InvalidRangeError")]
    InvalidRange,
    /// Feature id or variable set rejected
    #[serde(rename = "InvalidSelectionError")]
    InvalidSelection,
    /// Remote rejected the request (4xx other than 429)
    ClientError,
    /// Response could not be understood
    ParseError,
    /// Timeout, connection failure, 429 or 5xx
    TransientError,
    /// Retrieval was cancelled before this request completed
    Cancelled,
}

impl FailureKind {
    /// Stable name used in reports and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidRange => "InvalidRangeError",
            FailureKind::InvalidSelection => "InvalidSelectionError",
            FailureKind::ClientError => "ClientError",
            FailureKind::ParseError => "ParseError",
            FailureKind::TransientError => "TransientError",
            FailureKind::Cancelled => "Cancelled",
        }
    }

    /// Whether a failure of this kind may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::TransientError)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
    /// Whether retrying may help
    pub retryable: bool,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Server-requested delay before retrying (`Retry-After`)
    pub retry_after: Option<Duration>,
}

impl Failure {
    /// Failure of the given kind; retryability follows the kind
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            status: None,
            retry_after: None,
        }
    }

    /// Non-retryable rejection by the remote service
    pub fn client_error(status: u16, message: impl Into<String>) -> Self {
        Self::new(FailureKind::ClientError, message).with_status(status)
    }

    /// Retryable failure (timeout, 429, 5xx, connection)
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientError, message)
    }

    /// Malformed response
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ParseError, message)
    }

    /// Request not sent or abandoned because of cancellation
    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "retrieval cancelled")
    }

    /// Attach the HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a server-requested retry delay
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// One successful page of rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Observations in response order
    pub rows: Vec<Observation>,
    /// Continuation cursor when more rows exist
    pub next_cursor: Option<String>,
}

/// Result of exactly one request attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// 2xx with a well-formed payload
    Success(Page),
    /// Anything else
    Failure(Failure),
}

impl AttemptOutcome {
    /// Whether the attempt succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    /// Cursor of the next page, if the attempt succeeded and more pages exist
    pub fn next_cursor(&self) -> Option<&str> {
        match self {
            AttemptOutcome::Success(page) => page.next_cursor.as_deref(),
            AttemptOutcome::Failure(_) => None,
        }
    }

    /// The failure, if the attempt failed
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            AttemptOutcome::Failure(f) => Some(f),
            AttemptOutcome::Success(_) => None,
        }
    }
}

/// Executes one attempt per call
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request for `descriptor` and classify the outcome
    ///
    /// Implementations must not retry.
    async fn execute(&self, descriptor: &QueryDescriptor) -> AttemptOutcome;

    /// Base URL requests are sent to
    fn base_url(&self) -> &str;
}
