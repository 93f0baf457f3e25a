//! Log lines for retried Hydrocron requests.
//!
//! [`RequestProblem`] names what went wrong with one attempt and decides the
//! [`FailureKind`] it is reported as. [`AttemptReport`] renders the retry,
//! recovery and give-up lines for one descriptor.

use super::{Failure, FailureKind};
use crate::downloader::QueryDescriptor;
use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// What went wrong with a single request attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProblem {
    /// No response within the request timeout
    Timeout,
    /// Connection refused or DNS lookup failed
    Unreachable,
    /// Request could not be built or followed (malformed URL, redirect loop)
    InvalidRequest,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    Server(u16),
    /// HTTP 4xx other than 429; Hydrocron reports unknown ids with a 400
    Rejected(u16),
    /// 2xx with a body that could not be parsed
    Malformed,
    /// Any other transport failure
    Network,
}

impl RequestProblem {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimited,
            code if status.is_server_error() => Self::Server(code),
            code => Self::Rejected(code),
        }
    }

    /// Classify an error raised before any response arrived
    pub fn from_error(err: &ReqwestError) -> Self {
        if err.is_builder() || err.is_redirect() {
            Self::InvalidRequest
        } else if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unreachable
        } else {
            Self::Network
        }
    }

    /// Classify a recorded failure
    ///
    /// Status codes are authoritative; without one the label prefix written
    /// by the HTTP client identifies the problem.
    pub fn from_failure(failure: &Failure) -> Self {
        if failure.kind == FailureKind::ParseError {
            return Self::Malformed;
        }
        if let Some(status) = failure.status.and_then(|s| StatusCode::from_u16(s).ok()) {
            return Self::from_status(status);
        }
        [Self::Timeout, Self::Unreachable, Self::InvalidRequest, Self::Network]
            .into_iter()
            .find(|problem| failure.message.starts_with(problem.label()))
            .unwrap_or(match failure.kind {
                FailureKind::ClientError => Self::InvalidRequest,
                _ => Self::Network,
            })
    }

    /// Kind the failed chunk is reported as
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidRequest | Self::Rejected(_) => FailureKind::ClientError,
            Self::Malformed => FailureKind::ParseError,
            Self::Timeout | Self::Unreachable | Self::RateLimited | Self::Server(_) | Self::Network => {
                FailureKind::TransientError
            }
        }
    }

    /// Short label, also used as the failure message prefix
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "request timed out",
            Self::Unreachable => "Hydrocron unreachable",
            Self::InvalidRequest => "request could not be sent",
            Self::RateLimited => "rate limited",
            Self::Server(_) => "server error",
            Self::Rejected(_) => "request rejected",
            Self::Malformed => "unreadable response",
            Self::Network => "network error",
        }
    }

    /// What the user can change to get past this problem
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Timeout => "raise --timeout-secs or lower --chunk-days",
            Self::Unreachable => "check connectivity and --base-url",
            Self::InvalidRequest => "check that --base-url (HYDROCRON_BASE_URL) is a valid http(s) URL",
            Self::RateLimited => "lower --requests-per-second or --concurrency",
            Self::Server(_) => "Hydrocron is having trouble; retry later or raise --max-attempts",
            Self::Rejected(400) => "confirm the ids exist in SWORD and the fields with `fields`",
            Self::Rejected(413) => "lower --chunk-days or request fewer variables",
            Self::Rejected(_) => "compare the request with the Hydrocron API documentation",
            Self::Malformed => "check that --base-url points at Hydrocron v1",
            Self::Network => "check connectivity and try again",
        }
    }
}

/// Log text for one descriptor at one attempt
#[derive(Debug, Clone, Copy)]
pub struct AttemptReport<'a> {
    descriptor: &'a QueryDescriptor,
    attempt: u32,
    max_attempts: u32,
}

impl<'a> AttemptReport<'a> {
    pub fn new(descriptor: &'a QueryDescriptor, attempt: u32, max_attempts: u32) -> Self {
        Self {
            descriptor,
            attempt,
            max_attempts,
        }
    }

    /// Attempt failed and another follows after `backoff`
    pub fn retrying(&self, failure: &Failure, backoff: Duration) -> String {
        format!(
            "{} {}: attempt {}/{} {}, retrying in {:.1}s",
            self.descriptor.feature_id(),
            self.descriptor.chunk(),
            self.attempt,
            self.max_attempts,
            RequestProblem::from_failure(failure).label(),
            backoff.as_secs_f64()
        )
    }

    /// Attempt succeeded after earlier failures
    pub fn recovered(&self) -> String {
        format!(
            "{} {}: recovered on attempt {}/{}",
            self.descriptor.feature_id(),
            self.descriptor.chunk(),
            self.attempt,
            self.max_attempts
        )
    }

    /// Attempts exhausted
    pub fn gave_up(&self, failure: &Failure, endpoint: &str) -> String {
        let problem = RequestProblem::from_failure(failure);
        format!(
            "{} {}: giving up after {} attempt{} against {endpoint}: {failure} (hint: {})",
            self.descriptor.feature_id(),
            self.descriptor.chunk(),
            self.attempt,
            if self.attempt == 1 { "" } else { "s" },
            problem.hint()
        )
    }
}
