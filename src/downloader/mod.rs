//! Retrieval orchestration
//!
//! This module turns a [`Selection`] into requests, executes them with
//! retries and merges the responses into one [`RetrievalResult`].
//!
//! # Overview
//!
//! 1. **Selection**: What to retrieve, validated by [`Selection::new`]
//! 2. **Chunking**: [`RangeChunker`] splits the date range into bounded chunks
//! 3. **Requests**: [`RequestBuilder`] produces one [`QueryDescriptor`] per chunk per feature
//! 4. **Retry**: [`RetryPolicy`] runs each descriptor through the transport with backoff
//! 5. **Assembly**: [`ResultAssembler`] merges pages and chunks per feature
//! 6. **Execution**: [`RetrievalOrchestrator`] drives all of it under a concurrency bound
//!
//! # Error Handling
//!
//! Per-chunk failures never abort a retrieval; they become [`ErrorEntry`]
//! values in the result. [`RetrievalError`] is returned only for invalid
//! configuration, invalid selections and, in strict mode, when nothing at
//! all could be retrieved.
//!
//! # Related Modules
//!
//! - [`crate::fetcher`] - Transport contract and the Hydrocron client
//! - [`crate::output`] - Writing results to CSV

pub mod assembler;
pub mod config;
pub mod executor;
pub mod progress;
pub mod range;
pub mod rate_limit;
pub mod request;
pub mod result;
pub mod retry;
pub mod selection;

pub use assembler::{ChunkOutcomes, FeatureAssembly, ResultAssembler};
pub use config::RetrievalConfig;
pub use executor::RetrievalOrchestrator;
pub use range::{DateRange, RangeChunker};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use request::{QueryDescriptor, RequestBuilder};
pub use result::{ErrorEntry, FeatureDataset, RetrievalResult, RetrievalStats};
pub use retry::{RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};
pub use selection::Selection;

use crate::fetcher::FailureKind;

/// Retrieval errors
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Date range rejected
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Feature ids or variables rejected
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Strict mode: no feature returned any data
    #[error("no data retrieved ({} errors)", errors.len())]
    NoDataRetrieved {
        /// Every chunk failure of the retrieval
        errors: Vec<ErrorEntry>,
    },
}

impl RetrievalError {
    /// Failure classification, where one applies
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            RetrievalError::InvalidRange(_) => Some(FailureKind::InvalidRange),
            RetrievalError::InvalidSelection(_) => Some(FailureKind::InvalidSelection),
            RetrievalError::InvalidConfig(_) | RetrievalError::NoDataRetrieved { .. } => None,
        }
    }
}
