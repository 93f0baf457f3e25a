//! Retrieval results and error entries

use super::range::DateRange;
use crate::fetcher::FailureKind;
use crate::{FeatureType, Observation};
use serde::Serialize;
use std::fmt;

/// One chunk that could not be fully retrieved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    /// Feature the chunk belongs to
    pub feature_id: String,
    /// Date range of the chunk (the whole range for unresolved features)
    pub chunk: DateRange,
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
    /// Whether some pages of the chunk were retrieved before the failure
    pub partial: bool,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}{}: {}",
            self.feature_id,
            self.chunk,
            self.kind,
            if self.partial { " (partial)" } else { "" },
            self.message
        )
    }
}

/// Observations for one requested feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDataset {
    /// Requested feature id
    pub feature_id: String,
    /// SWORD feature type
    pub feature_type: FeatureType,
    /// Ascending by timestamp, ties in selection variable order
    pub observations: Vec<Observation>,
}

impl FeatureDataset {
    /// Whether no observation was retrieved
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Counters for one retrieval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalStats {
    /// Features requested
    pub features: u64,
    /// (feature, chunk) units executed
    pub chunks: u64,
    /// Transport calls made, retries included
    pub requests: u64,
    /// Transport calls beyond the first per page
    pub retries: u64,
    /// Pages that succeeded
    pub pages: u64,
    /// Chunks that ended with an error entry
    pub failed_chunks: u64,
    /// Observations in the dataset
    pub observations: u64,
}

/// Outcome of [`RetrievalOrchestrator::retrieve`](super::RetrievalOrchestrator::retrieve)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    /// One entry per requested feature, in selection order
    pub dataset: Vec<FeatureDataset>,
    /// Ordered by feature (selection order) then chunk
    pub errors: Vec<ErrorEntry>,
    /// Counters
    pub stats: RetrievalStats,
    /// Whether the retrieval was cancelled before finishing
    pub cancelled: bool,
}

impl RetrievalResult {
    /// Dataset of one feature
    pub fn get(&self, feature_id: &str) -> Option<&FeatureDataset> {
        self.dataset.iter().find(|d| d.feature_id == feature_id)
    }

    /// Observations of one feature (empty when unknown)
    pub fn observations(&self, feature_id: &str) -> &[Observation] {
        self.get(feature_id)
            .map(|d| d.observations.as_slice())
            .unwrap_or(&[])
    }

    /// Total observations across features
    pub fn total_observations(&self) -> usize {
        self.dataset.iter().map(|d| d.observations.len()).sum()
    }

    /// Whether every chunk of every feature succeeded
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// Errors of one feature
    pub fn errors_for<'a>(&'a self, feature_id: &'a str) -> impl Iterator<Item = &'a ErrorEntry> {
        self.errors.iter().filter(move |e| e.feature_id == feature_id)
    }
}
