//! Merging page and chunk outcomes into one series per feature

use super::range::DateRange;
use super::result::ErrorEntry;
use crate::fetcher::{AttemptOutcome, FailureKind};
use crate::Observation;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Page outcomes of one chunk, in page order
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcomes {
    /// Chunk the pages belong to
    pub chunk: DateRange,
    /// One outcome per page; only the last may be a failure
    pub pages: Vec<AttemptOutcome>,
}

/// Assembled series and chunk errors of one feature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureAssembly {
    /// Ascending by timestamp, unique per (variable, timestamp)
    pub observations: Vec<Observation>,
    /// One entry per failed chunk, in chunk order
    pub errors: Vec<ErrorEntry>,
    /// Chunks whose first page succeeded
    pub successful_chunks: usize,
    /// Successful pages across chunks
    pub pages: usize,
}

/// Merges chunk outcomes for one feature
#[derive(Debug, Clone)]
pub struct ResultAssembler<'a> {
    feature_id: &'a str,
    variables: &'a [String],
}

impl<'a> ResultAssembler<'a> {
    /// Assembler for `feature_id`; `variables` orders same-timestamp rows
    pub fn new(feature_id: &'a str, variables: &'a [String]) -> Self {
        Self {
            feature_id,
            variables,
        }
    }

    /// Merge `chunks`, which must be in chunk order
    ///
    /// Duplicates on (variable, timestamp) keep the first row seen in
    /// chunk, page, row order. A chunk whose first page failed yields one
    /// non-partial error; a later page failure keeps earlier rows and yields
    /// one partial error.
    pub fn assemble(&self, chunks: Vec<ChunkOutcomes>) -> FeatureAssembly {
        let mut assembly = FeatureAssembly::default();
        let mut seen: HashSet<(String, DateTime<Utc>)> = HashSet::new();

        for ChunkOutcomes { chunk, pages } in chunks {
            if pages.is_empty() {
                assembly.errors.push(self.error(
                    chunk,
                    FailureKind::Cancelled,
                    "chunk was never requested".to_string(),
                    false,
                ));
                continue;
            }

            let mut rows_kept = 0usize;
            for (index, outcome) in pages.into_iter().enumerate() {
                match outcome {
                    AttemptOutcome::Success(page) => {
                        if index == 0 {
                            assembly.successful_chunks += 1;
                        }
                        assembly.pages += 1;
                        for row in page.rows {
                            if seen.insert((row.variable.clone(), row.timestamp)) {
                                assembly.observations.push(row);
                                rows_kept += 1;
                            }
                        }
                    }
                    AttemptOutcome::Failure(failure) => {
                        let partial = index > 0;
                        let message = if partial {
                            format!(
                                "page {} failed after {} rows were retrieved: {}",
                                index + 1,
                                rows_kept,
                                failure
                            )
                        } else {
                            failure.to_string()
                        };
                        assembly
                            .errors
                            .push(self.error(chunk, failure.kind, message, partial));
                        break;
                    }
                }
            }
        }

        let rank = |variable: &str| {
            self.variables
                .iter()
                .position(|v| v == variable)
                .unwrap_or(usize::MAX)
        };
        assembly
            .observations
            .sort_by(|a, b| (a.timestamp, rank(&a.variable)).cmp(&(b.timestamp, rank(&b.variable))));

        debug!(
            feature_id = self.feature_id,
            observations = assembly.observations.len(),
            failed_chunks = assembly.errors.len(),
            "Assembled feature"
        );

        assembly
    }

    fn error(&self, chunk: DateRange, kind: FailureKind, message: String, partial: bool) -> ErrorEntry {
        ErrorEntry {
            feature_id: self.feature_id.to_string(),
            chunk,
            kind,
            message,
            partial,
        }
    }
}
