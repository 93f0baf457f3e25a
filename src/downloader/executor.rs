//! Retrieval orchestrator
//!
//! Resolves the selection through the feature catalog, fans out one unit of
//! work per (feature, chunk) under a concurrency bound, follows cursors with
//! retries, then assembles everything in selection and chunk order.

use crate::catalog::FeatureCatalog;
use crate::downloader::assembler::{ChunkOutcomes, FeatureAssembly, ResultAssembler};
use crate::downloader::config::RetrievalConfig;
use crate::downloader::progress::ProgressTracker;
use crate::downloader::range::{DateRange, RangeChunker};
use crate::downloader::request::RequestBuilder;
use crate::downloader::result::{ErrorEntry, FeatureDataset, RetrievalResult, RetrievalStats};
use crate::downloader::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::downloader::selection::Selection;
use crate::downloader::RetrievalError;
use crate::fetcher::pagination::{ChunkPages, PaginationHelper};
use crate::fetcher::{AttemptOutcome, Failure, FailureKind, Transport};
use crate::identifier::FeatureId;
use crate::metrics;
use crate::shutdown::{self, SharedCancel};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// One (feature, chunk) unit of work
struct WorkUnit {
    feature_index: usize,
    chunk_index: usize,
    feature_id: FeatureId,
    chunk: DateRange,
}

/// Completed unit of work
struct UnitReport {
    feature_index: usize,
    chunk_index: usize,
    outcomes: ChunkOutcomes,
    attempts: u32,
    pages_requested: u32,
}

/// Top-level driver of a retrieval
pub struct RetrievalOrchestrator {
    transport: Arc<dyn Transport>,
    catalog: Arc<dyn FeatureCatalog>,
    config: RetrievalConfig,
    sleeper: Arc<dyn Sleeper>,
    progress_tracker: ProgressTracker,
    cancel: Option<SharedCancel>,
}

impl RetrievalOrchestrator {
    /// Create an orchestrator
    ///
    /// # Errors
    /// Returns [`RetrievalError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        transport: Arc<dyn Transport>,
        catalog: Arc<dyn FeatureCatalog>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        Ok(Self {
            transport,
            catalog,
            config,
            sleeper: Arc::new(TokioSleeper),
            progress_tracker: ProgressTracker::default(),
            cancel: None,
        })
    }

    /// Replace the sleeper used for backoff waits
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Attach a cancel signal
    pub fn with_cancel(mut self, cancel: SharedCancel) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Customise progress log cadence
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve every observation of `selection`
    ///
    /// Chunk failures are reported in [`RetrievalResult::errors`]. Returns
    /// `Err` only for an unusable configuration or, in strict mode, when no
    /// feature had a single successful chunk.
    pub async fn retrieve(&self, selection: Selection) -> Result<RetrievalResult, RetrievalError> {
        self.retrieve_with_progress(selection, None).await
    }

    /// [`retrieve`](Self::retrieve), advancing `progress` once per unit
    pub async fn retrieve_with_progress(
        &self,
        selection: Selection,
        progress: Option<ProgressBar>,
    ) -> Result<RetrievalResult, RetrievalError> {
        let span = tracing::info_span!(
            "retrieve",
            feature_type = %selection.feature_type(),
            features = selection.feature_ids().len(),
            range = %selection.range(),
        );
        self.run(selection, progress).instrument(span).await
    }

    async fn run(
        &self,
        selection: Selection,
        progress: Option<ProgressBar>,
    ) -> Result<RetrievalResult, RetrievalError> {
        let started = Instant::now();
        self.config.validate()?;

        let chunker = RangeChunker::new(self.config.chunk_max_span_days)?;
        let chunks = chunker.split(selection.range());

        let unresolved = self.resolve(&selection);
        let units: Vec<WorkUnit> = selection
            .feature_ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| !unresolved.contains_key(*id))
            .flat_map(|(feature_index, id)| {
                chunks
                    .iter()
                    .enumerate()
                    .map(move |(chunk_index, chunk)| WorkUnit {
                        feature_index,
                        chunk_index,
                        feature_id: id.clone(),
                        chunk: *chunk,
                    })
            })
            .collect();

        info!(
            features = selection.feature_ids().len(),
            unresolved = unresolved.len(),
            chunks = chunks.len(),
            units = units.len(),
            concurrency = self.config.max_concurrency,
            "Starting retrieval"
        );

        if let Some(pb) = &progress {
            pb.set_length(units.len() as u64);
        }

        let policy = RetryPolicy::from_config(&self.config)
            .with_sleeper(Arc::clone(&self.sleeper))
            .with_cancel(self.cancel.clone());
        let variables = selection.shared_variables();
        let feature_type = selection.feature_type();
        let total_units = units.len() as u64;

        let mut progress_state = self.progress_tracker.create_state(total_units);
        let mut grid: Vec<Vec<Option<ChunkOutcomes>>> = selection
            .feature_ids()
            .iter()
            .map(|_| vec![None; chunks.len()])
            .collect();
        let mut stats = RetrievalStats {
            features: selection.feature_ids().len() as u64,
            chunks: total_units,
            ..RetrievalStats::default()
        };

        let mut reports = stream::iter(units)
            .map(|unit| self.fetch_unit(&policy, Arc::clone(&variables), feature_type, unit))
            .buffer_unordered(self.config.max_concurrency);

        while let Some(report) = reports.next().await {
            let rows: usize = report
                .outcomes
                .pages
                .iter()
                .filter_map(|o| match o {
                    AttemptOutcome::Success(page) => Some(page.rows.len()),
                    AttemptOutcome::Failure(_) => None,
                })
                .sum();
            let failure = report.outcomes.pages.iter().find_map(AttemptOutcome::failure);

            match failure {
                Some(f) if f.kind == FailureKind::Cancelled => {
                    debug!(chunk = %report.outcomes.chunk, "Chunk cancelled");
                }
                Some(f) => {
                    warn!(
                        feature_id = %selection.feature_ids()[report.feature_index],
                        chunk = %report.outcomes.chunk,
                        attempts = report.attempts,
                        error = %f,
                        "Chunk failed"
                    );
                }
                None => {
                    debug!(
                        feature_id = %selection.feature_ids()[report.feature_index],
                        chunk = %report.outcomes.chunk,
                        rows = rows,
                        "Chunk completed"
                    );
                }
            }

            stats.requests += u64::from(report.attempts);
            stats.retries += u64::from(report.attempts.saturating_sub(report.pages_requested));

            progress_state.record_unit(rows as u64, failure.is_some());
            if progress_state.should_emit_update() {
                info!("{}", progress_state.format_progress());
                progress_state.mark_emitted();
            }
            if let Some(pb) = &progress {
                pb.inc(1);
            }

            grid[report.feature_index][report.chunk_index] = Some(report.outcomes);
        }

        let mut dataset = Vec::with_capacity(grid.len());
        let mut errors = Vec::new();
        let mut features_with_success = 0usize;

        for (feature_index, slots) in grid.into_iter().enumerate() {
            let feature_id = &selection.feature_ids()[feature_index];

            let assembly = match unresolved.get(feature_id) {
                Some(reason) => FeatureAssembly {
                    errors: vec![ErrorEntry {
                        feature_id: feature_id.to_string(),
                        chunk: selection.range(),
                        kind: FailureKind::InvalidSelection,
                        message: reason.clone(),
                        partial: false,
                    }],
                    ..FeatureAssembly::default()
                },
                None => {
                    let outcomes: Vec<ChunkOutcomes> = slots
                        .into_iter()
                        .zip(&chunks)
                        .map(|(slot, chunk)| {
                            slot.unwrap_or_else(|| ChunkOutcomes {
                                chunk: *chunk,
                                pages: Vec::new(),
                            })
                        })
                        .collect();
                    ResultAssembler::new(feature_id.as_str(), selection.variables()).assemble(outcomes)
                }
            };

            if assembly.successful_chunks > 0 {
                features_with_success += 1;
            }
            stats.pages += assembly.pages as u64;
            stats.failed_chunks += assembly.errors.len() as u64;
            stats.observations += assembly.observations.len() as u64;
            for entry in &assembly.errors {
                metrics::record_chunk_failure(entry.kind.as_str());
            }

            errors.extend(assembly.errors);
            dataset.push(FeatureDataset {
                feature_id: feature_id.to_string(),
                feature_type,
                observations: assembly.observations,
            });
        }

        metrics::record_observations(stats.observations);
        let cancelled = shutdown::is_cancelled(self.cancel.as_ref());

        info!(
            observations = stats.observations,
            requests = stats.requests,
            retries = stats.retries,
            failed_chunks = stats.failed_chunks,
            cancelled = cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieval finished"
        );

        if self.config.strict_mode && features_with_success == 0 {
            error!(
                errors = errors.len(),
                "Strict mode: no feature returned any data"
            );
            return Err(RetrievalError::NoDataRetrieved { errors });
        }

        Ok(RetrievalResult {
            dataset,
            errors,
            stats,
            cancelled,
        })
    }

    /// Ask the catalog about every selected id; returns unresolved ids with reasons
    fn resolve(&self, selection: &Selection) -> HashMap<FeatureId, String> {
        let resolution = self.catalog.resolve(selection.feature_ids());
        let resolved: HashSet<&FeatureId> = resolution.resolved.iter().collect();

        let mut unresolved: HashMap<FeatureId, String> = resolution
            .unresolved
            .into_iter()
            .map(|u| (u.id, u.reason))
            .collect();

        for id in selection.feature_ids() {
            if !resolved.contains(id) && !unresolved.contains_key(id) {
                unresolved.insert(id.clone(), "feature not returned by catalog".to_string());
            }
        }

        for (id, reason) in &unresolved {
            warn!(feature_id = %id, reason = %reason, "Feature not resolved");
        }

        unresolved
    }

    async fn fetch_unit(
        &self,
        policy: &RetryPolicy,
        variables: Arc<[String]>,
        feature_type: crate::FeatureType,
        unit: WorkUnit,
    ) -> UnitReport {
        let WorkUnit {
            feature_index,
            chunk_index,
            feature_id,
            chunk,
        } = unit;

        let descriptor =
            match RequestBuilder::build(feature_id.as_str(), feature_type, variables, chunk, None) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    let kind = e.kind().unwrap_or(FailureKind::InvalidSelection);
                    return UnitReport {
                        feature_index,
                        chunk_index,
                        outcomes: ChunkOutcomes {
                            chunk,
                            pages: vec![AttemptOutcome::Failure(Failure::new(kind, e.to_string()))],
                        },
                        attempts: 0,
                        pages_requested: 0,
                    };
                }
            };

        let transport = self.transport.as_ref();
        let ChunkPages {
            pages,
            attempts,
            pages_requested,
        } = PaginationHelper::collect_pages(descriptor, self.config.max_pages, move |d| async move {
            policy.execute(transport, &d).await
        })
        .await;

        UnitReport {
            feature_index,
            chunk_index,
            outcomes: ChunkOutcomes { chunk, pages },
            attempts,
            pages_requested,
        }
    }
}
