//! Progress tracking for long-running retrievals.
//!
//! A retrieval is a fixed number of (feature, chunk) units. This module
//! counts completed units, estimates remaining time and formats the periodic
//! progress lines the orchestrator logs.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_RETRIEVAL_DURATION: Duration = Duration::from_secs(30);

/// Lightweight builder that controls update cadence.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    update_interval: Duration,
    min_percentage_step: f64,
}

impl ProgressTracker {
    /// Create a tracker with custom interval and percentage step.
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        Self {
            update_interval,
            min_percentage_step,
        }
    }

    /// Build a [`ProgressState`] configured with the tracker defaults.
    pub fn create_state(&self, total_units: u64) -> ProgressState {
        let mut state = ProgressState::new(total_units);
        state.update_interval = self.update_interval;
        state.min_percentage_step = self.min_percentage_step;
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, 10.0)
    }
}

/// Progress of one retrieval.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Units finished (successfully or not).
    pub completed_units: u64,
    /// Units that ended with a failure.
    pub failed_units: u64,
    /// Rows received so far (before de-duplication).
    pub rows_received: u64,
    /// Total units of the retrieval.
    pub total_units: u64,
    /// When the retrieval started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between time-based updates.
    pub update_interval: Duration,
    /// Last reported completion percentage (0-100).
    pub last_reported_percentage: f64,
    /// Minimum percentage delta required to emit a new update.
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Create a new progress state with default intervals.
    pub fn new(total_units: u64) -> Self {
        let now = Instant::now();
        Self {
            completed_units: 0,
            failed_units: 0,
            rows_received: 0,
            total_units,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
        }
    }

    /// Record a finished unit.
    pub fn record_unit(&mut self, rows: u64, failed: bool) {
        self.completed_units = self.completed_units.saturating_add(1);
        self.rows_received = self.rows_received.saturating_add(rows);
        if failed {
            self.failed_units = self.failed_units.saturating_add(1);
        }
    }

    /// Whether a progress update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.completed_units == 0 {
            return false;
        }

        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.start_time.elapsed() >= MIN_RETRIEVAL_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress log to reset timers and cached percentage.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.completed_units as f64 / self.total_units as f64) * 100.0
    }

    /// Estimate remaining time from the average unit duration so far.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.completed_units == 0 || self.completed_units >= self.total_units {
            return None;
        }
        let per_unit = self.start_time.elapsed().as_secs_f64() / self.completed_units as f64;
        let remaining = (self.total_units - self.completed_units) as f64 * per_unit;
        Some(Duration::from_secs_f64(remaining))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} chunks - {:.1}% complete",
            self.completed_units,
            self.total_units,
            self.percentage()
        )];

        parts.push(format!("({} rows)", self.rows_received));

        if self.failed_units > 0 {
            parts.push(format!("- {} failed", self.failed_units));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
