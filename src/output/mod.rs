//! Dataset and error report writers

use crate::downloader::ErrorEntry;
use crate::Observation;

pub mod csv;
pub mod path;

pub use path::{sanitize_label, OutputPathBuilder};

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Generic output writer trait
pub trait OutputWriter {
    /// Flush any buffered data to disk
    fn flush(&mut self) -> OutputResult<()>;

    /// Close the writer and finalize output
    fn close(self) -> OutputResult<()>;
}

/// Trait for writing observations
pub trait ObservationWriter: OutputWriter {
    /// Write a single observation
    fn write_observation(&mut self, observation: &Observation) -> OutputResult<()>;

    /// Write multiple observations at once
    fn write_observations(&mut self, observations: &[Observation]) -> OutputResult<()> {
        for observation in observations {
            self.write_observation(observation)?;
        }
        Ok(())
    }
}

/// Trait for writing chunk error reports
pub trait ErrorReportWriter: OutputWriter {
    /// Write a single error entry
    fn write_error(&mut self, entry: &ErrorEntry) -> OutputResult<()>;
}
