//! CSV output writers
//!
//! Observations are written in long format, one row per
//! (feature, variable, time). Error reports list one row per failed chunk.

use crate::downloader::{ErrorEntry, RetrievalResult};
use crate::Observation;
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::path::OutputPathBuilder;
use super::{ErrorReportWriter, ObservationWriter, OutputError, OutputResult, OutputWriter};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Timestamp layout written to CSV
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const OBSERVATION_HEADER: [&str; 5] = ["feature_id", "variable", "timestamp", "value", "quality"];
const ERROR_HEADER: [&str; 6] = ["feature_id", "start", "end", "kind", "partial", "message"];

/// CSV record for one observation
#[derive(Debug, Serialize)]
struct ObservationRecord<'a> {
    feature_id: &'a str,
    variable: &'a str,
    timestamp: String,
    value: String,
    quality: Option<u8>,
}

impl<'a> From<&'a Observation> for ObservationRecord<'a> {
    fn from(observation: &'a Observation) -> Self {
        Self {
            feature_id: &observation.feature_id,
            variable: &observation.variable,
            timestamp: observation.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            value: observation.value.to_string(),
            quality: observation.quality,
        }
    }
}

/// CSV record for one error entry
#[derive(Debug, Serialize)]
struct ErrorRecord<'a> {
    feature_id: &'a str,
    start: String,
    end: String,
    kind: &'static str,
    partial: bool,
    message: &'a str,
}

impl<'a> From<&'a ErrorEntry> for ErrorRecord<'a> {
    fn from(entry: &'a ErrorEntry) -> Self {
        Self {
            feature_id: &entry.feature_id,
            start: entry.chunk.start().to_string(),
            end: entry.chunk.end().to_string(),
            kind: entry.kind.as_str(),
            partial: entry.partial,
            message: &entry.message,
        }
    }
}

/// Open a buffered CSV writer at `path` and write `header`
fn open_writer<P: AsRef<Path>>(
    path: P,
    buffer_size: usize,
    header: &[&str],
) -> OutputResult<Writer<BufWriter<File>>> {
    let path = path.as_ref();
    info!("Creating CSV writer: path={}", path.display());

    // Create parent directory if it doesn't exist
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
    }

    let file = File::create(path)
        .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;

    let buf_writer = BufWriter::with_capacity(buffer_size, file);
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(buf_writer);

    // Header is written up front so files without rows are still self-describing
    writer
        .write_record(header)
        .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;

    Ok(writer)
}

fn close_writer(writer: Writer<BufWriter<File>>) -> OutputResult<()> {
    let buf_writer = writer
        .into_inner()
        .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;

    let file = buf_writer
        .into_inner()
        .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {e}")))?;

    file.sync_all()
        .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))
}

/// CSV writer for observations
pub struct CsvObservationWriter {
    writer: Writer<BufWriter<File>>,
    observations_written: u64,
}

impl CsvObservationWriter {
    /// Create a new observation writer
    ///
    /// # Arguments
    /// * `path` - Output file path (parent directories are created)
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Self::new_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new observation writer with custom buffer size
    pub fn new_with_buffer_size<P: AsRef<Path>>(path: P, buffer_size: usize) -> OutputResult<Self> {
        Ok(Self {
            writer: open_writer(path, buffer_size, &OBSERVATION_HEADER)?,
            observations_written: 0,
        })
    }

    /// Get number of observations written so far
    pub fn observations_written(&self) -> u64 {
        self.observations_written
    }
}

impl ObservationWriter for CsvObservationWriter {
    fn write_observation(&mut self, observation: &Observation) -> OutputResult<()> {
        self.writer
            .serialize(ObservationRecord::from(observation))
            .map_err(|e| OutputError::CsvError(format!("Failed to write observation: {e}")))?;

        self.observations_written += 1;

        // Flush periodically (every 1000 rows)
        if self.observations_written % 1000 == 0 {
            self.flush()?;
            debug!("Progress: {} observations written", self.observations_written);
        }

        Ok(())
    }
}

impl OutputWriter for CsvObservationWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        close_writer(self.writer)?;
        debug!(
            "CSV writer closed: {} observations written",
            self.observations_written
        );
        Ok(())
    }
}

/// CSV writer for error reports
pub struct CsvErrorReportWriter {
    writer: Writer<BufWriter<File>>,
    entries_written: u64,
}

impl CsvErrorReportWriter {
    /// Create a new error report writer
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Ok(Self {
            writer: open_writer(path, DEFAULT_BUFFER_SIZE, &ERROR_HEADER)?,
            entries_written: 0,
        })
    }

    /// Get number of entries written so far
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }
}

impl ErrorReportWriter for CsvErrorReportWriter {
    fn write_error(&mut self, entry: &ErrorEntry) -> OutputResult<()> {
        self.writer
            .serialize(ErrorRecord::from(entry))
            .map_err(|e| OutputError::CsvError(format!("Failed to write error entry: {e}")))?;
        self.entries_written += 1;
        Ok(())
    }
}

impl OutputWriter for CsvErrorReportWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        close_writer(self.writer)
    }
}

/// Files produced by [`write_retrieval_result`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenFiles {
    /// Per-feature files, in dataset order
    pub feature_files: Vec<PathBuf>,
    /// Combined file, when any observation was retrieved
    pub combined_file: Option<PathBuf>,
    /// Error report, when any chunk failed
    pub errors_file: Option<PathBuf>,
    /// Rows written to the combined file
    pub observations_written: u64,
}

/// Write every dataset and the error report of `result`
///
/// Features without observations get no file; the combined file is only
/// written when at least one feature has data.
pub fn write_retrieval_result(
    result: &RetrievalResult,
    paths: &OutputPathBuilder,
) -> OutputResult<WrittenFiles> {
    paths.ensure_directories()?;
    let mut written = WrittenFiles::default();

    for dataset in result.dataset.iter().filter(|d| !d.is_empty()) {
        let path = paths.feature_file(&dataset.feature_id);
        let mut writer = CsvObservationWriter::new(&path)?;
        writer.write_observations(&dataset.observations)?;
        writer.close()?;
        written.feature_files.push(path);
    }

    if !written.feature_files.is_empty() {
        let path = paths.combined_file();
        let mut writer = CsvObservationWriter::new(&path)?;
        for dataset in &result.dataset {
            writer.write_observations(&dataset.observations)?;
        }
        written.observations_written = writer.observations_written();
        writer.close()?;
        written.combined_file = Some(path);
    }

    if !result.errors.is_empty() {
        let path = paths.errors_file();
        let mut writer = CsvErrorReportWriter::new(&path)?;
        for entry in &result.errors {
            writer.write_error(entry)?;
        }
        writer.close()?;
        written.errors_file = Some(path);
    }

    info!(
        output_dir = %paths.output_dir().display(),
        feature_files = written.feature_files.len(),
        observations = written.observations_written,
        errors = result.errors.len(),
        "Retrieval written"
    );

    Ok(written)
}
