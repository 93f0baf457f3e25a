//! Output file layout
//!
//! A retrieval writes into one directory named after the selection label:
//!
//! ```text
//! swot_<label>_output/
//!     reach_<id>.csv        one file per feature with data
//!     combined_<label>.csv  every observation of the retrieval
//!     errors.csv            chunk failures, when there are any
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use hydrocron_downloader::output::OutputPathBuilder;
//! use hydrocron_downloader::FeatureType;
//! use std::path::PathBuf;
//!
//! let paths = OutputPathBuilder::new(PathBuf::from("out"), "Mississippi River", FeatureType::Reach);
//! assert_eq!(
//!     paths.feature_file("74230900181"),
//!     PathBuf::from("out/swot_Mississippi River_output/reach_74230900181.csv")
//! );
//! ```

use super::OutputError;
use crate::FeatureType;
use std::path::PathBuf;

/// Label used when sanitising leaves nothing
const DEFAULT_LABEL: &str = "selection";

/// File name of the error report
pub const ERRORS_FILE: &str = "errors.csv";

/// Path builder for one retrieval's output files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPathBuilder {
    root_dir: PathBuf,
    label: String,
    feature_type: FeatureType,
}

impl OutputPathBuilder {
    /// Create a new path builder
    ///
    /// # Arguments
    ///
    /// * `root_dir` - Directory the output directory is created in
    /// * `label` - Selection label (filter value or first feature id)
    /// * `feature_type` - Determines per-feature file prefixes
    ///
    /// The label is sanitised with [`sanitize_label`].
    pub fn new(root_dir: PathBuf, label: &str, feature_type: FeatureType) -> Self {
        Self {
            root_dir,
            label: sanitize_label(label),
            feature_type,
        }
    }

    /// Sanitised label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Directory holding every file of the retrieval
    pub fn output_dir(&self) -> PathBuf {
        self.root_dir.join(format!("swot_{}_output", self.label))
    }

    /// Per-feature CSV path
    pub fn feature_file(&self, feature_id: &str) -> PathBuf {
        self.output_dir().join(format!(
            "{}_{}.csv",
            self.feature_type.file_prefix(),
            sanitize_component(feature_id)
        ))
    }

    /// Combined CSV path
    pub fn combined_file(&self) -> PathBuf {
        self.output_dir().join(format!("combined_{}.csv", self.label))
    }

    /// Error report path
    pub fn errors_file(&self) -> PathBuf {
        self.output_dir().join(ERRORS_FILE)
    }

    /// Create the output directory
    pub fn ensure_directories(&self) -> Result<(), OutputError> {
        let dir_path = self.output_dir();
        std::fs::create_dir_all(&dir_path).map_err(|e| {
            OutputError::IoError(format!(
                "Failed to create directory {}: {}",
                dir_path.display(),
                e
            ))
        })
    }
}

/// Keep alphanumerics, space, `_` and `-`; drop trailing whitespace
///
/// Returns `"selection"` when nothing survives.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Replace path separators and parent references in a file name component
fn sanitize_component(component: &str) -> String {
    component
        .replace("..", "_")
        .replace(['/', '\\', ':'], "_")
}
