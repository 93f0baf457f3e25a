//! # Hydrocron Downloader Library
//!
//! Retrieves SWOT river time series from the PO.DAAC Hydrocron API for
//! SWORD river reaches and nodes. Designed for hydrologists who pick
//! features from a SWORD attribute table and want every observation for a
//! date range in one consistent dataset, with a precise account of what
//! could not be fetched.
//!
//! ## Features
//!
//! - **Range Chunking**: Long date ranges are split into bounded requests
//! - **Retry with Backoff**: Transient failures (timeouts, 429, 5xx) are retried with jittered exponential backoff
//! - **Pagination**: Cursor-linked pages are followed in a bounded loop
//! - **Assembly**: Chunks and pages merge into one ordered, de-duplicated series per feature
//! - **Failure Reporting**: Every missing chunk is reported with feature, range, kind and message
//! - **Cancellation**: A single signal stops pending work while keeping completed chunks
//!
//! ## Quick Start
//!
//! ```no_run
//! use hydrocron_downloader::catalog::PassthroughCatalog;
//! use hydrocron_downloader::downloader::{DateRange, RetrievalConfig, RetrievalOrchestrator, Selection};
//! use hydrocron_downloader::fetcher::hydrocron_http::HydrocronHttpClient;
//! use hydrocron_downloader::FeatureType;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = DateRange::new(
//!     NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
//! )?;
//! let selection = Selection::new(
//!     FeatureType::Reach,
//!     vec!["63470800171".to_string()],
//!     vec!["wse".to_string(), "width".to_string()],
//!     range,
//! )?;
//!
//! let transport = Arc::new(HydrocronHttpClient::with_defaults()?);
//! let orchestrator = RetrievalOrchestrator::new(
//!     transport,
//!     Arc::new(PassthroughCatalog),
//!     RetrievalConfig::default(),
//! )?;
//!
//! let result = orchestrator.retrieve(selection).await?;
//! for entry in &result.errors {
//!     eprintln!("{entry}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`identifier`] - Feature identifier validation
//! - [`catalog`] - Feature catalog (SWORD attribute tables) and the valid field list
//! - [`fetcher`] - Transport contract, Hydrocron HTTP client, response parsing, pagination
//! - [`downloader`] - Chunking, request building, retry policy, assembly and orchestration
//! - [`output`] - CSV writers for datasets and error reports
//! - [`shutdown`] - Cancellation signal shared across concurrent requests
//! - [`metrics`] - Prometheus metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Feature and field catalogs
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Retrieval orchestration
pub mod downloader;

/// Transport and response handling
pub mod fetcher;

/// Feature identifier validation
pub mod identifier;

/// Prometheus metrics
pub mod metrics;

/// Dataset and error report writers
pub mod output;

/// Cancellation signal shared across concurrent requests
pub mod shutdown;

pub use identifier::FeatureId;

/// Fill value Hydrocron writes for missing numeric measurements
pub const FILL_VALUE: f64 = -999_999_999_999.0;

/// Kind of SWORD feature a time series belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    /// River reach (11-digit SWORD id)
    Reach,
    /// River node (14-digit SWORD id)
    Node,
}

impl FeatureType {
    /// Value of the `feature` query parameter
    pub fn as_query_value(&self) -> &'static str {
        match self {
            FeatureType::Reach => "Reach",
            FeatureType::Node => "Node",
        }
    }

    /// Column holding the feature id in Hydrocron responses and SWORD tables
    pub fn id_column(&self) -> &'static str {
        match self {
            FeatureType::Reach => "reach_id",
            FeatureType::Node => "node_id",
        }
    }

    /// Column holding the summary quality flag
    pub fn quality_column(&self) -> &'static str {
        match self {
            FeatureType::Reach => "reach_q",
            FeatureType::Node => "node_q",
        }
    }

    /// Lowercase label used in file names
    pub fn file_prefix(&self) -> &'static str {
        match self {
            FeatureType::Reach => "reach",
            FeatureType::Node => "node",
        }
    }
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_query_value())
    }
}

impl FromStr for FeatureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reach" | "reaches" => Ok(FeatureType::Reach),
            "node" | "nodes" => Ok(FeatureType::Node),
            _ => Err(format!("Invalid feature type: {s}. Valid options: reach, node")),
        }
    }
}

/// A single measured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    /// Numeric measurement
    Number(f64),
    /// Text attribute (e.g. `river_name`, `granuleUR`)
    Text(String),
    /// Fill value, empty cell or `no_data`
    Missing,
}

impl ObservationValue {
    /// Interpret a raw CSV cell
    ///
    /// Numbers at or below the Hydrocron fill value are treated as missing.
    pub fn from_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("no_data") {
            return ObservationValue::Missing;
        }

        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() || v <= FILL_VALUE => ObservationValue::Missing,
            Ok(v) => ObservationValue::Number(v),
            Err(_) => ObservationValue::Text(trimmed.to_string()),
        }
    }

    /// Whether the value is missing
    pub fn is_missing(&self) -> bool {
        matches!(self, ObservationValue::Missing)
    }
}

impl std::fmt::Display for ObservationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservationValue::Number(v) => write!(f, "{v}"),
            ObservationValue::Text(s) => write!(f, "{s}"),
            ObservationValue::Missing => Ok(()),
        }
    }
}

/// One time-series observation of one variable for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// SWORD feature id
    pub feature_id: String,
    /// Hydrocron field name (e.g. "wse")
    pub variable: String,
    /// Observation time (from `time_str`)
    pub timestamp: DateTime<Utc>,
    /// Measured value
    pub value: ObservationValue,
    /// Summary quality flag (`reach_q` / `node_q`), 0 = good
    pub quality: Option<u8>,
}
