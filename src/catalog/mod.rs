//! Feature catalogs
//!
//! A catalog supplies the features a user can pick from. The retrieval engine
//! only asks it to confirm identifiers through [`FeatureCatalog::resolve`];
//! browsing (columns, distinct values, filtering) is for the CLI.
//!
//! [`StaticCatalog`] holds a SWORD attribute table in memory, loaded from the
//! shapefile's `.dbf` or from a CSV export of it. [`PassthroughCatalog`]
//! accepts every id and is used when ids are given directly.

use crate::identifier::FeatureId;
use crate::FeatureType;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

pub mod fields;

pub use fields::FieldCatalog;

/// Source of selectable features
pub trait FeatureCatalog: Send + Sync {
    /// Confirm which of the requested ids exist
    ///
    /// Order of `resolved` follows the input order. Unknown ids are reported,
    /// never dropped.
    fn resolve(&self, ids: &[FeatureId]) -> CatalogResolution;
}

/// Outcome of resolving a list of ids against a catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogResolution {
    /// Ids present in the catalog
    pub resolved: Vec<FeatureId>,
    /// Ids the catalog does not know, with the reason
    pub unresolved: Vec<UnresolvedFeature>,
}

/// An id the catalog could not confirm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedFeature {
    /// Requested id
    pub id: FeatureId,
    /// Why it was rejected
    pub reason: String,
}

/// Catalog that accepts every identifier
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCatalog;

impl FeatureCatalog for PassthroughCatalog {
    fn resolve(&self, ids: &[FeatureId]) -> CatalogResolution {
        CatalogResolution {
            resolved: ids.to_vec(),
            unresolved: Vec::new(),
        }
    }
}

/// One row of a SWORD attribute table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRecord {
    /// Feature id taken from the id column
    pub id: FeatureId,
    /// All columns of the row, keyed by header
    pub attributes: BTreeMap<String, String>,
}

/// In-memory SWORD attribute table
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    feature_type: FeatureType,
    columns: Vec<String>,
    records: Vec<FeatureRecord>,
    index: HashMap<FeatureId, usize>,
}

impl StaticCatalog {
    /// Build a catalog from bare ids (no attributes)
    pub fn from_ids<I>(feature_type: FeatureType, ids: I) -> Self
    where
        I: IntoIterator<Item = FeatureId>,
    {
        let mut catalog = Self {
            feature_type,
            columns: vec![feature_type.id_column().to_string()],
            records: Vec::new(),
            index: HashMap::new(),
        };

        for id in ids {
            let mut attributes = BTreeMap::new();
            attributes.insert(feature_type.id_column().to_string(), id.to_string());
            catalog.push(FeatureRecord { id, attributes });
        }

        catalog
    }

    /// Load a catalog from a CSV attribute table
    ///
    /// The table must contain the id column of `feature_type` (`reach_id` or
    /// `node_id`). Rows with an empty id are skipped, mirroring how empty ids
    /// are dropped when filtering.
    pub fn from_csv_reader<R: Read>(reader: R, feature_type: FeatureType) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()
            .map_err(|e| CatalogError::ParseError(format!("Failed to read header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let rows = csv_reader.records().enumerate().map(|(line, row)| {
            row.map(|row| row.iter().map(str::to_string).collect::<Vec<String>>())
                .map_err(|e| CatalogError::ParseError(format!("Failed to read row {}: {e}", line + 2)))
        });
        Self::from_table(feature_type, columns, rows)
    }

    /// Load a catalog from a dBase attribute table (the `.dbf` of a SWORD
    /// shapefile)
    ///
    /// Numeric ids stored as floats are written without the fraction.
    pub fn from_dbf_path<P: AsRef<Path>>(path: P, feature_type: FeatureType) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let mut reader = dbase::Reader::from_path(path)
            .map_err(|e| CatalogError::IoError(format!("Failed to open {}: {e}", path.display())))?;

        let columns: Vec<String> = reader
            .fields()
            .iter()
            .map(|field| field.name().to_string())
            .filter(|name| name != DBF_DELETION_FLAG)
            .collect();

        let records = reader
            .read()
            .map_err(|e| CatalogError::ParseError(format!("Failed to read {}: {e}", path.display())))?;

        let rows = records.into_iter().map(|record| {
            let mut cells: HashMap<String, String> = record
                .into_iter()
                .map(|(name, value)| (name, dbf_cell(value)))
                .collect();
            Ok(columns
                .iter()
                .map(|column| cells.remove(column).unwrap_or_default())
                .collect::<Vec<String>>())
        });
        Self::from_table(feature_type, columns.clone(), rows)
    }

    /// Load a catalog, picking the reader from the file extension
    ///
    /// `.dbf` is read directly; for `.shp` the sibling `.dbf` is read. Any
    /// other file is treated as CSV.
    pub fn from_path<P: AsRef<Path>>(path: P, feature_type: FeatureType) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("dbf") => Self::from_dbf_path(path, feature_type),
            Some("shp") => Self::from_dbf_path(path.with_extension("dbf"), feature_type),
            _ => Self::from_csv_path(path, feature_type),
        }
    }

    fn from_table<I>(feature_type: FeatureType, columns: Vec<String>, rows: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = Result<Vec<String>, CatalogError>>,
    {
        let id_column = feature_type.id_column();
        let id_pos = columns
            .iter()
            .position(|c| c == id_column)
            .ok_or_else(|| CatalogError::MissingColumn(id_column.to_string()))?;

        let mut catalog = Self {
            feature_type,
            columns: columns.clone(),
            records: Vec::new(),
            index: HashMap::new(),
        };

        let mut skipped = 0usize;
        for row in rows {
            let row = row?;

            let raw_id = normalize_id_cell(row.get(id_pos).map(String::as_str).unwrap_or_default());
            let id = match FeatureId::parse(&raw_id) {
                Ok(id) => id,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            let attributes = columns
                .iter()
                .cloned()
                .zip(row)
                .collect();

            catalog.push(FeatureRecord { id, attributes });
        }

        if skipped > 0 {
            warn!(skipped = skipped, "Skipped catalog rows without a usable {}", id_column);
        }
        info!(
            features = catalog.records.len(),
            columns = catalog.columns.len(),
            "Loaded {} catalog",
            feature_type
        );

        Ok(catalog)
    }

    /// Load a catalog from a CSV file on disk
    pub fn from_csv_path<P: AsRef<Path>>(path: P, feature_type: FeatureType) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| CatalogError::IoError(format!("Failed to open {}: {e}", path.display())))?;
        Self::from_csv_reader(file, feature_type)
    }

    fn push(&mut self, record: FeatureRecord) {
        if self.index.contains_key(&record.id) {
            debug!(id = %record.id, "Duplicate catalog id ignored");
            return;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    /// Feature type of every record
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Column headers in table order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the catalog has no features
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in table order
    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    /// Look up a record by id
    pub fn get(&self, id: &FeatureId) -> Option<&FeatureRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Distinct non-empty values of a column, in first-seen order
    pub fn distinct_values(&self, column: &str) -> Result<Vec<String>, CatalogError> {
        self.require_column(column)?;

        let mut seen = HashSet::new();
        Ok(self
            .records
            .iter()
            .filter_map(|r| r.attributes.get(column))
            .filter(|v| !v.is_empty())
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect())
    }

    /// Ids of every feature whose `column` equals `value`
    pub fn filter(&self, column: &str, value: &str) -> Result<Vec<FeatureId>, CatalogError> {
        self.require_column(column)?;

        Ok(self
            .records
            .iter()
            .filter(|r| r.attributes.get(column).map(String::as_str) == Some(value))
            .map(|r| r.id.clone())
            .collect())
    }

    fn require_column(&self, column: &str) -> Result<(), CatalogError> {
        if self.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(CatalogError::MissingColumn(column.to_string()))
        }
    }
}

impl FeatureCatalog for StaticCatalog {
    fn resolve(&self, ids: &[FeatureId]) -> CatalogResolution {
        let mut resolution = CatalogResolution::default();
        for id in ids {
            if self.index.contains_key(id) {
                resolution.resolved.push(id.clone());
            } else {
                resolution.unresolved.push(UnresolvedFeature {
                    id: id.clone(),
                    reason: format!("{} {} not found in catalog", self.feature_type, id),
                });
            }
        }
        resolution
    }
}

/// Pseudo-field some dBase readers report ahead of the real columns
const DBF_DELETION_FLAG: &str = "DeletionFlag";

/// Text form of a dBase cell; integral numbers lose their fraction
fn dbf_cell(value: dbase::FieldValue) -> String {
    use dbase::FieldValue;

    let number = |v: f64| {
        if v.fract() == 0.0 && v.abs() < 1e15 {
            format!("{v:.0}")
        } else {
            v.to_string()
        }
    };
    match value {
        FieldValue::Character(text) => text.map(|t| t.trim().to_string()).unwrap_or_default(),
        FieldValue::Numeric(v) => v.map(number).unwrap_or_default(),
        FieldValue::Float(v) => v.map(|v| number(f64::from(v))).unwrap_or_default(),
        FieldValue::Double(v) => number(v),
        FieldValue::Integer(v) => v.to_string(),
        other => format!("{other:?}"),
    }
}

/// DBF exports sometimes write integer ids as floats ("63470800171.0")
fn normalize_id_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            digits.to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Errors that can occur when working with catalogs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Column not present in the table
    #[error("column not found: {0}")]
    MissingColumn(String),

    /// Field names not accepted by the API
    #[error("unknown {feature_type} fields: {}", fields.join(", "))]
    UnknownFields {
        /// Feature type the fields were checked against
        feature_type: FeatureType,
        /// Unknown names
        fields: Vec<String>,
    },
}
