//! Catalog of fields the Hydrocron time-series endpoint accepts
//!
//! The list is embedded at compile time and parsed once on first use.

use super::CatalogError;
use crate::FeatureType;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashSet;

/// Embedded field list
const FIELDS_JSON: &str = include_str!("fields.json");

/// Column carrying the observation time in every response
pub const TIME_COLUMN: &str = "time_str";

/// Global field catalog (loaded once)
static FIELDS: Lazy<Result<FieldCatalog, CatalogError>> =
    Lazy::new(|| FieldCatalog::from_json(FIELDS_JSON));

#[derive(Debug, Deserialize)]
struct RawFieldCatalog {
    schema_version: String,
    reach: Vec<String>,
    node: Vec<String>,
}

/// Valid Hydrocron fields per feature type
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    schema_version: String,
    reach: Vec<String>,
    node: Vec<String>,
    reach_set: HashSet<String>,
    node_set: HashSet<String>,
}

impl FieldCatalog {
    /// Shared embedded catalog
    pub fn load() -> Result<&'static Self, &'static CatalogError> {
        FIELDS.as_ref()
    }

    /// Load the embedded catalog, returning an owned copy
    pub fn load_embedded() -> Result<Self, CatalogError> {
        Self::from_json(FIELDS_JSON)
    }

    fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: RawFieldCatalog = serde_json::from_str(json)
            .map_err(|e| CatalogError::ParseError(format!("Failed to parse field catalog: {e}")))?;

        Ok(Self {
            reach_set: raw.reach.iter().cloned().collect(),
            node_set: raw.node.iter().cloned().collect(),
            schema_version: raw.schema_version,
            reach: raw.reach,
            node: raw.node,
        })
    }

    /// Schema version of the embedded list
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// All fields for a feature type, in catalog order
    pub fn fields(&self, feature_type: FeatureType) -> &[String] {
        match feature_type {
            FeatureType::Reach => &self.reach,
            FeatureType::Node => &self.node,
        }
    }

    /// Whether `name` is a valid field for the feature type
    pub fn is_valid(&self, feature_type: FeatureType, name: &str) -> bool {
        match feature_type {
            FeatureType::Reach => self.reach_set.contains(name),
            FeatureType::Node => self.node_set.contains(name),
        }
    }

    /// Check every name, reporting all unknown fields at once
    pub fn validate<S: AsRef<str>>(
        &self,
        feature_type: FeatureType,
        names: &[S],
    ) -> Result<(), CatalogError> {
        let unknown: Vec<String> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.is_valid(feature_type, name))
            .map(str::to_string)
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::UnknownFields {
                feature_type,
                fields: unknown,
            })
        }
    }
}

/// Columns every request asks for regardless of the user's variables
pub fn key_columns(feature_type: FeatureType) -> [&'static str; 3] {
    [
        feature_type.id_column(),
        TIME_COLUMN,
        feature_type.quality_column(),
    ]
}

/// Whether a field is one of the key columns
pub fn is_key_column(feature_type: FeatureType, name: &str) -> bool {
    key_columns(feature_type).contains(&name)
}

/// Whether a field identifies a row (feature id, time) rather than measuring something
///
/// The quality column is a key column but still yields observations when
/// explicitly selected.
pub fn is_index_column(feature_type: FeatureType, name: &str) -> bool {
    name == feature_type.id_column() || name == TIME_COLUMN
}
