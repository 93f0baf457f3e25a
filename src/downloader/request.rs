//! Query descriptors: one Hydrocron request, fully specified

use super::range::DateRange;
use super::RetrievalError;
use crate::catalog::fields::{is_index_column, key_columns};
use crate::identifier::FeatureId;
use crate::FeatureType;
use std::collections::HashSet;
use std::sync::Arc;

/// Value of the `output` query parameter
pub const OUTPUT_FORMAT: &str = "csv";

/// Everything needed to issue one request for one page of one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    feature_id: FeatureId,
    feature_type: FeatureType,
    variables: Arc<[String]>,
    chunk: DateRange,
    cursor: Option<String>,
}

impl QueryDescriptor {
    /// Feature this request is for
    pub fn feature_id(&self) -> &FeatureId {
        &self.feature_id
    }

    /// SWORD feature type
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Variables in selection order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Date range covered by this request
    pub fn chunk(&self) -> DateRange {
        self.chunk
    }

    /// Continuation cursor, `None` for the first page
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Descriptor for the page following this one
    pub fn with_cursor(&self, cursor: impl Into<String>) -> Result<Self, RetrievalError> {
        RequestBuilder::build(
            self.feature_id.as_str(),
            self.feature_type,
            Arc::clone(&self.variables),
            self.chunk,
            Some(cursor.into()),
        )
    }

    /// Variables that produce observations (index columns excluded)
    pub fn observed_variables(&self) -> impl Iterator<Item = &str> {
        let feature_type = self.feature_type;
        self.variables
            .iter()
            .map(String::as_str)
            .filter(move |v| !is_index_column(feature_type, v))
    }

    /// Columns requested from Hydrocron: key columns first, then variables
    pub fn requested_fields(&self) -> Vec<&str> {
        let keys: [&str; 3] = key_columns(self.feature_type);
        let mut seen = HashSet::new();
        keys.into_iter()
            .chain(self.variables.iter().map(String::as_str))
            .filter(|f| seen.insert(*f))
            .collect()
    }

    /// Query parameters in a stable order
    pub fn query_params<'a>(&'a self, cursor_param: &'a str) -> Vec<(&'a str, String)> {
        let mut params = vec![
            ("feature", self.feature_type.as_query_value().to_string()),
            ("feature_id", self.feature_id.to_string()),
            ("start_time", self.chunk.start_param()),
            ("end_time", self.chunk.end_param()),
            ("output", OUTPUT_FORMAT.to_string()),
            ("fields", self.requested_fields().join(",")),
        ];
        if let Some(cursor) = &self.cursor {
            params.push((cursor_param, cursor.clone()));
        }
        params
    }
}

/// Builds validated [`QueryDescriptor`]s
pub struct RequestBuilder;

impl RequestBuilder {
    /// Build a descriptor
    ///
    /// Fails with [`RetrievalError::InvalidSelection`] for an empty or
    /// malformed feature id, an empty variable set, an empty variable name,
    /// or an empty cursor. Pure: identical inputs give identical descriptors.
    pub fn build(
        feature_id: &str,
        feature_type: FeatureType,
        variables: Arc<[String]>,
        chunk: DateRange,
        cursor: Option<String>,
    ) -> Result<QueryDescriptor, RetrievalError> {
        let feature_id = FeatureId::parse(feature_id)
            .map_err(|e| RetrievalError::InvalidSelection(e.to_string()))?;

        if variables.is_empty() {
            return Err(RetrievalError::InvalidSelection(
                "variable set cannot be empty".to_string(),
            ));
        }
        if variables.iter().any(|v| v.trim().is_empty()) {
            return Err(RetrievalError::InvalidSelection(
                "variable names cannot be empty".to_string(),
            ));
        }
        if matches!(&cursor, Some(c) if c.trim().is_empty()) {
            return Err(RetrievalError::InvalidSelection(
                "cursor cannot be empty".to_string(),
            ));
        }

        Ok(QueryDescriptor {
            feature_id,
            feature_type,
            variables,
            chunk,
            cursor,
        })
    }
}
