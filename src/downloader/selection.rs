//! User selection: which features, which variables, which dates

use super::range::DateRange;
use super::RetrievalError;
use crate::catalog::fields::{is_index_column, FieldCatalog};
use crate::identifier::FeatureId;
use crate::FeatureType;
use std::collections::HashSet;
use std::sync::Arc;

/// Validated retrieval selection
///
/// Identifiers and variables keep their first-seen order with duplicates
/// removed. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    feature_type: FeatureType,
    feature_ids: Vec<FeatureId>,
    variables: Arc<[String]>,
    range: DateRange,
}

impl Selection {
    /// Build a selection from raw identifier and variable strings
    ///
    /// Fails with [`RetrievalError::InvalidSelection`] when no ids or
    /// variables are given, an id is malformed, a variable is not a known
    /// Hydrocron field for `feature_type`, or only index columns
    /// (`reach_id`/`node_id`, `time_str`) were selected.
    pub fn new(
        feature_type: FeatureType,
        feature_ids: Vec<String>,
        variables: Vec<String>,
        range: DateRange,
    ) -> Result<Self, RetrievalError> {
        let mut ids = Vec::with_capacity(feature_ids.len());
        let mut invalid = Vec::new();
        for raw in &feature_ids {
            match FeatureId::parse(raw) {
                Ok(id) => ids.push(id),
                Err(e) => invalid.push(e.to_string()),
            }
        }
        if !invalid.is_empty() {
            return Err(RetrievalError::InvalidSelection(invalid.join("; ")));
        }

        Self::from_ids(feature_type, ids, variables, range)
    }

    /// Build a selection from already-parsed identifiers
    pub fn from_ids(
        feature_type: FeatureType,
        feature_ids: Vec<FeatureId>,
        variables: Vec<String>,
        range: DateRange,
    ) -> Result<Self, RetrievalError> {
        let feature_ids = dedup(feature_ids);
        if feature_ids.is_empty() {
            return Err(RetrievalError::InvalidSelection(
                "at least one feature id is required".to_string(),
            ));
        }

        let variables = dedup(
            variables
                .into_iter()
                .map(|v| v.trim().to_string())
                .collect(),
        );
        if variables.is_empty() || variables.iter().any(String::is_empty) {
            return Err(RetrievalError::InvalidSelection(
                "at least one non-empty variable is required".to_string(),
            ));
        }

        let fields = FieldCatalog::load()
            .map_err(|e| RetrievalError::InvalidSelection(e.to_string()))?;
        fields
            .validate(feature_type, &variables)
            .map_err(|e| RetrievalError::InvalidSelection(e.to_string()))?;

        if variables.iter().all(|v| is_index_column(feature_type, v)) {
            return Err(RetrievalError::InvalidSelection(format!(
                "no measured variable selected (only {} given)",
                variables.join(", ")
            )));
        }

        Ok(Self {
            feature_type,
            feature_ids,
            variables: variables.into(),
            range,
        })
    }

    /// Feature type of every id
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Identifiers in selection order
    pub fn feature_ids(&self) -> &[FeatureId] {
        &self.feature_ids
    }

    /// Variables in selection order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Shared handle to the variable list
    pub fn shared_variables(&self) -> Arc<[String]> {
        Arc::clone(&self.variables)
    }

    /// Requested date range
    pub fn range(&self) -> DateRange {
        self.range
    }
}

fn dedup<T: Clone + Eq + std::hash::Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
