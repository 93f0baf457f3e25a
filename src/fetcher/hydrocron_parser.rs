//! Hydrocron response parser
//!
//! Stateless parsing of the time-series response: a JSON envelope whose
//! `results.csv` member carries one CSV row per observation time. Each row
//! expands into one [`Observation`] per requested variable.

use super::{FetcherError, FetcherResult, Page};
use crate::catalog::fields::TIME_COLUMN;
use crate::downloader::QueryDescriptor;
use crate::{Observation, ObservationValue};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Naive timestamp layouts accepted when `time_str` carries no offset
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Stateless parser for Hydrocron responses
pub struct HydrocronParser;

impl HydrocronParser {
    /// Parse a 2xx response body into a page
    ///
    /// # Arguments
    /// * `body` - Raw response body
    /// * `descriptor` - Request the body answers
    /// * `cursor_field` - Envelope member carrying the next-page cursor
    ///
    /// # Errors
    /// Returns `FetcherError::ParseError` if the body is not a JSON object,
    /// has no `results.csv` string, or the CSV lacks a required column.
    pub fn parse_response(
        body: &str,
        descriptor: &QueryDescriptor,
        cursor_field: &str,
    ) -> FetcherResult<Page> {
        let envelope: Value = serde_json::from_str(body)
            .map_err(|e| FetcherError::ParseError(format!("response is not valid JSON: {e}")))?;

        let object = envelope
            .as_object()
            .ok_or_else(|| FetcherError::ParseError("response is not a JSON object".to_string()))?;

        let csv_text = object
            .get("results")
            .and_then(|results| results.get("csv"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                let detail = object
                    .get("error")
                    .and_then(Value::as_str)
                    .map(|e| format!(" (server said: {e})"))
                    .unwrap_or_default();
                FetcherError::ParseError(format!("response has no results.csv member{detail}"))
            })?;

        let rows = Self::parse_csv(csv_text, descriptor)?;
        let next_cursor = object.get(cursor_field).and_then(Self::parse_cursor);

        Ok(Page { rows, next_cursor })
    }

    /// Parse the CSV text of a response into observations
    ///
    /// Rows whose `time_str` is missing or unparseable are dropped.
    pub fn parse_csv(csv_text: &str, descriptor: &QueryDescriptor) -> FetcherResult<Vec<Observation>> {
        if csv_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(csv_text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| FetcherError::ParseError(format!("invalid CSV header: {e}")))?
            .clone();
        let columns: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(index, name)| (name, index))
            .collect();

        let time_index = *columns
            .get(TIME_COLUMN)
            .ok_or_else(|| FetcherError::ParseError(format!("CSV has no '{TIME_COLUMN}' column")))?;
        let quality_index = columns.get(descriptor.feature_type().quality_column()).copied();

        let mut variables = Vec::new();
        let mut missing = Vec::new();
        for variable in descriptor.observed_variables() {
            match columns.get(variable) {
                Some(index) => variables.push((variable, *index)),
                None => missing.push(variable),
            }
        }
        if !missing.is_empty() {
            return Err(FetcherError::ParseError(format!(
                "CSV is missing requested column(s): {}",
                missing.join(", ")
            )));
        }

        let feature_id = descriptor.feature_id().as_str();
        let mut observations = Vec::new();
        let mut dropped = 0usize;

        for (line, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| FetcherError::ParseError(format!("invalid CSV row {}: {e}", line + 2)))?;

            let Some(timestamp) = record.get(time_index).and_then(Self::parse_timestamp) else {
                dropped += 1;
                continue;
            };
            let quality = quality_index
                .and_then(|index| record.get(index))
                .and_then(Self::parse_quality);

            for (variable, index) in &variables {
                let value = record
                    .get(*index)
                    .map(ObservationValue::from_cell)
                    .unwrap_or(ObservationValue::Missing);
                observations.push(Observation {
                    feature_id: feature_id.to_string(),
                    variable: (*variable).to_string(),
                    timestamp,
                    value,
                    quality,
                });
            }
        }

        if dropped > 0 {
            debug!(
                feature_id = feature_id,
                dropped = dropped,
                "Dropped rows without a valid time_str"
            );
        }

        Ok(observations)
    }

    /// Parse a `time_str` cell
    ///
    /// RFC 3339 values keep their offset (converted to UTC); naive values are
    /// taken as UTC. `no_data` and empty cells give `None`.
    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("no_data") {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Summary quality flag: integral 0..=3, anything else is `None`
    fn parse_quality(raw: &str) -> Option<u8> {
        let value = raw.trim().parse::<f64>().ok()?;
        if value.fract() == 0.0 && (0.0..=3.0).contains(&value) {
            Some(value as u8)
        } else {
            None
        }
    }

    fn parse_cursor(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
