//! Date ranges and chunking
//!
//! Hydrocron accepts arbitrary `start_time`/`end_time` windows but large
//! windows produce large responses; long ranges are split into contiguous
//! calendar-day chunks of bounded span.

use super::RetrievalError;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format accepted on the command line and written to reports
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar-day range (UTC)
///
/// `start == end` is valid and covers a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RetrievalError> {
        if start > end {
            return Err(RetrievalError::InvalidRange(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covering a single day
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Parse `YYYY-MM-DD` start and end dates
    pub fn parse(start: &str, end: &str) -> Result<Self, RetrievalError> {
        let parse = |label: &str, value: &str| {
            NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
                RetrievalError::InvalidRange(format!(
                    "invalid {label} date '{value}' (expected YYYY-MM-DD): {e}"
                ))
            })
        };
        Self::new(parse("start", start)?, parse("end", end)?)
    }

    /// First day of the range
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range (inclusive)
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered
    pub fn span_days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// `start_time` query value (start of the first day)
    pub fn start_param(&self) -> String {
        format!("{}T00:00:00Z", self.start.format(DATE_FORMAT))
    }

    /// `end_time` query value (last second of the last day)
    pub fn end_param(&self) -> String {
        format!("{}T23:59:59Z", self.end.format(DATE_FORMAT))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// Splits a range into contiguous chunks of bounded span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeChunker {
    max_span_days: u32,
}

impl RangeChunker {
    /// Chunker with the given maximum span (must be at least one day)
    pub fn new(max_span_days: u32) -> Result<Self, RetrievalError> {
        if max_span_days == 0 {
            return Err(RetrievalError::InvalidRange(
                "maximum chunk span must be at least 1 day".to_string(),
            ));
        }
        Ok(Self { max_span_days })
    }

    /// Maximum span of one chunk in days
    pub fn max_span_days(&self) -> u32 {
        self.max_span_days
    }

    /// Split `range` greedily from its start
    ///
    /// Chunks are ordered, disjoint and contiguous; their union is `range`.
    /// Only the last chunk may be shorter than the maximum span.
    pub fn split(&self, range: DateRange) -> Vec<DateRange> {
        let step = Days::new(u64::from(self.max_span_days) - 1);
        let mut chunks = Vec::with_capacity(
            usize::try_from(range.span_days().div_ceil(u64::from(self.max_span_days)))
                .unwrap_or(0),
        );

        let mut cursor = range.start;
        loop {
            let chunk_end = cursor
                .checked_add_days(step)
                .map_or(range.end, |d| d.min(range.end));
            chunks.push(DateRange {
                start: cursor,
                end: chunk_end,
            });

            if chunk_end >= range.end {
                break;
            }
            match chunk_end.succ_opt() {
                Some(next) => cursor = next,
                None => break,
            }
        }

        chunks
    }
}

/// Validate raw dates and split them into chunks of at most `max_span_days`
pub fn split_range(
    start: NaiveDate,
    end: NaiveDate,
    max_span_days: u32,
) -> Result<Vec<DateRange>, RetrievalError> {
    let range = DateRange::new(start, end)?;
    Ok(RangeChunker::new(max_span_days)?.split(range))
}
