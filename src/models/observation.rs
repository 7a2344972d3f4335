use crate::error::{ProcessingError, Result};
use crate::utils::constants::MISSING_VALUE;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One parsed line of a station file, consumed by the record filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    pub station_id: String,
    pub date: NaiveDate,
    pub element: String,
    pub value: i32,
    pub mflag: Option<char>,
    pub qflag: Option<char>,
    pub sflag: Option<char>,
}

impl RawObservation {
    pub fn is_missing(&self) -> bool {
        self.value == MISSING_VALUE
    }

    /// Drop the element field once the row is admitted
    pub fn into_filtered(self) -> FilteredRecord {
        FilteredRecord {
            station_id: self.station_id,
            date: self.date,
            value: self.value,
            mflag: self.mflag,
            qflag: self.qflag,
            sflag: self.sflag,
        }
    }
}

/// An admitted observation of the target element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilteredRecord {
    pub station_id: String,
    pub date: NaiveDate,
    pub value: i32,
    pub mflag: Option<char>,
    pub qflag: Option<char>,
    pub sflag: Option<char>,
}

impl FilteredRecord {
    pub fn new(station_id: &str, date: NaiveDate, value: i32) -> Self {
        Self {
            station_id: station_id.to_string(),
            date,
            value,
            mflag: None,
            qflag: None,
            sflag: None,
        }
    }

    pub fn with_flags(mut self, mflag: Option<char>, qflag: Option<char>, sflag: Option<char>) -> Self {
        self.mflag = mflag;
        self.qflag = qflag;
        self.sflag = sflag;
        self
    }
}

/// Parse a single-character flag; blank means no flag
pub fn parse_flag(s: &str) -> Result<Option<char>> {
    let trimmed = s.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(None),
        (Some(c), None) => Ok(Some(c)),
        _ => Err(ProcessingError::InvalidFormat(format!(
            "Flag must be a single character: '{}'",
            s
        ))),
    }
}

/// Parse `YYYYMMDD` (by-station files) or `YYYY-MM-DD` (daily summaries)
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    let format = if trimmed.contains('-') {
        "%Y-%m-%d"
    } else {
        "%Y%m%d"
    };
    NaiveDate::parse_from_str(trimmed, format)
        .map_err(|_| ProcessingError::InvalidFormat(format!("Invalid date: '{}'", s)))
}

/// Parse an integer data value; a blank cell is the missing sentinel
pub fn parse_value(s: &str) -> Result<i32> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(MISSING_VALUE);
    }
    trimmed
        .parse::<i32>()
        .map_err(|_| ProcessingError::InvalidFormat(format!("Invalid data value: '{}'", s)))
}
