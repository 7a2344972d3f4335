use crate::error::{ProcessingError, Result};
use crate::utils::constants::{DEFAULT_ELEMENT, ELEMENT_FAMILIES, KNOWN_ELEMENTS};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Inclusive latitude/longitude region of interest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&latitude)
            && (self.lon_min..=self.lon_max).contains(&longitude)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.lat_min, self.lat_max, self.lon_min, self.lon_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ProcessingError::Config(format!(
                "ROI bounds must be finite numbers: {}",
                self
            )));
        }
        if self.lat_min > self.lat_max {
            return Err(ProcessingError::Config(format!(
                "ROI latitude minimum {} is greater than maximum {}",
                self.lat_min, self.lat_max
            )));
        }
        if self.lon_min > self.lon_max {
            return Err(ProcessingError::Config(format!(
                "ROI longitude minimum {} is greater than maximum {}",
                self.lon_min, self.lon_max
            )));
        }
        if self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err(ProcessingError::Config(format!(
                "ROI latitude must lie within [-90, 90]: {}",
                self
            )));
        }
        if self.lon_min < -180.0 || self.lon_max > 180.0 {
            return Err(ProcessingError::Config(format!(
                "ROI longitude must lie within [-180, 180]: {}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat [{}, {}], lon [{}, {}]",
            self.lat_min, self.lat_max, self.lon_min, self.lon_max
        )
    }
}

/// Parses `LAT_MIN,LAT_MAX,LON_MIN,LON_MAX`
impl FromStr for BoundingBox {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim().parse::<f64>().map_err(|_| {
                    ProcessingError::Config(format!("Invalid ROI bound '{}' in '{}'", part, s))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        match values.as_slice() {
            [lat_min, lat_max, lon_min, lon_max] => {
                Ok(Self::new(*lat_min, *lat_max, *lon_min, *lon_max))
            }
            _ => Err(ProcessingError::Config(format!(
                "ROI needs four values LAT_MIN,LAT_MAX,LON_MIN,LON_MAX, got '{}'",
                s
            ))),
        }
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Range with optional ends; an open end extends to the calendar limit
    pub fn open(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Self> {
        if start.is_none() && end.is_none() {
            return None;
        }
        Some(Self::new(
            start.unwrap_or(NaiveDate::MIN),
            end.unwrap_or(NaiveDate::MAX),
        ))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(ProcessingError::Config(format!(
                "Date range start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Row admission policy, validated once and shared read-only with all workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub roi: Option<BoundingBox>,

    pub date_range: Option<DateRange>,

    /// Non-empty qflags allowed through QC; empty means no QC rejection
    pub allowed_qflags: BTreeSet<char>,

    /// Reject every non-empty qflag that is not explicitly allowed
    pub reject_flagged: bool,

    /// Non-empty mflags allowed through; empty means no mflag rejection
    pub allowed_mflags: BTreeSet<char>,

    /// Measurement flags whose values are reported as zero (trace amounts)
    pub trace_mflags: BTreeSet<char>,

    pub excluded_network_prefixes: Vec<String>,

    pub target_element: String,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            roi: None,
            date_range: None,
            allowed_qflags: BTreeSet::new(),
            reject_flagged: false,
            allowed_mflags: BTreeSet::new(),
            trace_mflags: BTreeSet::new(),
            excluded_network_prefixes: Vec::new(),
            target_element: DEFAULT_ELEMENT.to_string(),
        }
    }
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roi(mut self, roi: BoundingBox) -> Self {
        self.roi = Some(roi);
        self
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_allowed_qflags<I: IntoIterator<Item = char>>(mut self, flags: I) -> Self {
        self.allowed_qflags = flags.into_iter().collect();
        self
    }

    pub fn with_reject_flagged(mut self, reject_flagged: bool) -> Self {
        self.reject_flagged = reject_flagged;
        self
    }

    pub fn with_allowed_mflags<I: IntoIterator<Item = char>>(mut self, flags: I) -> Self {
        self.allowed_mflags = flags.into_iter().collect();
        self
    }

    pub fn with_trace_mflags<I: IntoIterator<Item = char>>(mut self, flags: I) -> Self {
        self.trace_mflags = flags.into_iter().collect();
        self
    }

    pub fn with_excluded_prefix(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim();
        if !self.excluded_network_prefixes.iter().any(|p| p == prefix) {
            self.excluded_network_prefixes.push(prefix.to_string());
        }
        self
    }

    pub fn with_target_element(mut self, element: &str) -> Self {
        self.target_element = element.trim().to_uppercase();
        self
    }

    /// True when QC flags are checked at all
    pub fn checks_qflags(&self) -> bool {
        self.reject_flagged || !self.allowed_qflags.is_empty()
    }

    pub fn is_excluded_station(&self, station_id: &str) -> bool {
        self.excluded_network_prefixes
            .iter()
            .any(|prefix| station_id.starts_with(prefix.as_str()))
    }

    /// Reject self-contradictory criteria before any file is read
    pub fn validate(&self) -> Result<()> {
        if let Some(roi) = &self.roi {
            roi.validate()?;
        }
        if let Some(range) = &self.date_range {
            range.validate()?;
        }
        if !is_known_element(&self.target_element) {
            return Err(ProcessingError::Config(format!(
                "Unknown target element '{}'",
                self.target_element
            )));
        }
        if self
            .excluded_network_prefixes
            .iter()
            .any(|p| p.trim().is_empty())
        {
            return Err(ProcessingError::Config(
                "Excluded network prefixes must not be empty".to_string(),
            ));
        }
        // Station ids never contain whitespace, so a padded prefix would match nothing
        if let Some(p) = self
            .excluded_network_prefixes
            .iter()
            .find(|p| p.trim() != p.as_str())
        {
            return Err(ProcessingError::Config(format!(
                "Excluded network prefix '{}' has surrounding whitespace",
                p
            )));
        }
        let blank_flag = self
            .allowed_qflags
            .iter()
            .chain(&self.allowed_mflags)
            .chain(&self.trace_mflags)
            .any(|c| c.is_whitespace());
        if blank_flag {
            return Err(ProcessingError::Config(
                "Flag sets list non-empty flags only; a blank flag always passes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accepts the documented GHCN-Daily element codes
pub fn is_known_element(code: &str) -> bool {
    if code.len() != 4 || !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return false;
    }
    KNOWN_ELEMENTS.contains(&code) || ELEMENT_FAMILIES.iter().any(|f| code.starts_with(f))
}

/// Parse a comma-separated flag list such as `"B,N,S,T"`
pub fn parse_flag_set(s: &str) -> Result<BTreeSet<char>> {
    let mut flags = BTreeSet::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut chars = part.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                flags.insert(c);
            }
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Flags are single characters, got '{}'",
                    part
                )))
            }
        }
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bounding_box_inclusive() {
        let roi = BoundingBox::new(30.0, 38.0, -116.0, -107.0);
        assert!(roi.contains(30.0, -116.0));
        assert!(roi.contains(38.0, -107.0));
        assert!(!roi.contains(29.999, -110.0));
        assert!(!roi.contains(33.0, -106.5));
    }

    #[test]
    fn test_bounding_box_from_str() {
        let roi: BoundingBox = "30, 38, -115.5, -108".parse().unwrap();
        assert_eq!(roi, BoundingBox::new(30.0, 38.0, -115.5, -108.0));
        assert!("30,38,-115".parse::<BoundingBox>().is_err());
        assert!("30,north,-115,-108".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn test_inverted_roi_is_config_error() {
        let criteria = FilterCriteria::new().with_roi(BoundingBox::new(38.0, 30.0, -116.0, -107.0));
        assert!(matches!(criteria.validate(), Err(ProcessingError::Config(_))));

        let criteria = FilterCriteria::new().with_roi(BoundingBox::new(30.0, 38.0, -100.0, -107.0));
        assert!(criteria.validate().is_err());

        let criteria = FilterCriteria::new().with_roi(BoundingBox::new(-95.0, 38.0, -116.0, -107.0));
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn test_inverted_date_range_is_config_error() {
        let criteria = FilterCriteria::new().with_date_range(date(2024, 12, 31), date(2010, 1, 1));
        assert!(matches!(criteria.validate(), Err(ProcessingError::Config(_))));
    }

    #[test]
    fn test_open_date_range() {
        assert!(DateRange::open(None, None).is_none());

        let range = DateRange::open(Some(date(2010, 1, 1)), None).unwrap();
        assert!(range.contains(date(2099, 1, 1)));
        assert!(!range.contains(date(2009, 12, 31)));
    }

    #[test]
    fn test_unknown_element_is_config_error() {
        assert!(FilterCriteria::new().validate().is_ok());
        assert!(FilterCriteria::new().with_target_element("tmax").validate().is_ok());
        assert!(FilterCriteria::new().with_target_element("WT03").validate().is_ok());
        assert!(FilterCriteria::new().with_target_element("RAIN").validate().is_err());
        assert!(FilterCriteria::new().with_target_element("").validate().is_err());
    }

    #[test]
    fn test_empty_prefix_is_config_error() {
        let criteria = FilterCriteria::new().with_excluded_prefix(" ");
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn test_padded_prefix_is_trimmed_or_rejected() {
        let criteria = FilterCriteria::new().with_excluded_prefix(" US1 ");
        assert_eq!(criteria.excluded_network_prefixes, vec!["US1".to_string()]);
        assert!(criteria.is_excluded_station("US1AZMR0001"));
        assert!(criteria.validate().is_ok());

        // Prefixes deserialized from a config file bypass the builder
        let mut loaded = FilterCriteria::new();
        loaded.excluded_network_prefixes = vec![" US1".to_string()];
        assert!(loaded.validate().is_err());
    }

    #[test]
    fn test_excluded_station() {
        let criteria = FilterCriteria::new()
            .with_excluded_prefix("US1")
            .with_excluded_prefix("US1");
        assert_eq!(criteria.excluded_network_prefixes.len(), 1);
        assert!(criteria.is_excluded_station("US1AZMR0001"));
        assert!(!criteria.is_excluded_station("USC00012345"));
    }

    #[test]
    fn test_parse_flag_set() {
        let flags = parse_flag_set("B, N,S,T,").unwrap();
        assert_eq!(flags.into_iter().collect::<String>(), "BNST");
        assert!(parse_flag_set("").unwrap().is_empty());
        assert!(parse_flag_set("BN").is_err());
    }

    #[test]
    fn test_checks_qflags() {
        assert!(!FilterCriteria::new().checks_qflags());
        assert!(FilterCriteria::new().with_reject_flagged(true).checks_qflags());
        assert!(FilterCriteria::new().with_allowed_qflags(['D']).checks_qflags());
    }
}
