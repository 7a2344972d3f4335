use crate::models::{FilterCriteria, RawObservation, StationMetadata};
use serde::Serialize;
use std::fmt;

/// Why a row was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    Element,
    Network,
    OutsideRoi,
    OutsideDateRange,
    QualityFlag,
    MeasurementFlag,
    MissingValue,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Rejection::Element => "other element",
            Rejection::Network => "excluded network",
            Rejection::OutsideRoi => "outside ROI",
            Rejection::OutsideDateRange => "outside date range",
            Rejection::QualityFlag => "failed QC flag",
            Rejection::MeasurementFlag => "measurement flag not allowed",
            Rejection::MissingValue => "missing value",
        };
        f.write_str(label)
    }
}

/// Per-reason rejection tallies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub element: usize,
    pub network: usize,
    pub outside_roi: usize,
    pub outside_date_range: usize,
    pub quality_flag: usize,
    pub measurement_flag: usize,
    pub missing_value: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, rejection: Rejection) {
        let slot = match rejection {
            Rejection::Element => &mut self.element,
            Rejection::Network => &mut self.network,
            Rejection::OutsideRoi => &mut self.outside_roi,
            Rejection::OutsideDateRange => &mut self.outside_date_range,
            Rejection::QualityFlag => &mut self.quality_flag,
            Rejection::MeasurementFlag => &mut self.measurement_flag,
            Rejection::MissingValue => &mut self.missing_value,
        };
        *slot += 1;
    }

    pub fn merge(&mut self, other: &RejectionCounts) {
        self.element += other.element;
        self.network += other.network;
        self.outside_roi += other.outside_roi;
        self.outside_date_range += other.outside_date_range;
        self.quality_flag += other.quality_flag;
        self.measurement_flag += other.measurement_flag;
        self.missing_value += other.missing_value;
    }

    pub fn total(&self) -> usize {
        self.element
            + self.network
            + self.outside_roi
            + self.outside_date_range
            + self.quality_flag
            + self.measurement_flag
            + self.missing_value
    }
}

/// Station-level checks (network prefix, ROI); every row of a rejected station is rejected
pub fn station_rejection(station: &StationMetadata, criteria: &FilterCriteria) -> Option<Rejection> {
    if criteria.is_excluded_station(&station.station_id) {
        return Some(Rejection::Network);
    }
    if let Some(roi) = &criteria.roi {
        if !station.is_within(roi) {
            return Some(Rejection::OutsideRoi);
        }
    }
    None
}

fn flag_passes(flag: Option<char>, allowed: &std::collections::BTreeSet<char>) -> bool {
    match flag {
        None => true,
        Some(c) => allowed.contains(&c),
    }
}

/// Full admission decision, cheapest checks first
pub fn evaluate(
    row: &RawObservation,
    station: &StationMetadata,
    criteria: &FilterCriteria,
) -> Option<Rejection> {
    if row.element != criteria.target_element {
        return Some(Rejection::Element);
    }

    if let Some(rejection) = station_rejection(station, criteria) {
        return Some(rejection);
    }

    if let Some(range) = &criteria.date_range {
        if !range.contains(row.date) {
            return Some(Rejection::OutsideDateRange);
        }
    }

    // A blank qflag means no QC check failed
    if criteria.checks_qflags() && !flag_passes(row.qflag, &criteria.allowed_qflags) {
        return Some(Rejection::QualityFlag);
    }

    if !criteria.allowed_mflags.is_empty() && !flag_passes(row.mflag, &criteria.allowed_mflags) {
        return Some(Rejection::MeasurementFlag);
    }

    if row.is_missing() {
        return Some(Rejection::MissingValue);
    }

    None
}

pub fn admit(row: &RawObservation, station: &StationMetadata, criteria: &FilterCriteria) -> bool {
    evaluate(row, station, criteria).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use crate::utils::constants::MISSING_VALUE;
    use chrono::{Duration, NaiveDate};

    fn station(id: &str, lat: f64, lon: f64) -> StationMetadata {
        StationMetadata::new(id.to_string(), lat, lon, None, "Somewhere".to_string())
    }

    fn row(id: &str, date: NaiveDate, element: &str, value: i32) -> RawObservation {
        RawObservation {
            station_id: id.to_string(),
            date,
            element: element.to_string(),
            value,
            mflag: None,
            qflag: None,
            sflag: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_other_elements_always_rejected() {
        let station = station("USC00012345", 40.0, -75.0);
        let criteria = FilterCriteria::new();

        for element in ["TMAX", "TMIN", "SNOW", "SNWD", "prcp", ""] {
            for value in [0, 25, MISSING_VALUE] {
                for qflag in [None, Some('D'), Some('X')] {
                    let mut r = row("USC00012345", date(2020, 1, 1), element, value);
                    r.qflag = qflag;
                    assert_eq!(evaluate(&r, &station, &criteria), Some(Rejection::Element));
                    assert!(!admit(&r, &station, &criteria));
                }
            }
        }
    }

    #[test]
    fn test_missing_value_rejected() {
        let station = station("USC00012345", 40.0, -75.0);
        let criteria = FilterCriteria::new();

        assert!(admit(&row("USC00012345", date(2020, 1, 1), "PRCP", 25), &station, &criteria));
        assert_eq!(
            evaluate(&row("USC00012345", date(2020, 1, 2), "PRCP", MISSING_VALUE), &station, &criteria),
            Some(Rejection::MissingValue)
        );
    }

    #[test]
    fn test_network_exclusion_overrides_everything() {
        let station = station("US1AZMR0001", 33.0, -112.0);
        let criteria = FilterCriteria::new()
            .with_excluded_prefix("US1")
            .with_roi(BoundingBox::new(30.0, 38.0, -116.0, -107.0));

        let r = row("US1AZMR0001", date(2020, 6, 1), "PRCP", 10);
        assert_eq!(evaluate(&r, &station, &criteria), Some(Rejection::Network));

        let official = self::station("USC00021234", 33.0, -112.0);
        let r = row("USC00021234", date(2020, 6, 1), "PRCP", 10);
        assert!(admit(&r, &official, &criteria));
    }

    #[test]
    fn test_admitted_rows_respect_roi() {
        let roi = BoundingBox::new(30.0, 38.0, -116.0, -107.0);
        let criteria = FilterCriteria::new().with_roi(roi);

        let mut admitted = 0;
        for lat_step in 0..=40 {
            for lon_step in 0..=40 {
                let lat = 25.0 + lat_step as f64 * 0.375;
                let lon = -120.0 + lon_step as f64 * 0.4;
                let station = station("USC00000001", lat, lon);
                let r = row("USC00000001", date(2020, 1, 1), "PRCP", 5);
                if admit(&r, &station, &criteria) {
                    admitted += 1;
                    assert!(roi.lat_min <= lat && lat <= roi.lat_max);
                    assert!(roi.lon_min <= lon && lon <= roi.lon_max);
                } else {
                    assert!(!roi.contains(lat, lon));
                }
            }
        }
        assert!(admitted > 0);
    }

    #[test]
    fn test_admitted_rows_respect_date_range() {
        let start = date(2010, 1, 1);
        let end = date(2010, 3, 31);
        let criteria = FilterCriteria::new().with_date_range(start, end);
        let station = station("USC00000001", 33.0, -112.0);

        let first = date(2009, 11, 1);
        for offset in 0..240 {
            let day = first + Duration::days(offset);
            let r = row("USC00000001", day, "PRCP", 3);
            assert_eq!(admit(&r, &station, &criteria), start <= day && day <= end);
        }
    }

    #[test]
    fn test_qflag_policy() {
        let station = station("USC00000001", 33.0, -112.0);
        let mut flagged = row("USC00000001", date(2020, 1, 1), "PRCP", 3);
        flagged.qflag = Some('D');
        let clean = row("USC00000001", date(2020, 1, 1), "PRCP", 3);

        // No QC configured: flagged rows pass
        assert!(admit(&flagged, &station, &FilterCriteria::new()));

        // Allow-list: blank and listed flags pass
        let criteria = FilterCriteria::new().with_allowed_qflags(['G']);
        assert_eq!(evaluate(&flagged, &station, &criteria), Some(Rejection::QualityFlag));
        assert!(admit(&clean, &station, &criteria));
        flagged.qflag = Some('G');
        assert!(admit(&flagged, &station, &criteria));

        // Strict QC without an allow-list rejects any flag
        let strict = FilterCriteria::new().with_reject_flagged(true);
        assert!(!admit(&flagged, &station, &strict));
        assert!(admit(&clean, &station, &strict));
    }

    #[test]
    fn test_mflag_allow_list() {
        let station = station("USC00000001", 33.0, -112.0);
        let criteria = FilterCriteria::new().with_allowed_mflags(['B', 'N', 'S', 'T']);

        let mut r = row("USC00000001", date(2020, 1, 1), "PRCP", 0);
        assert!(admit(&r, &station, &criteria));
        r.mflag = Some('T');
        assert!(admit(&r, &station, &criteria));
        r.mflag = Some('P');
        assert_eq!(evaluate(&r, &station, &criteria), Some(Rejection::MeasurementFlag));
    }

    #[test]
    fn test_rejection_counts() {
        let mut counts = RejectionCounts::default();
        counts.record(Rejection::Element);
        counts.record(Rejection::Element);
        counts.record(Rejection::MissingValue);

        let mut total = RejectionCounts::default();
        total.merge(&counts);
        total.merge(&counts);

        assert_eq!(total.element, 4);
        assert_eq!(total.missing_value, 2);
        assert_eq!(total.total(), 6);
    }

    #[test]
    fn test_station_rejection() {
        let criteria = FilterCriteria::new()
            .with_excluded_prefix("US1")
            .with_roi(BoundingBox::new(30.0, 38.0, -116.0, -107.0));

        assert_eq!(station_rejection(&station("US1AZ000001", 33.0, -112.0), &criteria), Some(Rejection::Network));
        assert_eq!(station_rejection(&station("USC00000001", 45.0, -112.0), &criteria), Some(Rejection::OutsideRoi));
        assert_eq!(station_rejection(&station("MXN00000001", 31.0, -110.0), &criteria), None);
    }
}
