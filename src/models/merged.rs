use crate::models::{FilteredRecord, StationMetadata};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A filtered observation joined with its station's metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub station_id: String,
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub value: i32,
    pub mflag: Option<char>,
    pub qflag: Option<char>,
    pub sflag: Option<char>,
}

impl MergedRecord {
    pub fn join(record: FilteredRecord, station: &StationMetadata) -> Self {
        Self {
            station_id: record.station_id,
            date: record.date,
            latitude: station.latitude,
            longitude: station.longitude,
            name: station.name.clone(),
            value: record.value,
            mflag: record.mflag,
            qflag: record.qflag,
            sflag: record.sflag,
        }
    }
}

/// Summary statistics over the value column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueStats {
    pub count: usize,
    pub mean: f64,
    pub min: i32,
    pub max: i32,
}

/// Final table ordered by (station_id, date)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedTable {
    rows: Vec<MergedRecord>,
}

impl MergedTable {
    pub(crate) fn from_sorted(rows: Vec<MergedRecord>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[MergedRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergedRecord> {
        self.rows.iter()
    }

    pub fn station_ids(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.station_id.as_str()).collect()
    }

    pub fn station_count(&self) -> usize {
        self.station_ids().len()
    }

    pub fn value_stats(&self) -> Option<ValueStats> {
        let first = self.rows.first()?;
        let mut min = first.value;
        let mut max = first.value;
        let mut sum = 0i64;
        for row in &self.rows {
            min = min.min(row.value);
            max = max.max(row.value);
            sum += i64::from(row.value);
        }
        Some(ValueStats {
            count: self.rows.len(),
            mean: sum as f64 / self.rows.len() as f64,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(station_id: &str, day: u32, value: i32) -> MergedRecord {
        let station = StationMetadata::new(station_id.to_string(), 40.0, -75.0, None, "S".to_string());
        let date = NaiveDate::from_ymd_opt(2020, 1, day).unwrap();
        MergedRecord::join(FilteredRecord::new(station_id, date, value), &station)
    }

    #[test]
    fn test_value_stats() {
        let table = MergedTable::from_sorted(vec![row("A", 1, 0), row("A", 2, 30), row("B", 1, 60)]);
        let stats = table.value_stats().unwrap();

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 0);
        assert_eq!(stats.max, 60);
        assert!((stats.mean - 30.0).abs() < f64::EPSILON);
        assert_eq!(table.station_count(), 2);
    }

    #[test]
    fn test_empty_table_has_no_stats() {
        assert!(MergedTable::default().value_stats().is_none());
    }
}
