use crate::models::{MergedTable, ValueStats};
use crate::readers::RowStats;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// File could not be opened or read
    Io,
    /// File has no usable header or station id
    Format,
    /// No metadata for the station id
    Lookup,
    /// Unit never started because the run was cancelled or timed out
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Io => "I/O error",
            FailureKind::Format => "format error",
            FailureKind::Lookup => "no metadata",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A station file that contributed nothing because of an error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationFailure {
    pub archive: String,
    pub station_id: Option<String>,
    pub path: PathBuf,
    pub kind: FailureKind,
    pub reason: String,
}

impl StationFailure {
    pub fn new(
        archive: &str,
        station_id: Option<&str>,
        path: PathBuf,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            archive: archive.to_string(),
            station_id: station_id.map(str::to_string),
            path,
            kind,
            reason: reason.into(),
        }
    }
}

/// Aggregated outcome of a run: row- and station-scoped problems never abort it
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub archives: usize,
    pub files_found: usize,
    pub stations_indexed: usize,
    pub metadata_conflicts: usize,
    pub stations_excluded_by_network: usize,
    pub stations_outside_roi: usize,
    pub stations_dispatched: usize,
    pub stations_with_records: usize,
    pub rows: RowStats,
    pub duplicates_removed: usize,
    pub unmatched_rows_dropped: usize,
    pub output_rows: usize,
    pub output_stations: usize,
    pub value_stats: Option<ValueStats>,
    pub failures: Vec<StationFailure>,
    pub timed_out: bool,
}

impl RunSummary {
    pub fn record_output(&mut self, table: &MergedTable) {
        self.output_rows = table.len();
        self.output_stations = table.station_count();
        self.value_stats = table.value_stats();
    }

    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    /// Human-readable report, printed after each run
    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Run Summary:\n");
        summary.push_str(&format!(
            "  Archives: {}, station files: {}, indexed stations: {}\n",
            self.archives, self.files_found, self.stations_indexed
        ));
        if self.metadata_conflicts > 0 {
            summary.push_str(&format!(
                "  Conflicting metadata definitions: {}\n",
                self.metadata_conflicts
            ));
        }
        summary.push_str(&format!(
            "  Stations skipped: {} excluded network, {} outside ROI, {} without metadata\n",
            self.stations_excluded_by_network,
            self.stations_outside_roi,
            self.failures_of(FailureKind::Lookup)
        ));
        summary.push_str(&format!(
            "  Stations read: {} ({} with records)\n",
            self.stations_dispatched, self.stations_with_records
        ));

        summary.push_str(&format!(
            "  Rows: {} read, {} admitted, {} malformed\n",
            self.rows.rows_read, self.rows.admitted, self.rows.malformed
        ));
        let rejected = &self.rows.rejected;
        if rejected.total() > 0 {
            summary.push_str(&format!(
                "  Rejected rows: element={}, network={}, roi={}, date={}, qflag={}, mflag={}, missing={}\n",
                rejected.element,
                rejected.network,
                rejected.outside_roi,
                rejected.outside_date_range,
                rejected.quality_flag,
                rejected.measurement_flag,
                rejected.missing_value
            ));
        }
        if self.duplicates_removed > 0 {
            summary.push_str(&format!(
                "  Duplicate rows removed: {}\n",
                self.duplicates_removed
            ));
        }
        if self.unmatched_rows_dropped > 0 {
            summary.push_str(&format!(
                "  Rows dropped without metadata: {}\n",
                self.unmatched_rows_dropped
            ));
        }

        summary.push_str(&format!(
            "  Output: {} records from {} stations\n",
            self.output_rows, self.output_stations
        ));
        if let Some(stats) = &self.value_stats {
            summary.push_str(&format!(
                "  Values: mean={:.2}, min={}, max={}\n",
                stats.mean, stats.min, stats.max
            ));
        }

        let failed: Vec<_> = self
            .failures
            .iter()
            .filter(|f| f.kind != FailureKind::Lookup)
            .collect();
        if !failed.is_empty() {
            summary.push_str(&format!("  Failed stations: {}\n", failed.len()));
            for failure in failed.iter().take(10) {
                summary.push_str(&format!(
                    "    {} [{}] {}: {}\n",
                    failure.station_id.as_deref().unwrap_or("?"),
                    failure.archive,
                    failure.kind,
                    failure.reason
                ));
            }
            if failed.len() > 10 {
                summary.push_str(&format!("    ... and {} more\n", failed.len() - 10));
            }
        }
        if self.timed_out {
            summary.push_str("  Run timed out; unfinished stations are listed as cancelled\n");
        }

        summary
    }
}
