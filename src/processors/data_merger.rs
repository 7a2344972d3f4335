use crate::error::{ProcessingError, Result};
use crate::models::{FilteredRecord, MergedRecord, MergedTable, StationIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Admitted records of one station file
#[derive(Debug, Clone, PartialEq)]
pub struct StationPartial {
    pub archive_tag: String,
    pub archive_rank: usize,
    pub station_id: String,
    pub records: Vec<FilteredRecord>,
}

/// What to do with rows whose station has no metadata at merge time
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    #[default]
    Drop,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub table: MergedTable,
    pub duplicates_removed: usize,
    pub unmatched_dropped: usize,
}

pub struct DataMerger {
    unmatched_policy: UnmatchedPolicy,
}

impl DataMerger {
    pub fn new() -> Self {
        Self {
            unmatched_policy: UnmatchedPolicy::Drop,
        }
    }

    pub fn with_unmatched_policy(unmatched_policy: UnmatchedPolicy) -> Self {
        Self { unmatched_policy }
    }

    /// Combine per-station partials into one table ordered by (station_id, date).
    ///
    /// Verbatim duplicates (same station, date, value and flags) keep the copy
    /// from the lowest-ranked archive. Rows that only share (station_id, date)
    /// are all kept. The result does not depend on the order of `partials`.
    pub fn merge(&self, partials: Vec<StationPartial>, index: &StationIndex) -> Result<MergeOutput> {
        let mut keyed: Vec<(FilteredRecord, usize)> = partials
            .into_iter()
            .flat_map(|partial| {
                let rank = partial.archive_rank;
                partial.records.into_iter().map(move |record| (record, rank))
            })
            .collect();

        keyed.sort_unstable();

        let before = keyed.len();
        keyed.dedup_by(|later, earlier| later.0 == earlier.0);
        let duplicates_removed = before - keyed.len();
        if duplicates_removed > 0 {
            debug!("Removed {} duplicate rows", duplicates_removed);
        }

        let mut rows = Vec::with_capacity(keyed.len());
        let mut unmatched_dropped = 0;
        let mut last_unmatched: Option<String> = None;

        for (record, _) in keyed {
            match index.get(&record.station_id) {
                Some(station) => rows.push(MergedRecord::join(record, station)),
                None => match self.unmatched_policy {
                    UnmatchedPolicy::Fail => {
                        return Err(ProcessingError::StationNotFound {
                            station_id: record.station_id,
                        })
                    }
                    UnmatchedPolicy::Drop => {
                        if last_unmatched.as_deref() != Some(record.station_id.as_str()) {
                            warn!(
                                "Dropping rows of station {}: no metadata",
                                record.station_id
                            );
                            last_unmatched = Some(record.station_id.clone());
                        }
                        unmatched_dropped += 1;
                    }
                },
            }
        }

        Ok(MergeOutput {
            table: MergedTable::from_sorted(rows),
            duplicates_removed,
            unmatched_dropped,
        })
    }
}

impl Default for DataMerger {
    fn default() -> Self {
        Self::new()
    }
}
