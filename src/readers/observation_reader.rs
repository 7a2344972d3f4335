use crate::error::{ProcessingError, Result};
use crate::models::observation::{parse_date, parse_flag, parse_value};
use crate::models::{FilterCriteria, FilteredRecord, RawObservation, StationMetadata};
use crate::processors::record_filter::{evaluate, Rejection, RejectionCounts};
use crate::utils::constants::{DEFAULT_BUFFER_SIZE, STATION_ID_LEN};
use csv::StringRecord;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Column layout of a station file, detected from its first record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLayout {
    /// GHCN-Daily by_station rows: ID,DATE,ELEMENT,VALUE,MFLAG,QFLAG,SFLAG[,OBS_TIME]
    ByStation(LongColumns),
    /// NCEI daily-summaries: one row per day, one column per element
    DailySummaries(WideColumns),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongColumns {
    id: usize,
    date: usize,
    element: usize,
    value: usize,
    mflag: Option<usize>,
    qflag: Option<usize>,
    sflag: Option<usize>,
}

impl Default for LongColumns {
    fn default() -> Self {
        Self {
            id: 0,
            date: 1,
            element: 2,
            value: 3,
            mflag: Some(4),
            qflag: Some(5),
            sflag: Some(6),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideColumns {
    id: usize,
    date: usize,
    element: String,
    value: Option<usize>,
    attributes: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    elevation: Option<usize>,
    name: Option<usize>,
}

/// Per-file row accounting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowStats {
    pub rows_read: usize,
    pub admitted: usize,
    pub malformed: usize,
    pub rejected: RejectionCounts,
}

impl RowStats {
    pub fn merge(&mut self, other: &RowStats) {
        self.rows_read += other.rows_read;
        self.admitted += other.admitted;
        self.malformed += other.malformed;
        self.rejected.merge(&other.rejected);
    }
}

/// Admitted rows of one station file, ordered by date
#[derive(Debug, Clone, Default)]
pub struct StationRead {
    pub records: Vec<FilteredRecord>,
    pub stats: RowStats,
}

/// Station id and, for daily-summaries files, the embedded metadata
#[derive(Debug, Clone, PartialEq)]
pub struct StationHeader {
    pub station_id: String,
    pub embedded: Option<StationMetadata>,
}

fn header_position(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.trim().to_uppercase().as_str()))
}

impl FileLayout {
    /// Detect the layout from the first record; returns whether it was a header
    pub fn detect(first: &StringRecord, element: &str) -> Result<(Self, bool)> {
        let is_header = first.iter().any(|f| {
            let upper = f.trim().to_uppercase();
            upper == "DATE" || upper == "STATION" || upper == "ID"
        });

        if !is_header {
            return Ok((FileLayout::ByStation(LongColumns::default()), false));
        }

        let find = |names: &[&str]| header_position(first, names);
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| {
                ProcessingError::InvalidFormat(format!("Station file header lacks {}", names[0]))
            })
        };

        if let Some(element_col) = find(&["ELEMENT"]) {
            return Ok((
                FileLayout::ByStation(LongColumns {
                    id: require(&["ID", "STATION"])?,
                    date: require(&["DATE"])?,
                    element: element_col,
                    value: require(&["DATA_VALUE", "VALUE"])?,
                    mflag: find(&["M_FLAG", "MFLAG"]),
                    qflag: find(&["Q_FLAG", "QFLAG"]),
                    sflag: find(&["S_FLAG", "SFLAG"]),
                }),
                true,
            ));
        }

        let attributes = format!("{}_ATTRIBUTES", element);
        Ok((
            FileLayout::DailySummaries(WideColumns {
                id: require(&["STATION", "ID"])?,
                date: require(&["DATE"])?,
                element: element.to_string(),
                value: find(&[element]),
                attributes: find(&[attributes.as_str()]),
                latitude: find(&["LATITUDE"]),
                longitude: find(&["LONGITUDE"]),
                elevation: find(&["ELEVATION"]),
                name: find(&["NAME"]),
            }),
            true,
        ))
    }

    /// Parse one data record into an observation; `None` when the file carries no such element
    pub fn parse(&self, record: &StringRecord) -> Result<Option<RawObservation>> {
        match self {
            FileLayout::ByStation(cols) => {
                if record.len() <= cols.value {
                    return Err(ProcessingError::InvalidFormat(format!(
                        "Expected at least {} fields, got {}",
                        cols.value + 1,
                        record.len()
                    )));
                }
                let flag = |idx: Option<usize>| match idx.and_then(|i| record.get(i)) {
                    Some(value) => parse_flag(value),
                    None => Ok(None),
                };

                Ok(Some(RawObservation {
                    station_id: field(record, cols.id).to_string(),
                    date: parse_date(field(record, cols.date))?,
                    element: field(record, cols.element).to_string(),
                    value: parse_value(field(record, cols.value))?,
                    mflag: flag(cols.mflag)?,
                    qflag: flag(cols.qflag)?,
                    sflag: flag(cols.sflag)?,
                }))
            }
            FileLayout::DailySummaries(cols) => {
                let Some(value_col) = cols.value else {
                    return Ok(None);
                };
                let (mflag, qflag, sflag) = match cols.attributes {
                    Some(idx) => parse_attributes(field(record, idx))?,
                    None => (None, None, None),
                };

                Ok(Some(RawObservation {
                    station_id: field(record, cols.id).to_string(),
                    date: parse_date(field(record, cols.date))?,
                    element: cols.element.clone(),
                    value: parse_value(field(record, value_col))?,
                    mflag,
                    qflag,
                    sflag,
                }))
            }
        }
    }

    /// Station metadata carried in daily-summaries rows
    pub fn embedded_metadata(&self, record: &StringRecord) -> Option<StationMetadata> {
        let FileLayout::DailySummaries(cols) = self else {
            return None;
        };
        let number = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .and_then(|v| v.trim().parse::<f64>().ok())
        };

        let station = StationMetadata::new(
            field(record, cols.id).to_string(),
            number(cols.latitude)?,
            number(cols.longitude)?,
            number(cols.elevation),
            cols.name
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string(),
        );
        validator::Validate::validate(&station).ok().map(|_| station)
    }
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

/// Split a daily-summaries attributes cell `"M,Q,S[,TIME]"`
fn parse_attributes(cell: &str) -> Result<(Option<char>, Option<char>, Option<char>)> {
    let mut parts = cell.split(',');
    let mflag = parse_flag(parts.next().unwrap_or(""))?;
    let qflag = parse_flag(parts.next().unwrap_or(""))?;
    let sflag = parse_flag(parts.next().unwrap_or(""))?;
    Ok((mflag, qflag, sflag))
}

/// Station id encoded in a file name such as `USC00012345.csv`
pub fn station_id_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem.len() == STATION_ID_LEN && stem.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(stem.to_string())
    } else {
        None
    }
}

/// Streams station files through the record filter
pub struct ObservationReader;

impl ObservationReader {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, path: &Path) -> Result<csv::Reader<File>> {
        let file = File::open(path)?;
        Ok(csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(DEFAULT_BUFFER_SIZE)
            .from_reader(file))
    }

    /// Resolve a file's station id from its header and first data row
    pub fn peek_station(&self, path: &Path, element: &str) -> Result<StationHeader> {
        let mut reader = self.open(path)?;
        let mut record = StringRecord::new();

        if !reader.read_record(&mut record)? {
            return station_id_from_path(path)
                .map(|station_id| StationHeader {
                    station_id,
                    embedded: None,
                })
                .ok_or_else(|| {
                    ProcessingError::InvalidFormat(format!("Empty station file: {}", path.display()))
                });
        }

        let (layout, was_header) = FileLayout::detect(&record, element)?;
        if was_header && !reader.read_record(&mut record)? {
            return station_id_from_path(path)
                .map(|station_id| StationHeader {
                    station_id,
                    embedded: None,
                })
                .ok_or_else(|| {
                    ProcessingError::InvalidFormat(format!("No data rows in {}", path.display()))
                });
        }

        let station_id = match &layout {
            FileLayout::ByStation(cols) => field(&record, cols.id),
            FileLayout::DailySummaries(cols) => field(&record, cols.id),
        };
        if station_id.is_empty() {
            return Err(ProcessingError::InvalidFormat(format!(
                "First row of {} has no station id",
                path.display()
            )));
        }

        Ok(StationHeader {
            station_id: station_id.to_string(),
            embedded: layout.embedded_metadata(&record),
        })
    }

    /// Read one station file, keeping only rows the criteria admit
    pub fn read_station(
        &self,
        path: &Path,
        station: &StationMetadata,
        criteria: &FilterCriteria,
    ) -> Result<StationRead> {
        let mut reader = self.open(path)?;
        let mut record = StringRecord::new();
        let mut result = StationRead::default();
        let mut layout: Option<FileLayout> = None;
        let mut line = 0usize;

        loop {
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {}
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    line += 1;
                    result.stats.malformed += 1;
                    debug!("{}:{}: {}", path.display(), line, e);
                    continue;
                }
            }
            line += 1;

            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            if layout.is_none() {
                let (detected, was_header) = FileLayout::detect(&record, &criteria.target_element)?;
                layout = Some(detected);
                if was_header {
                    continue;
                }
            }
            let Some(active) = layout.as_ref() else {
                continue;
            };

            result.stats.rows_read += 1;
            let row = match active.parse(&record) {
                Ok(Some(row)) => row,
                Ok(None) => {
                    result.stats.rejected.record(Rejection::Element);
                    continue;
                }
                Err(e) => {
                    result.stats.malformed += 1;
                    debug!("{}:{}: {}", path.display(), line, e);
                    continue;
                }
            };

            if row.station_id != station.station_id {
                result.stats.malformed += 1;
                debug!(
                    "{}:{}: row belongs to station {}, expected {}",
                    path.display(),
                    line,
                    row.station_id,
                    station.station_id
                );
                continue;
            }

            match evaluate(&row, station, criteria) {
                Some(rejection) => result.stats.rejected.record(rejection),
                None => {
                    let mut filtered = row.into_filtered();
                    if filtered
                        .mflag
                        .is_some_and(|m| criteria.trace_mflags.contains(&m))
                    {
                        filtered.value = 0;
                    }
                    result.records.push(filtered);
                }
            }
        }

        if result.stats.malformed > 0 {
            warn!(
                "Skipped {} malformed lines in {}",
                result.stats.malformed,
                path.display()
            );
        }

        result.records.sort_by_key(|r| r.date);
        result.stats.admitted = result.records.len();
        Ok(result)
    }
}

impl Default for ObservationReader {
    fn default() -> Self {
        Self::new()
    }
}
