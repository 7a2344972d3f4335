use crate::error::{ProcessingError, Result};
use crate::models::{StationIndex, StationMetadata};
use crate::utils::constants::{
    FW_ELEVATION, FW_ID, FW_LATITUDE, FW_LONGITUDE, FW_NAME, MISSING_ELEVATION,
};
use csv::StringRecord;
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};
use validator::Validate;

const ID_COLUMNS: &[&str] = &["ID", "STATION", "STATION_ID"];
const LATITUDE_COLUMNS: &[&str] = &["LATITUDE", "LAT"];
const LONGITUDE_COLUMNS: &[&str] = &["LONGITUDE", "LON"];
const ELEVATION_COLUMNS: &[&str] = &["ELEVATION", "ELEV"];
const NAME_COLUMNS: &[&str] = &["NAME", "STATION_NAME"];

/// Reads station metadata tables: ghcnd-stations.txt (fixed width) or CSV with a header
pub struct StationReader {
    strict: bool,
}

impl StationReader {
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Fail on the first malformed row instead of skipping it
    pub fn with_strict(strict: bool) -> Self {
        Self { strict }
    }

    /// Read station metadata from a fixed-width or delimited table
    pub fn read_stations(&self, path: &Path) -> Result<Vec<StationMetadata>> {
        let bytes = std::fs::read(path)?;
        let text = decode_text(&bytes);

        let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        let stations = match header_delimiter(first_line) {
            Some(delimiter) => self.read_delimited(path, &text, delimiter)?,
            None => self.read_fixed_width(path, &text)?,
        };

        debug!("Loaded {} stations from {}", stations.len(), path.display());
        Ok(stations)
    }

    /// Read a table into an index where the first definition of an id wins
    pub fn read_index(&self, path: &Path) -> Result<StationIndex> {
        Ok(StationIndex::from_stations(self.read_stations(path)?))
    }

    fn read_fixed_width(&self, path: &Path, text: &str) -> Result<Vec<StationMetadata>> {
        let mut stations = Vec::new();
        let mut skipped = 0;

        for (line_number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            match parse_fixed_width_line(line) {
                Ok(station) => stations.push(station),
                Err(e) => {
                    self.handle_bad_row(path, line_number + 1, e)?;
                    skipped += 1;
                }
            }
        }

        finish_table(path, stations, skipped)
    }

    fn read_delimited(&self, path: &Path, text: &str, delimiter: u8) -> Result<Vec<StationMetadata>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let columns = StationColumns::locate(path, &headers)?;

        let mut stations = Vec::new();
        let mut skipped = 0;
        let mut record = StringRecord::new();
        let mut line_number = 1;

        loop {
            line_number += 1;
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => match columns.parse(&record) {
                    Ok(station) => stations.push(station),
                    Err(e) => {
                        self.handle_bad_row(path, line_number, e)?;
                        skipped += 1;
                    }
                },
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let error = ProcessingError::InvalidFormat(e.to_string());
                    self.handle_bad_row(path, line_number, error)?;
                    skipped += 1;
                }
            }
        }

        finish_table(path, stations, skipped)
    }

    fn handle_bad_row(&self, path: &Path, line: usize, error: ProcessingError) -> Result<()> {
        if !error.is_row_scoped() {
            return Err(error);
        }
        if self.strict {
            return Err(ProcessingError::InvalidFormat(format!(
                "{}:{}: {}",
                path.display(),
                line,
                error
            )));
        }
        debug!("{}:{}: skipping station row: {}", path.display(), line, error);
        Ok(())
    }
}

impl Default for StationReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata tables are usually ASCII; fall back to Windows-1252 for legacy exports
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Delimiter of a headered table, or None for the fixed-width layout
fn header_delimiter(line: &str) -> Option<u8> {
    [b',', b'\t', b';'].into_iter().find(|&delimiter| {
        let delimiter = char::from(delimiter);
        line.contains(delimiter)
            && line
                .split(delimiter)
                .map(|h| h.trim().trim_matches('"').to_uppercase())
                .any(|h| is_known_column(&h))
    })
}

fn is_known_column(header: &str) -> bool {
    [
        ID_COLUMNS,
        LATITUDE_COLUMNS,
        LONGITUDE_COLUMNS,
        ELEVATION_COLUMNS,
        NAME_COLUMNS,
    ]
    .iter()
    .any(|columns| columns.contains(&header))
}

/// A table with rows but no usable station is in a layout we do not understand
fn finish_table(
    path: &Path,
    stations: Vec<StationMetadata>,
    skipped: usize,
) -> Result<Vec<StationMetadata>> {
    if stations.is_empty() && skipped > 0 {
        return Err(ProcessingError::InvalidFormat(format!(
            "No station rows could be read from {} ({} rows rejected)",
            path.display(),
            skipped
        )));
    }
    if skipped > 0 {
        warn!("Skipped {} malformed station rows in {}", skipped, path.display());
    }
    Ok(stations)
}

fn slice(line: &str, (start, end): (usize, usize)) -> &str {
    let end = end.min(line.len());
    line.get(start..end).unwrap_or("").trim()
}

fn parse_coordinate(value: &str, what: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProcessingError::InvalidCoordinate(format!("Invalid {}: '{}'", what, value)))
}

fn parse_elevation(value: &str) -> Result<Option<f64>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let elevation = trimmed
        .parse::<f64>()
        .map_err(|_| ProcessingError::InvalidFormat(format!("Invalid elevation: '{}'", value)))?;
    if (elevation - MISSING_ELEVATION).abs() < 0.05 {
        Ok(None)
    } else {
        Ok(Some(elevation))
    }
}

fn validated(station: StationMetadata) -> Result<StationMetadata> {
    station.validate().map_err(|e| {
        ProcessingError::InvalidCoordinate(format!("Station {}: {}", station.station_id, e))
    })?;
    Ok(station)
}

/// Parse one ghcnd-stations.txt line
fn parse_fixed_width_line(line: &str) -> Result<StationMetadata> {
    // ID          LATITUDE LONGITUDE ELEV  ST NAME
    // ACW00011604  17.1167  -61.7833   10.1    ST JOHNS COOLIDGE FLD
    if line.len() < FW_LONGITUDE.1 {
        return Err(ProcessingError::InvalidFormat(format!(
            "Station line too short ({} chars)",
            line.len()
        )));
    }

    let station_id = slice(line, FW_ID);
    if station_id.is_empty() {
        return Err(ProcessingError::InvalidFormat("Missing station id".to_string()));
    }

    let latitude = parse_coordinate(slice(line, FW_LATITUDE), "latitude")?;
    let longitude = parse_coordinate(slice(line, FW_LONGITUDE), "longitude")?;
    let elevation = parse_elevation(slice(line, FW_ELEVATION))?;
    let name = slice(line, FW_NAME).to_string();

    validated(StationMetadata::new(
        station_id.to_string(),
        latitude,
        longitude,
        elevation,
        name,
    ))
}

struct StationColumns {
    id: usize,
    latitude: usize,
    longitude: usize,
    elevation: Option<usize>,
    name: usize,
}

impl StationColumns {
    fn locate(path: &Path, headers: &StringRecord) -> Result<Self> {
        let find = |candidates: &[&str]| {
            headers
                .iter()
                .position(|h| candidates.contains(&h.trim().to_uppercase().as_str()))
        };
        let require = |candidates: &[&str]| {
            find(candidates).ok_or_else(|| ProcessingError::MissingColumn {
                path: path.to_path_buf(),
                column: candidates[0].to_string(),
            })
        };

        Ok(Self {
            id: require(ID_COLUMNS)?,
            latitude: require(LATITUDE_COLUMNS)?,
            longitude: require(LONGITUDE_COLUMNS)?,
            elevation: find(ELEVATION_COLUMNS),
            name: require(NAME_COLUMNS)?,
        })
    }

    fn parse(&self, record: &StringRecord) -> Result<StationMetadata> {
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let station_id = field(self.id);
        if station_id.is_empty() {
            return Err(ProcessingError::InvalidFormat("Missing station id".to_string()));
        }

        let latitude = parse_coordinate(field(self.latitude), "latitude")?;
        let longitude = parse_coordinate(field(self.longitude), "longitude")?;
        let elevation = match self.elevation {
            Some(idx) => parse_elevation(field(idx))?,
            None => None,
        };

        validated(StationMetadata::new(
            station_id.to_string(),
            latitude,
            longitude,
            elevation,
            field(self.name).to_string(),
        ))
    }
}
