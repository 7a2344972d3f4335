use crate::error::Result;
use crate::models::{MergedRecord, StationMetadata};
use crate::utils::constants::{DEFAULT_BUFFER_SIZE, OUTPUT_COLUMNS};
use crate::writers::staging_file;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

fn flag(value: Option<char>) -> String {
    value.map(String::from).unwrap_or_default()
}

/// Writes the merged table as delimited text with a fixed header
pub struct CsvWriter;

impl CsvWriter {
    pub fn new() -> Self {
        Self
    }

    /// Serialize records to any sink; the header is always written
    pub fn write_to<W: Write>(&self, records: &[MergedRecord], sink: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(sink);

        writer.write_record(OUTPUT_COLUMNS)?;
        for record in records {
            writer.write_record([
                record.station_id.clone(),
                record.date.format("%Y-%m-%d").to_string(),
                record.latitude.to_string(),
                record.longitude.to_string(),
                record.name.clone(),
                record.value.to_string(),
                flag(record.mflag),
                flag(record.qflag),
                flag(record.sflag),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Station listing: id, coordinates, elevation (blank when unknown) and name
    pub fn write_stations_to<W: Write>(&self, stations: &[&StationMetadata], sink: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(sink);

        writer.write_record(["station_id", "latitude", "longitude", "elevation", "name"])?;
        for station in stations {
            writer.write_record([
                station.station_id.clone(),
                station.latitude.to_string(),
                station.longitude.to_string(),
                station.elevation.map(|e| e.to_string()).unwrap_or_default(),
                station.name.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write to `path`; the file only appears once every row is on disk
    pub fn write_records(&self, records: &[MergedRecord], path: &Path) -> Result<()> {
        let staged = staging_file(path)?;
        {
            let sink = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, staged.as_file());
            self.write_to(records, sink)?;
        }
        staged.as_file().sync_all()?;
        staged.persist(path)?;

        debug!("Wrote {} rows to {}", records.len(), path.display());
        Ok(())
    }
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}
