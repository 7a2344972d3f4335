use crate::error::{ProcessingError, Result};
use crate::models::MergedRecord;
use crate::utils::constants::{
    COMPRESSION_GZIP, COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_ROW_GROUP_SIZE, OUTPUT_COLUMNS,
};
use crate::writers::staging_file;
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

fn flag_column(records: &[MergedRecord], pick: impl Fn(&MergedRecord) -> Option<char>) -> ArrayRef {
    let values: Vec<Option<String>> = records.iter().map(|r| pick(r).map(String::from)).collect();
    Arc::new(StringArray::from(values))
}

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY => Compression::SNAPPY,
            COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
            COMPRESSION_LZ4 => Compression::LZ4,
            COMPRESSION_ZSTD => Compression::ZSTD(ZstdLevel::default()),
            COMPRESSION_NONE => Compression::UNCOMPRESSED,
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write the merged table in row-group sized batches; the file appears
    /// only after the footer is written. An empty table still gets a schema.
    pub fn write_records(&self, records: &[MergedRecord], path: &Path) -> Result<()> {
        let schema = Self::schema();
        let staged = staging_file(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(staged.reopen()?, schema.clone(), Some(props))?;
        for chunk in records.chunks(self.row_group_size.max(1)) {
            let batch = Self::records_to_batch(chunk, schema.clone())?;
            writer.write(&batch)?;
        }
        writer.close()?;

        staged.persist(path)?;
        debug!("Wrote {} rows to {}", records.len(), path.display());
        Ok(())
    }

    /// Column names match the CSV header
    pub fn schema() -> Arc<Schema> {
        let [station_id, date, latitude, longitude, name, value, mflag, qflag, sflag] =
            OUTPUT_COLUMNS;
        Arc::new(Schema::new(vec![
            Field::new(station_id, DataType::Utf8, false),
            Field::new(date, DataType::Date32, false),
            Field::new(latitude, DataType::Float64, false),
            Field::new(longitude, DataType::Float64, false),
            Field::new(name, DataType::Utf8, false),
            Field::new(value, DataType::Int32, false),
            Field::new(mflag, DataType::Utf8, true),
            Field::new(qflag, DataType::Utf8, true),
            Field::new(sflag, DataType::Utf8, true),
        ]))
    }

    fn records_to_batch(records: &[MergedRecord], schema: Arc<Schema>) -> Result<RecordBatch> {
        let station_ids: Vec<&str> = records.iter().map(|r| r.station_id.as_str()).collect();
        let dates: Vec<i32> = records.iter().map(|r| days_since_epoch(r.date)).collect();
        let latitudes: Vec<f64> = records.iter().map(|r| r.latitude).collect();
        let longitudes: Vec<f64> = records.iter().map(|r| r.longitude).collect();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let values: Vec<i32> = records.iter().map(|r| r.value).collect();

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(station_ids)),
                Arc::new(Date32Array::from(dates)),
                Arc::new(Float64Array::from(latitudes)),
                Arc::new(Float64Array::from(longitudes)),
                Arc::new(StringArray::from(names)),
                Arc::new(Int32Array::from(values)),
                flag_column(records, |r| r.mflag),
                flag_column(records, |r| r.qflag),
                flag_column(records, |r| r.sflag),
            ],
        )?;

        Ok(batch)
    }

    /// Read records back, up to `limit`
    pub fn read_sample_records(&self, path: &Path, limit: usize) -> Result<Vec<MergedRecord>> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize) -> Result<&'a T> {
            batch
                .column(index)
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| {
                    ProcessingError::InvalidFormat(format!(
                        "Unexpected type for column '{}'",
                        OUTPUT_COLUMNS[index]
                    ))
                })
        }

        fn flag(array: &StringArray, i: usize) -> Option<char> {
            if array.is_null(i) {
                None
            } else {
                array.value(i).chars().next()
            }
        }

        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(limit.clamp(1, 8192))
            .build()?;

        let mut records = Vec::new();
        for batch in reader {
            let batch = batch?;
            let station_ids = column::<StringArray>(&batch, 0)?;
            let dates = column::<Date32Array>(&batch, 1)?;
            let latitudes = column::<Float64Array>(&batch, 2)?;
            let longitudes = column::<Float64Array>(&batch, 3)?;
            let names = column::<StringArray>(&batch, 4)?;
            let values = column::<Int32Array>(&batch, 5)?;
            let mflags = column::<StringArray>(&batch, 6)?;
            let qflags = column::<StringArray>(&batch, 7)?;
            let sflags = column::<StringArray>(&batch, 8)?;

            for i in 0..batch.num_rows() {
                if records.len() >= limit {
                    return Ok(records);
                }
                let date = unix_epoch()
                    .checked_add_signed(chrono::Duration::days(dates.value(i) as i64))
                    .ok_or_else(|| {
                        ProcessingError::InvalidFormat("Invalid date in Parquet file".to_string())
                    })?;

                records.push(MergedRecord {
                    station_id: station_ids.value(i).to_string(),
                    date,
                    latitude: latitudes.value(i),
                    longitude: longitudes.value(i),
                    name: names.value(i).to_string(),
                    value: values.value(i),
                    mflag: flag(mflags, i),
                    qflag: flag(qflags, i),
                    sflag: flag(sflags, i),
                });
            }
        }

        Ok(records)
    }

    /// Get file statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let row_groups = metadata.num_row_groups();
        let row_group_sizes = (0..row_groups)
            .map(|i| metadata.row_group(i).num_rows())
            .collect();

        Ok(ParquetFileInfo {
            total_rows: metadata.file_metadata().num_rows(),
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size: std::fs::metadata(path)?.len(),
            compression: self.compression,
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Compression: {:?}\n\
            - Avg rows per group: {:.0}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
            self.total_rows as f64 / self.row_groups.max(1) as f64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn records(n: usize) -> Vec<MergedRecord> {
        (0..n)
            .map(|i| MergedRecord {
                station_id: format!("MXN000260{:02}", i % 3),
                date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                latitude: 31.3,
                longitude: -110.94,
                name: "NOGALES".to_string(),
                value: i as i32 * 3,
                mflag: if i % 4 == 0 { Some('T') } else { None },
                qflag: None,
                sflag: Some('S'),
            })
            .collect()
    }

    #[test]
    fn test_date_encoding_uses_unix_epoch() {
        assert_eq!(days_since_epoch(unix_epoch()), 0);
        assert_eq!(days_since_epoch(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()), 10957);
    }

    #[test]
    fn test_write_and_read_back() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("prcp.parquet");
        let input = records(25);

        let writer = ParquetWriter::new().with_row_group_size(10);
        writer.write_records(&input, &path)?;

        let output = writer.read_sample_records(&path, 100)?;
        assert_eq!(output, input);

        let info = writer.get_file_info(&path)?;
        assert_eq!(info.total_rows, 25);
        assert_eq!(info.row_groups, 3);
        Ok(())
    }

    #[test]
    fn test_empty_table_has_schema() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("empty.parquet");
        let writer = ParquetWriter::new();
        writer.write_records(&[], &path)?;

        assert_eq!(writer.get_file_info(&path)?.total_rows, 0);
        assert!(writer.read_sample_records(&path, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unsupported_compression() {
        assert!(ParquetWriter::new().with_compression("brotli").is_err());
        assert!(ParquetWriter::new().with_compression("ZSTD").is_ok());
    }
}
