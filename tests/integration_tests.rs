use chrono::NaiveDate;
use ghcn_processor::models::{BoundingBox, FilterCriteria, MetadataPrecedence};
use ghcn_processor::processors::{FailureKind, Pipeline};
use ghcn_processor::writers::{CsvWriter, ParquetWriter};
use ghcn_processor::{PipelineConfig, Result, SourceArchive};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn stations_line(id: &str, lat: f64, lon: f64, name: &str) -> String {
    format!("{:<11} {:>8.4} {:>9.4} {:>6.1}    {:<30}\n", id, lat, lon, 250.0, name)
}

fn write_archive(root: &Path, tag: &str, stations: &[(&str, f64, f64, &str)], files: &[(&str, &str)]) -> SourceArchive {
    let dir = root.join(tag.to_lowercase());
    fs::create_dir_all(&dir).unwrap();

    let table: String = stations
        .iter()
        .map(|(id, lat, lon, name)| stations_line(id, *lat, *lon, name))
        .collect();
    fs::write(dir.join("ghcnd-stations.txt"), table).unwrap();

    for (id, body) in files {
        fs::write(dir.join(format!("{}.csv", id)), body).unwrap();
    }
    SourceArchive::new(tag, dir)
}

fn config(archives: Vec<SourceArchive>, criteria: FilterCriteria, workers: usize) -> PipelineConfig {
    PipelineConfig {
        archives,
        criteria,
        worker_count: workers,
        ..Default::default()
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_missing_value_row_is_dropped() -> Result<()> {
    let dir = TempDir::new()?;
    let archive = write_archive(
        dir.path(),
        "US",
        &[("USC00012345", 40.0, -75.0, "Somewhere")],
        &[(
            "USC00012345",
            "USC00012345,20200101,PRCP,25,,,,\nUSC00012345,20200102,PRCP,-9999,,,,\n",
        )],
    );

    let output = Pipeline::new(config(vec![archive], FilterCriteria::new(), 1)).run_blocking()?;

    assert_eq!(output.table.len(), 1);
    let row = &output.table.rows()[0];
    assert_eq!(row.station_id, "USC00012345");
    assert_eq!(row.date, date(2020, 1, 1));
    assert_eq!(row.value, 25);
    assert_eq!(row.name, "Somewhere");
    assert_eq!(output.summary.rows.rejected.missing_value, 1);
    Ok(())
}

#[test]
fn test_station_in_two_archives_keeps_first_metadata() -> Result<()> {
    let dir = TempDir::new()?;
    let rows = "USC00099999,20200101,PRCP,12,,,7,\nUSC00099999,20200102,PRCP,0,,,7,\n";
    let us = write_archive(
        dir.path(),
        "US",
        &[("USC00099999", 31.95, -111.0, "BORDER US")],
        &[("USC00099999", rows)],
    );
    let mx = write_archive(
        dir.path(),
        "MX",
        &[
            ("USC00099999", 31.9501, -111.0002, "BORDER MX"),
            ("MXN00026001", 31.3, -110.94, "NOGALES"),
        ],
        &[
            (
                "USC00099999",
                "USC00099999,20200102,PRCP,0,,,7,\nUSC00099999,20200103,PRCP,8,,,7,\n",
            ),
            ("MXN00026001", "MXN00026001,20200101,PRCP,30,,,S,\n"),
        ],
    );

    let output = Pipeline::new(config(vec![us.clone(), mx.clone()], FilterCriteria::new(), 4))
        .run_blocking()?;

    let border: Vec<_> = output
        .table
        .iter()
        .filter(|r| r.station_id == "USC00099999")
        .collect();
    assert_eq!(
        border.iter().map(|r| (r.date, r.value)).collect::<Vec<_>>(),
        vec![(date(2020, 1, 1), 12), (date(2020, 1, 2), 0), (date(2020, 1, 3), 8)]
    );
    assert!(border.iter().all(|r| r.name == "BORDER US" && r.latitude == 31.95));
    assert_eq!(output.summary.duplicates_removed, 1);
    assert_eq!(output.summary.metadata_conflicts, 1);
    assert_eq!(output.summary.output_stations, 2);

    let mut last = config(vec![us, mx], FilterCriteria::new(), 4);
    last.metadata_precedence = MetadataPrecedence::Last;
    let output = Pipeline::new(last).run_blocking()?;
    assert!(output
        .table
        .iter()
        .filter(|r| r.station_id == "USC00099999")
        .all(|r| r.name == "BORDER MX"));
    Ok(())
}

fn grid_archive(root: &Path) -> SourceArchive {
    let mut stations = Vec::new();
    let mut files = Vec::new();
    for i in 0..20 {
        let id = if i % 5 == 0 {
            format!("US1AZPM{:04}", i)
        } else {
            format!("USC0002{:04}", i)
        };
        let lat = 30.0 + i as f64 * 0.5;
        let lon = -116.0 + i as f64 * 0.5;
        let body: String = (1..=28)
            .map(|d| {
                let value = if d % 7 == 0 { -9999 } else { (i * 31 + d) % 50 };
                let qflag = if d % 9 == 0 { "I" } else { "" };
                let mflag = if d % 6 == 0 { "T" } else { "" };
                format!("{},201902{:02},PRCP,{},{},{},7,\n", id, d, value, mflag, qflag)
            })
            .chain(std::iter::once(format!("{},20190201,TMAX,150,,,7,\n", id)))
            .collect();
        stations.push((id.clone(), lat, lon, format!("GRID {}", i)));
        files.push((id, body));
    }

    let station_refs: Vec<(&str, f64, f64, &str)> = stations
        .iter()
        .map(|(id, lat, lon, name)| (id.as_str(), *lat, *lon, name.as_str()))
        .collect();
    let file_refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(id, body)| (id.as_str(), body.as_str()))
        .collect();
    write_archive(root, "US", &station_refs, &file_refs)
}

fn grid_criteria() -> FilterCriteria {
    FilterCriteria::new()
        .with_roi(BoundingBox::new(31.0, 37.0, -115.0, -109.0))
        .with_date_range(date(2019, 2, 3), date(2019, 2, 25))
        .with_reject_flagged(true)
        .with_excluded_prefix("US1")
}

#[test]
fn test_worker_count_invariance() -> Result<()> {
    let dir = TempDir::new()?;
    let archive = grid_archive(dir.path());

    let sequential = Pipeline::new(config(vec![archive.clone()], grid_criteria(), 1)).run_blocking()?;
    let parallel = Pipeline::new(config(vec![archive], grid_criteria(), 8)).run_blocking()?;

    assert!(!sequential.table.is_empty());
    assert_eq!(sequential.table, parallel.table);
    assert_eq!(sequential.summary.rows, parallel.summary.rows);
    Ok(())
}

#[test]
fn test_no_output_row_violates_criteria() -> Result<()> {
    let dir = TempDir::new()?;
    let archive = grid_archive(dir.path());
    let criteria = grid_criteria();
    let roi = criteria.roi.unwrap();
    let range = criteria.date_range.unwrap();

    let output = Pipeline::new(config(vec![archive], criteria, 4)).run_blocking()?;

    for row in output.table.iter() {
        assert!(roi.contains(row.latitude, row.longitude), "{:?}", row);
        assert!(range.contains(row.date), "{:?}", row);
        assert!(!row.station_id.starts_with("US1"), "{:?}", row);
        assert_eq!(row.qflag, None);
        assert_ne!(row.value, -9999);
    }

    let rows = output.table.rows();
    assert!(rows
        .windows(2)
        .all(|w| (&w[0].station_id, w[0].date) <= (&w[1].station_id, w[1].date)));
    assert!(output.summary.stations_excluded_by_network > 0);
    assert!(output.summary.stations_outside_roi > 0);
    assert!(output.summary.rows.rejected.element > 0);
    Ok(())
}

#[test]
fn test_cocorahs_station_yields_nothing_even_inside_roi() -> Result<()> {
    let dir = TempDir::new()?;
    let archive = write_archive(
        dir.path(),
        "US",
        &[("US1AZMR0001", 33.4, -111.9, "MESA 1.2 N")],
        &[("US1AZMR0001", "US1AZMR0001,20200101,PRCP,5,,,N,\n")],
    );

    let criteria = FilterCriteria::new()
        .with_roi(BoundingBox::new(30.0, 38.0, -116.0, -107.0))
        .with_excluded_prefix("US1");
    let output = Pipeline::new(config(vec![archive], criteria, 2)).run_blocking()?;

    assert!(output.table.is_empty());
    assert_eq!(output.summary.stations_excluded_by_network, 1);
    Ok(())
}

#[test]
fn test_bad_files_are_isolated() -> Result<()> {
    let dir = TempDir::new()?;
    let archive = write_archive(
        dir.path(),
        "US",
        &[("USC00000001", 33.0, -111.0, "GOOD"), ("USC00000002", 33.0, -111.0, "ODD")],
        &[
            ("USC00000001", "USC00000001,20200101,PRCP,5,,,7,\n"),
            (
                "USC00000002",
                "USC00000002,2020013X,PRCP,5,,,7,\nUSC00000002,20200102,PRCP,abc,,,7,\nUSC00000002,20200103,PRCP,9,,,7,\n",
            ),
            ("USC00000003", "USC00000003,20200101,PRCP,1,,,7,\n"),
            ("broken", ""),
        ],
    );

    let output = Pipeline::new(config(vec![archive], FilterCriteria::new(), 2)).run_blocking()?;

    assert_eq!(output.table.len(), 2);
    assert_eq!(output.summary.rows.malformed, 2);
    assert_eq!(output.summary.failures_of(FailureKind::Lookup), 1);
    assert_eq!(output.summary.failures_of(FailureKind::Format), 1);
    Ok(())
}

#[test]
fn test_invalid_criteria_fail_before_reading() {
    let dir = TempDir::new().unwrap();
    let archive = SourceArchive::new("US", dir.path());

    let criteria = FilterCriteria::new().with_roi(BoundingBox::new(40.0, 30.0, -116.0, -107.0));
    let result = Pipeline::new(config(vec![archive.clone()], criteria, 1)).run_blocking();
    assert!(matches!(result, Err(ghcn_processor::ProcessingError::Config(_))));

    let criteria = FilterCriteria::new().with_target_element("RAIN");
    let result = Pipeline::new(config(vec![archive], criteria, 1)).run_blocking();
    assert!(matches!(result, Err(ghcn_processor::ProcessingError::Config(_))));
}

#[test]
fn test_daily_summaries_file_with_embedded_metadata() -> Result<()> {
    let dir = TempDir::new()?;
    let archive_dir = dir.path().join("ncei");
    fs::create_dir_all(&archive_dir)?;
    fs::write(
        archive_dir.join("USW00023183.csv"),
        "\"STATION\",\"DATE\",\"LATITUDE\",\"LONGITUDE\",\"ELEVATION\",\"NAME\",\"PRCP\",\"PRCP_ATTRIBUTES\"\n\
         \"USW00023183\",\"2021-07-01\",\"33.4278\",\"-112.0037\",\"337.4\",\"PHOENIX AIRPORT, AZ US\",\"0\",\",,W,2400\"\n\
         \"USW00023183\",\"2021-07-02\",\"33.4278\",\"-112.0037\",\"337.4\",\"PHOENIX AIRPORT, AZ US\",\"3\",\"T,,W,2400\"\n\
         \"USW00023183\",\"2021-07-03\",\"33.4278\",\"-112.0037\",\"337.4\",\"PHOENIX AIRPORT, AZ US\",\"\",\",,W,2400\"\n",
    )?;

    let criteria = FilterCriteria::new().with_trace_mflags(['T']);
    let output = Pipeline::new(config(vec![SourceArchive::new("NCEI", &archive_dir)], criteria, 1))
        .run_blocking()?;

    assert_eq!(output.table.len(), 2);
    let trace = &output.table.rows()[1];
    assert_eq!(trace.value, 0);
    assert_eq!(trace.mflag, Some('T'));
    assert_eq!(trace.name, "PHOENIX AIRPORT, AZ US");
    Ok(())
}

#[test]
fn test_writers_produce_same_table() -> Result<()> {
    let dir = TempDir::new()?;
    let archive = grid_archive(dir.path());
    let output = Pipeline::new(config(vec![archive], grid_criteria(), 4)).run_blocking()?;

    let csv_path: PathBuf = dir.path().join("out").join("prcp.csv");
    CsvWriter::new().write_records(output.table.rows(), &csv_path)?;
    let text = fs::read_to_string(&csv_path)?;
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("station_id,date,latitude,longitude,name,value,mflag,qflag,sflag")
    );
    assert_eq!(lines.count(), output.table.len());

    let parquet_path = dir.path().join("out").join("prcp.parquet");
    let writer = ParquetWriter::new().with_compression("zstd")?;
    writer.write_records(output.table.rows(), &parquet_path)?;
    let back = writer.read_sample_records(&parquet_path, usize::MAX)?;
    assert_eq!(back.as_slice(), output.table.rows());
    Ok(())
}
