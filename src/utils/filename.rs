use crate::writers::OutputFormat;
use chrono::{Datelike, Local};
use std::path::PathBuf;

/// Default output path: output/ghcn-{element}-{YYMMDD}.{csv|parquet}
pub fn generate_default_output_filename(element: &str, format: OutputFormat) -> PathBuf {
    let now = Local::now();
    let year = now.year() % 100;

    let filename = format!(
        "ghcn-{}-{:02}{:02}{:02}.{}",
        element.to_lowercase(),
        year,
        now.month(),
        now.day(),
        format.extension()
    );
    PathBuf::from("output").join(filename)
}
