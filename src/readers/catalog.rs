use crate::config::SourceArchive;
use crate::error::{ProcessingError, Result};
use crate::models::{FilterCriteria, StationMetadata};
use crate::processors::{FailureKind, StationFailure};
use crate::readers::observation_reader::{station_id_from_path, ObservationReader};
use crate::utils::constants::STATION_FILE_EXTENSION;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A station file whose station id has been resolved
#[derive(Debug, Clone, PartialEq)]
pub struct StationFile {
    pub archive_tag: String,
    /// Position of the archive in the configured order
    pub archive_rank: usize,
    pub path: PathBuf,
    pub station_id: String,
    /// Metadata carried inside the file (daily-summaries layout)
    pub embedded: Option<StationMetadata>,
}

/// Candidate station files of one archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveCatalog {
    pub tag: String,
    pub rank: usize,
    pub files_found: usize,
    pub files: Vec<StationFile>,
    /// Files skipped by name because their id carries an excluded network prefix
    pub excluded_by_name: usize,
    pub failures: Vec<StationFailure>,
}

/// List `*.csv` files of a directory, sorted by name for a stable order
pub fn list_station_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(STATION_FILE_EXTENSION))
        {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

enum Resolved {
    File(StationFile),
    ExcludedByName,
    Failed(StationFailure),
}

impl ArchiveCatalog {
    /// Enumerate an archive and resolve every file's station id
    pub fn scan(
        archive: &SourceArchive,
        rank: usize,
        criteria: &FilterCriteria,
        max_workers: usize,
    ) -> Result<Self> {
        let paths = list_station_files(&archive.dir)?;
        info!(
            "Archive {}: {} station files in {}",
            archive.tag,
            paths.len(),
            archive.dir.display()
        );

        let reader = ObservationReader::new();
        let resolve = |path: &PathBuf| -> Resolved {
            if let Some(id) = station_id_from_path(path) {
                if criteria.is_excluded_station(&id) {
                    return Resolved::ExcludedByName;
                }
            }

            match reader.peek_station(path, &criteria.target_element) {
                Ok(header) => Resolved::File(StationFile {
                    archive_tag: archive.tag.clone(),
                    archive_rank: rank,
                    path: path.clone(),
                    station_id: header.station_id,
                    embedded: header.embedded,
                }),
                Err(e) => {
                    let kind = match e {
                        ProcessingError::Io(_) => FailureKind::Io,
                        ProcessingError::Csv(ref csv) if csv.is_io_error() => FailureKind::Io,
                        _ => FailureKind::Format,
                    };
                    debug!("Cannot resolve station of {}: {}", path.display(), e);
                    Resolved::Failed(StationFailure::new(
                        &archive.tag,
                        station_id_from_path(path).as_deref(),
                        path.clone(),
                        kind,
                        e.to_string(),
                    ))
                }
            }
        };

        let resolved: Vec<Resolved> = if max_workers <= 1 {
            paths.iter().map(resolve).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(max_workers)
                .build()
                .map_err(|e| ProcessingError::Config(e.to_string()))?;
            pool.install(|| paths.par_iter().map(resolve).collect())
        };

        let mut catalog = ArchiveCatalog {
            tag: archive.tag.clone(),
            rank,
            files_found: paths.len(),
            ..Default::default()
        };
        for item in resolved {
            match item {
                Resolved::File(file) => catalog.files.push(file),
                Resolved::ExcludedByName => catalog.excluded_by_name += 1,
                Resolved::Failed(failure) => catalog.failures.push(failure),
            }
        }

        Ok(catalog)
    }
}
