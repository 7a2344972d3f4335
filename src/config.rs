use crate::error::{ProcessingError, Result};
use crate::models::{FilterCriteria, MetadataPrecedence};
use crate::processors::UnmatchedPolicy;
use crate::utils::constants::{ENV_PREFIX, GHCND_STATIONS_FILE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A directory of per-station files for one country, already extracted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceArchive {
    pub tag: String,
    pub dir: PathBuf,
    /// Metadata table for this archive; defaults to `ghcnd-stations.txt` inside `dir`
    #[serde(default)]
    pub stations: Option<PathBuf>,
}

impl SourceArchive {
    pub fn new(tag: &str, dir: impl Into<PathBuf>) -> Self {
        Self {
            tag: tag.to_string(),
            dir: dir.into(),
            stations: None,
        }
    }

    pub fn with_stations(mut self, stations: impl Into<PathBuf>) -> Self {
        self.stations = Some(stations.into());
        self
    }

    /// Explicit metadata table, or the archive's own ghcnd-stations.txt when present
    pub fn metadata_path(&self) -> Option<PathBuf> {
        self.stations.clone().or_else(|| {
            let candidate = self.dir.join(GHCND_STATIONS_FILE);
            candidate.is_file().then_some(candidate)
        })
    }
}

/// Parses `TAG=DIR`
impl FromStr for SourceArchive {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((tag, dir)) if !tag.trim().is_empty() && !dir.trim().is_empty() => {
                Ok(Self::new(tag.trim(), dir.trim()))
            }
            _ => Err(ProcessingError::Config(format!(
                "Archive must be given as TAG=DIR, got '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Archives in precedence order
    pub archives: Vec<SourceArchive>,
    /// Metadata tables consulted before any archive's own table
    pub station_files: Vec<PathBuf>,
    pub criteria: FilterCriteria,
    pub worker_count: usize,
    pub metadata_precedence: MetadataPrecedence,
    pub unmatched_policy: UnmatchedPolicy,
    pub timeout_secs: Option<u64>,
    /// Fail on malformed metadata rows instead of skipping them
    pub strict_metadata: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archives: Vec::new(),
            station_files: Vec::new(),
            criteria: FilterCriteria::default(),
            worker_count: num_cpus::get(),
            metadata_precedence: MetadataPrecedence::default(),
            unmatched_policy: UnmatchedPolicy::default(),
            timeout_secs: None,
            strict_metadata: false,
        }
    }
}

impl PipelineConfig {
    /// Layer an optional config file under `GHCN__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        self.criteria.validate()?;

        if self.archives.is_empty() {
            return Err(ProcessingError::Config(
                "At least one source archive is required".to_string(),
            ));
        }

        let mut tags = HashSet::new();
        for archive in &self.archives {
            if archive.tag.trim().is_empty() {
                return Err(ProcessingError::Config(format!(
                    "Archive {} has an empty tag",
                    archive.dir.display()
                )));
            }
            if !tags.insert(archive.tag.as_str()) {
                return Err(ProcessingError::Config(format!(
                    "Archive tag '{}' is used twice",
                    archive.tag
                )));
            }
            if !archive.dir.is_dir() {
                return Err(ProcessingError::Config(format!(
                    "Archive directory does not exist: {}",
                    archive.dir.display()
                )));
            }
            if let Some(stations) = &archive.stations {
                if !stations.is_file() {
                    return Err(ProcessingError::Config(format!(
                        "Station metadata file does not exist: {}",
                        stations.display()
                    )));
                }
            }
        }

        if let Some(missing) = self.station_files.iter().find(|p| !p.is_file()) {
            return Err(ProcessingError::Config(format!(
                "Station metadata file does not exist: {}",
                missing.display()
            )));
        }

        if self.timeout_secs == Some(0) {
            return Err(ProcessingError::Config(
                "Timeout must be at least one second".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_archive_from_str() {
        let archive: SourceArchive = "US=/data/us_stations".parse().unwrap();
        assert_eq!(archive.tag, "US");
        assert_eq!(archive.dir, PathBuf::from("/data/us_stations"));
        assert!("/data/us_stations".parse::<SourceArchive>().is_err());
        assert!("=/data".parse::<SourceArchive>().is_err());
    }

    #[test]
    fn test_metadata_path_autodetect() -> Result<()> {
        let dir = TempDir::new()?;
        let archive = SourceArchive::new("US", dir.path());
        assert_eq!(archive.metadata_path(), None);

        std::fs::write(dir.path().join(GHCND_STATIONS_FILE), "")?;
        assert_eq!(
            archive.metadata_path(),
            Some(dir.path().join(GHCND_STATIONS_FILE))
        );

        let explicit = archive.with_stations("/elsewhere/stations.csv");
        assert_eq!(
            explicit.metadata_path(),
            Some(PathBuf::from("/elsewhere/stations.csv"))
        );
        Ok(())
    }

    #[test]
    fn test_load_from_toml() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
worker_count = 4
metadata_precedence = "last"
unmatched_policy = "fail"

[[archives]]
tag = "US"
dir = "/data/us"

[[archives]]
tag = "MX"
dir = "/data/mx"
stations = "/data/mx-stations.txt"

[criteria]
target_element = "PRCP"
excluded_network_prefixes = ["US1"]
allowed_mflags = ["B", "N", "S", "T"]
reject_flagged = true

[criteria.roi]
lat_min = 30.0
lat_max = 38.0
lon_min = -115.5
lon_max = -108.0

[criteria.date_range]
start = "2005-01-01"
end = "2024-12-31"
"#
        )?;

        let config = PipelineConfig::load(Some(file.path()))?;

        assert_eq!(config.worker_count, 4);
        assert_eq!(config.metadata_precedence, MetadataPrecedence::Last);
        assert_eq!(config.unmatched_policy, UnmatchedPolicy::Fail);
        assert_eq!(config.archives.len(), 2);
        assert_eq!(config.archives[1].stations, Some(PathBuf::from("/data/mx-stations.txt")));
        assert_eq!(config.criteria.excluded_network_prefixes, vec!["US1".to_string()]);
        assert!(config.criteria.reject_flagged);
        assert_eq!(config.criteria.allowed_mflags.len(), 4);
        assert_eq!(config.criteria.roi.unwrap().lon_min, -115.5);
        assert!(config.criteria.date_range.is_some());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_setup() -> Result<()> {
        let dir = TempDir::new()?;

        let config = PipelineConfig::default();
        assert!(matches!(config.validate(), Err(ProcessingError::Config(_))));

        let config = PipelineConfig {
            archives: vec![
                SourceArchive::new("US", dir.path()),
                SourceArchive::new("US", dir.path()),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            archives: vec![SourceArchive::new("US", dir.path().join("missing"))],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            archives: vec![SourceArchive::new("US", dir.path())],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        Ok(())
    }
}
