use crate::models::BoundingBox;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StationMetadata {
    #[validate(length(min = 1))]
    pub station_id: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    pub elevation: Option<f64>,

    pub name: String,
}

impl StationMetadata {
    pub fn new(
        station_id: String,
        latitude: f64,
        longitude: f64,
        elevation: Option<f64>,
        name: String,
    ) -> Self {
        Self {
            station_id,
            latitude,
            longitude,
            elevation,
            name,
        }
    }

    pub fn is_within(&self, roi: &BoundingBox) -> bool {
        roi.contains(self.latitude, self.longitude)
    }

    /// True when two definitions of the same station disagree on location or name
    pub fn conflicts_with(&self, other: &StationMetadata) -> bool {
        self.latitude != other.latitude
            || self.longitude != other.longitude
            || self.name != other.name
    }
}

/// Which definition wins when a station id appears in more than one metadata source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPrecedence {
    /// Keep the definition from the earliest source (archive order)
    #[default]
    First,
    /// Let later sources replace earlier definitions
    Last,
}

/// Immutable station lookup, shared read-only with every worker
#[derive(Debug, Clone, Default)]
pub struct StationIndex {
    stations: HashMap<String, StationMetadata>,
}

impl StationIndex {
    pub fn builder(precedence: MetadataPrecedence) -> StationIndexBuilder {
        StationIndexBuilder::new(precedence)
    }

    /// Build an index where the first occurrence of each id wins
    pub fn from_stations<I>(stations: I) -> Self
    where
        I: IntoIterator<Item = StationMetadata>,
    {
        let mut builder = StationIndexBuilder::new(MetadataPrecedence::First);
        builder.extend(stations);
        builder.build()
    }

    pub fn get(&self, station_id: &str) -> Option<&StationMetadata> {
        self.stations.get(station_id)
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.contains_key(station_id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationMetadata> {
        self.stations.values()
    }

    /// Stations sorted by id
    pub fn sorted(&self) -> Vec<&StationMetadata> {
        let mut stations: Vec<_> = self.stations.values().collect();
        stations.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        stations
    }
}

pub struct StationIndexBuilder {
    precedence: MetadataPrecedence,
    stations: HashMap<String, StationMetadata>,
    conflicts: usize,
}

impl StationIndexBuilder {
    pub fn new(precedence: MetadataPrecedence) -> Self {
        Self {
            precedence,
            stations: HashMap::new(),
            conflicts: 0,
        }
    }

    /// Add one definition; returns true if it is now the indexed definition
    pub fn add(&mut self, station: StationMetadata) -> bool {
        match self.stations.get_mut(&station.station_id) {
            None => {
                self.stations.insert(station.station_id.clone(), station);
                true
            }
            Some(existing) => {
                if existing.conflicts_with(&station) {
                    self.conflicts += 1;
                    warn!(
                        "Conflicting metadata for station {}: ({}, {}) '{}' vs ({}, {}) '{}', keeping {:?}",
                        station.station_id,
                        existing.latitude,
                        existing.longitude,
                        existing.name,
                        station.latitude,
                        station.longitude,
                        station.name,
                        self.precedence
                    );
                } else {
                    debug!("Duplicate metadata for station {}", station.station_id);
                }

                match self.precedence {
                    MetadataPrecedence::First => false,
                    MetadataPrecedence::Last => {
                        *existing = station;
                        true
                    }
                }
            }
        }
    }

    /// Add definitions only for ids not yet present, whatever the precedence
    pub fn add_fallback(&mut self, station: StationMetadata) -> bool {
        if self.stations.contains_key(&station.station_id) {
            return false;
        }
        self.stations.insert(station.station_id.clone(), station);
        true
    }

    pub fn extend<I>(&mut self, stations: I)
    where
        I: IntoIterator<Item = StationMetadata>,
    {
        for station in stations {
            self.add(station);
        }
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.contains_key(station_id)
    }

    /// Number of definitions that disagreed with an earlier one
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }

    pub fn build(self) -> StationIndex {
        StationIndex {
            stations: self.stations,
        }
    }
}
