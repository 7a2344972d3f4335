pub mod catalog;
pub mod observation_reader;
pub mod station_reader;

pub use catalog::{list_station_files, ArchiveCatalog, StationFile};
pub use observation_reader::{
    station_id_from_path, FileLayout, ObservationReader, RowStats, StationHeader, StationRead,
};
pub use station_reader::StationReader;
