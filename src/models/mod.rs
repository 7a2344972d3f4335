pub mod criteria;
pub mod merged;
pub mod observation;
pub mod station;

pub use criteria::{BoundingBox, DateRange, FilterCriteria};
pub use merged::{MergedRecord, MergedTable, ValueStats};
pub use observation::{FilteredRecord, RawObservation};
pub use station::{MetadataPrecedence, StationIndex, StationIndexBuilder, StationMetadata};
