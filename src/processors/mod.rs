pub mod data_merger;
pub mod parallel_processor;
pub mod pipeline;
pub mod record_filter;
pub mod run_summary;

pub use data_merger::{DataMerger, MergeOutput, StationPartial, UnmatchedPolicy};
pub use parallel_processor::{DispatchOutput, DispatchPlan, ParallelProcessor, StationTask};
pub use pipeline::{Pipeline, PipelineOutput};
pub use record_filter::{admit, evaluate, station_rejection, Rejection, RejectionCounts};
pub use run_summary::{FailureKind, RunSummary, StationFailure};
