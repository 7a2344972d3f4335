use crate::error::{ProcessingError, Result};
use crate::models::{FilterCriteria, StationIndex, StationMetadata};
use crate::processors::data_merger::StationPartial;
use crate::processors::record_filter::{station_rejection, Rejection};
use crate::processors::run_summary::{FailureKind, StationFailure};
use crate::readers::{ObservationReader, RowStats, StationFile};
use crate::utils::progress::ProgressReporter;
use crossbeam::channel;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One station file to read, with the metadata it is filtered against
#[derive(Debug, Clone)]
pub struct StationTask {
    pub archive_tag: String,
    pub archive_rank: usize,
    pub path: PathBuf,
    pub station: StationMetadata,
}

#[derive(Debug, Default)]
pub struct DispatchPlan {
    pub tasks: Vec<StationTask>,
    pub lookup_failures: Vec<StationFailure>,
    pub excluded_by_network: usize,
    pub outside_roi: usize,
}

#[derive(Debug, Default)]
pub struct DispatchOutput {
    pub partials: Vec<StationPartial>,
    pub failures: Vec<StationFailure>,
    pub rows: RowStats,
}

enum UnitOutcome {
    Done(StationPartial, RowStats),
    Failed(StationFailure),
}

/// Fans station reads out over a worker pool and collects their results
pub struct ParallelProcessor {
    max_workers: usize,
    cancel: Arc<AtomicBool>,
    reader: ObservationReader,
}

impl ParallelProcessor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            cancel: Arc::new(AtomicBool::new(false)),
            reader: ObservationReader::new(),
        }
    }

    /// Share a cancel flag; units not yet started when it is set are reported as cancelled
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Look up metadata for every file and drop stations no row of which could pass
    pub fn plan(
        &self,
        files: &[StationFile],
        index: &StationIndex,
        criteria: &FilterCriteria,
    ) -> DispatchPlan {
        let mut plan = DispatchPlan::default();

        for file in files {
            let Some(station) = index.get(&file.station_id) else {
                warn!(
                    "No metadata for station {} ({}), skipping",
                    file.station_id,
                    file.path.display()
                );
                plan.lookup_failures.push(StationFailure::new(
                    &file.archive_tag,
                    Some(&file.station_id),
                    file.path.clone(),
                    FailureKind::Lookup,
                    ProcessingError::StationNotFound {
                        station_id: file.station_id.clone(),
                    }
                    .to_string(),
                ));
                continue;
            };

            match station_rejection(station, criteria) {
                Some(Rejection::Network) => plan.excluded_by_network += 1,
                Some(_) => plan.outside_roi += 1,
                None => plan.tasks.push(StationTask {
                    archive_tag: file.archive_tag.clone(),
                    archive_rank: file.archive_rank,
                    path: file.path.clone(),
                    station: station.clone(),
                }),
            }
        }

        debug!(
            "Planned {} station reads ({} excluded network, {} outside ROI, {} without metadata)",
            plan.tasks.len(),
            plan.excluded_by_network,
            plan.outside_roi,
            plan.lookup_failures.len()
        );
        plan
    }

    fn process_unit(&self, task: &StationTask, criteria: &FilterCriteria) -> UnitOutcome {
        if self.cancel.load(Ordering::Relaxed) {
            return UnitOutcome::Failed(StationFailure::new(
                &task.archive_tag,
                Some(&task.station.station_id),
                task.path.clone(),
                FailureKind::Cancelled,
                "not started before cancellation",
            ));
        }

        match self.reader.read_station(&task.path, &task.station, criteria) {
            Ok(read) => UnitOutcome::Done(
                StationPartial {
                    archive_tag: task.archive_tag.clone(),
                    archive_rank: task.archive_rank,
                    station_id: task.station.station_id.clone(),
                    records: read.records,
                },
                read.stats,
            ),
            Err(e) => {
                warn!("Failed to read {}: {}", task.path.display(), e);
                let kind = match e {
                    ProcessingError::Io(_) => FailureKind::Io,
                    ProcessingError::Csv(ref csv) if csv.is_io_error() => FailureKind::Io,
                    _ => FailureKind::Format,
                };
                UnitOutcome::Failed(StationFailure::new(
                    &task.archive_tag,
                    Some(&task.station.station_id),
                    task.path.clone(),
                    kind,
                    e.to_string(),
                ))
            }
        }
    }

    /// Read every task; one failing station never aborts the others
    pub fn run(
        &self,
        tasks: Vec<StationTask>,
        criteria: &FilterCriteria,
        progress: Option<&ProgressReporter>,
    ) -> Result<DispatchOutput> {
        let total = tasks.len();
        let mut output = DispatchOutput::default();
        let mut completed = 0usize;

        let mut collect = |outcome: UnitOutcome| {
            match outcome {
                UnitOutcome::Done(partial, stats) => {
                    output.rows.merge(&stats);
                    output.partials.push(partial);
                }
                UnitOutcome::Failed(failure) => output.failures.push(failure),
            }
            completed += 1;
            if let Some(p) = progress {
                p.update(completed as u64);
            }
        };

        if self.max_workers <= 1 {
            for task in &tasks {
                collect(self.process_unit(task, criteria));
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_workers)
                .build()
                .map_err(|e| ProcessingError::Config(e.to_string()))?;

            pool.in_place_scope(|scope| {
                let (sender, receiver) = channel::unbounded();
                for task in &tasks {
                    let sender = sender.clone();
                    scope.spawn(move |_| {
                        // The collector outlives every unit, so a send only fails if it panicked
                        let _ = sender.send(self.process_unit(task, criteria));
                    });
                }
                drop(sender);

                for outcome in receiver.iter() {
                    collect(outcome);
                }
            });
        }

        info!(
            "Read {} stations: {} succeeded, {} failed",
            total,
            output.partials.len(),
            output.failures.len()
        );
        Ok(output)
    }
}

impl Default for ParallelProcessor {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}
