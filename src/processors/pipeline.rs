use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result};
use crate::models::{MergedTable, StationIndex};
use crate::processors::data_merger::DataMerger;
use crate::processors::parallel_processor::ParallelProcessor;
use crate::processors::run_summary::RunSummary;
use crate::readers::{ArchiveCatalog, StationFile, StationReader};
use crate::utils::progress::ProgressReporter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: MergedTable,
    pub summary: RunSummary,
}

/// Scan archives, build the station index, read every station and merge the results
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(config),
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stop dispatching further stations; in-flight ones finish
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Scan every archive in configured order
    pub fn scan_archives(&self) -> Result<Vec<ArchiveCatalog>> {
        self.config
            .archives
            .iter()
            .enumerate()
            .map(|(rank, archive)| {
                ArchiveCatalog::scan(
                    archive,
                    rank,
                    &self.config.criteria,
                    self.config.worker_count,
                )
            })
            .collect()
    }

    /// Global tables first, then each archive's table in archive order, then
    /// metadata embedded in station files for ids still undefined.
    pub fn build_index(&self, catalogs: &[ArchiveCatalog]) -> Result<(StationIndex, usize)> {
        let reader = StationReader::with_strict(self.config.strict_metadata);
        let mut builder = StationIndex::builder(self.config.metadata_precedence);

        for path in &self.config.station_files {
            builder.extend(reader.read_stations(path)?);
        }
        for archive in &self.config.archives {
            if let Some(path) = archive.metadata_path() {
                builder.extend(reader.read_stations(&path)?);
            }
        }

        let mut embedded = 0;
        for file in catalogs.iter().flat_map(|c| c.files.iter()) {
            if let Some(station) = &file.embedded {
                if builder.add_fallback(station.clone()) {
                    embedded += 1;
                }
            }
        }
        if embedded > 0 {
            info!("Added {} stations from embedded file metadata", embedded);
        }

        let conflicts = builder.conflicts();
        let index = builder.build();
        info!("Indexed {} stations", index.len());
        Ok((index, conflicts))
    }

    /// Run the whole pipeline on the calling thread
    pub fn run_blocking(&self) -> Result<PipelineOutput> {
        self.config.validate()?;
        let criteria = &self.config.criteria;
        let mut summary = RunSummary {
            archives: self.config.archives.len(),
            ..Default::default()
        };

        let catalogs = self.scan_archives()?;
        summary.files_found = catalogs.iter().map(|c| c.files_found).sum();
        if summary.files_found == 0 {
            return Err(ProcessingError::NoInput(format!(
                "no station files found in {} archive(s)",
                catalogs.len()
            )));
        }
        for catalog in &catalogs {
            summary.stations_excluded_by_network += catalog.excluded_by_name;
            summary.failures.extend(catalog.failures.iter().cloned());
        }

        let (index, conflicts) = self.build_index(&catalogs)?;
        summary.stations_indexed = index.len();
        summary.metadata_conflicts = conflicts;

        let files: Vec<StationFile> = catalogs.into_iter().flat_map(|c| c.files).collect();
        let processor =
            ParallelProcessor::new(self.config.worker_count).with_cancel_flag(self.cancel.clone());
        let plan = processor.plan(&files, &index, criteria);
        summary.stations_excluded_by_network += plan.excluded_by_network;
        summary.stations_outside_roi += plan.outside_roi;
        summary.failures.extend(plan.lookup_failures);
        summary.stations_dispatched = plan.tasks.len();

        info!(
            "Reading {} stations with {} workers",
            plan.tasks.len(),
            processor.max_workers()
        );
        let progress = ProgressReporter::new(
            plan.tasks.len() as u64,
            "Reading stations",
            !self.show_progress,
        );
        let dispatched = processor.run(plan.tasks, criteria, Some(&progress))?;
        progress.finish_with_message("Stations read");

        summary.rows = dispatched.rows;
        summary.failures.extend(dispatched.failures);
        summary.stations_with_records = dispatched
            .partials
            .iter()
            .filter(|p| !p.records.is_empty())
            .count();

        let merged = DataMerger::with_unmatched_policy(self.config.unmatched_policy)
            .merge(dispatched.partials, &index)?;
        summary.duplicates_removed = merged.duplicates_removed;
        summary.unmatched_rows_dropped = merged.unmatched_dropped;
        summary.record_output(&merged.table);

        info!(
            "Merged {} records from {} stations",
            summary.output_rows, summary.output_stations
        );
        Ok(PipelineOutput {
            table: merged.table,
            summary,
        })
    }

    /// Run on the blocking pool, honouring the configured timeout
    pub async fn run(&self) -> Result<PipelineOutput> {
        self.run_with_limit(self.config.timeout_secs.map(Duration::from_secs))
            .await
    }

    async fn run_with_limit(&self, limit: Option<Duration>) -> Result<PipelineOutput> {
        let pipeline = self.clone();
        let mut handle = tokio::task::spawn_blocking(move || pipeline.run_blocking());

        let Some(limit) = limit else {
            return handle.await?;
        };

        match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!(
                    "Run exceeded {:?}; finishing in-flight stations and skipping the rest",
                    limit
                );
                self.cancel();
                let mut output = handle.await??;
                output.summary.timed_out = true;
                Ok(output)
            }
        }
    }
}
