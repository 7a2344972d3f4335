use crate::config::{PipelineConfig, SourceArchive};
use crate::error::Result;
use crate::models::criteria::parse_flag_set;
use crate::models::{BoundingBox, DateRange, MetadataPrecedence};
use crate::processors::UnmatchedPolicy;
use crate::utils::constants::COCORAHS_PREFIX;
use crate::writers::OutputFormat;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ghcn-processor")]
#[command(about = "Filter and merge GHCN-Daily station observations into one table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Only log warnings and errors")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Filter station files from one or more archives and merge them
    Process(ProcessArgs),

    /// List indexed stations that pass the network and region filters
    Stations(StationsArgs),

    /// Display information about a Parquet output file
    Info {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "10")]
        sample: usize,
    },
}

/// Station-level selection shared by `process` and `stations`
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    #[arg(short, long, help = "Config file (TOML, YAML or JSON); GHCN__* env vars override it")]
    pub config: Option<PathBuf>,

    #[arg(
        short,
        long = "archive",
        value_name = "TAG=DIR",
        help = "Directory of per-station files, in precedence order (repeatable)"
    )]
    pub archives: Vec<SourceArchive>,

    #[arg(
        long = "stations",
        value_name = "FILE",
        help = "Station metadata table consulted before the archives' own (repeatable)"
    )]
    pub station_files: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "LAT_MIN,LAT_MAX,LON_MIN,LON_MAX",
        allow_hyphen_values = true,
        help = "Inclusive region of interest"
    )]
    pub roi: Option<BoundingBox>,

    #[arg(long = "exclude-prefix", value_name = "PREFIX", help = "Exclude station ids with this prefix (repeatable)")]
    pub exclude_prefixes: Vec<String>,

    #[arg(long, help = "Exclude the CoCoRaHS volunteer network (US1*)")]
    pub exclude_cocorahs: bool,

    #[arg(long, value_enum, help = "Which definition wins for a station defined twice [default: first]")]
    pub precedence: Option<MetadataPrecedence>,

    #[arg(long, help = "Fail on malformed metadata rows instead of skipping them")]
    pub strict_metadata: bool,
}

impl SelectionArgs {
    /// Config file and environment first, then command-line overrides
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;

        if !self.archives.is_empty() {
            config.archives = self.archives.clone();
        }
        config.station_files.extend(self.station_files.iter().cloned());
        if let Some(roi) = self.roi {
            config.criteria.roi = Some(roi);
        }

        let mut criteria = std::mem::take(&mut config.criteria);
        for prefix in &self.exclude_prefixes {
            criteria = criteria.with_excluded_prefix(prefix);
        }
        if self.exclude_cocorahs {
            criteria = criteria.with_excluded_prefix(COCORAHS_PREFIX);
        }
        config.criteria = criteria;

        if let Some(precedence) = self.precedence {
            config.metadata_precedence = precedence;
        }
        if self.strict_metadata {
            config.strict_metadata = true;
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long, help = "First date to keep (YYYY-MM-DD)")]
    pub start: Option<NaiveDate>,

    #[arg(long, help = "Last date to keep (YYYY-MM-DD)")]
    pub end: Option<NaiveDate>,

    #[arg(short, long, help = "Element code to extract [default: PRCP]")]
    pub element: Option<String>,

    #[arg(long, value_name = "FLAGS", help = "Quality flags allowed through QC, e.g. 'D,G'")]
    pub allowed_qflags: Option<String>,

    #[arg(long, help = "Reject every quality-flagged row not explicitly allowed")]
    pub strict_qc: bool,

    #[arg(long, value_name = "FLAGS", help = "Measurement flags allowed through, e.g. 'B,N,S,T'")]
    pub allowed_mflags: Option<String>,

    #[arg(long, value_name = "FLAGS", help = "Measurement flags reported as zero, e.g. 'T,S'")]
    pub trace_mflags: Option<String>,

    #[arg(short, long, help = "Worker threads [default: number of CPUs]")]
    pub workers: Option<usize>,

    #[arg(long, value_enum, help = "What to do with rows whose station has no metadata [default: drop]")]
    pub unmatched: Option<UnmatchedPolicy>,

    #[arg(long, help = "Stop dispatching stations after this many seconds")]
    pub timeout_secs: Option<u64>,

    #[arg(
        short,
        long,
        help = "Output file path [default: output/ghcn-{element}-{YYMMDD}.csv]"
    )]
    pub output: Option<PathBuf>,

    #[arg(short, long, value_enum, help = "Output format [default: from the output extension]")]
    pub format: Option<OutputFormat>,

    #[arg(long, default_value = "snappy", help = "Parquet compression")]
    pub compression: String,

    #[arg(long, help = "Also write the run summary as JSON")]
    pub summary_json: Option<PathBuf>,

    #[arg(long, help = "Show a progress bar")]
    pub progress: bool,
}

impl ProcessArgs {
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = self.selection.to_config()?;
        let mut criteria = std::mem::take(&mut config.criteria);

        if let Some(element) = &self.element {
            criteria = criteria.with_target_element(element);
        }
        if self.start.is_some() || self.end.is_some() {
            let current = criteria.date_range;
            criteria.date_range = DateRange::open(
                self.start.or(current.map(|r| r.start)),
                self.end.or(current.map(|r| r.end)),
            );
        }
        if let Some(flags) = &self.allowed_qflags {
            criteria = criteria.with_allowed_qflags(parse_flag_set(flags)?);
        }
        if self.strict_qc {
            criteria = criteria.with_reject_flagged(true);
        }
        if let Some(flags) = &self.allowed_mflags {
            criteria = criteria.with_allowed_mflags(parse_flag_set(flags)?);
        }
        if let Some(flags) = &self.trace_mflags {
            criteria = criteria.with_trace_mflags(parse_flag_set(flags)?);
        }
        config.criteria = criteria;

        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(policy) = self.unmatched {
            config.unmatched_policy = policy;
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }
        Ok(config)
    }

    /// Explicit format, else inferred from the output path
    pub fn output_format(&self) -> OutputFormat {
        match (self.format, &self.output) {
            (Some(format), _) => format,
            (None, Some(path)) => OutputFormat::from_path(path),
            (None, None) => OutputFormat::Csv,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct StationsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(short, long, help = "Write the station list here instead of stdout")]
    pub output: Option<PathBuf>,
}
