use crate::cli::args::{Cli, Commands, ProcessArgs, StationsArgs};
use crate::error::{ProcessingError, Result};
use crate::models::StationMetadata;
use crate::processors::{station_rejection, Pipeline, PipelineOutput};
use crate::utils::{generate_default_output_filename, setup_logging, ProgressReporter};
use crate::writers::{CsvWriter, OutputFormat, ParquetWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Process(args) => process(args, cli.quiet).await,
        Commands::Stations(args) => list_stations(args, cli.quiet),
        Commands::Info { file, sample } => show_info(&file, sample),
    }
}

async fn process(args: ProcessArgs, quiet: bool) -> Result<()> {
    let config = args.to_config()?;
    config.validate()?;

    let format = args.output_format();
    let output_file = args.output.clone().unwrap_or_else(|| {
        generate_default_output_filename(&config.criteria.target_element, format)
    });
    // Bad compression names fail before any file is read
    let parquet_writer = match format {
        OutputFormat::Parquet => Some(ParquetWriter::new().with_compression(&args.compression)?),
        OutputFormat::Csv => None,
    };

    if !quiet {
        println!("Processing {} observations...", config.criteria.target_element);
        for archive in &config.archives {
            println!("Archive {}: {}", archive.tag, archive.dir.display());
        }
        println!("Output file: {}", output_file.display());
        println!("Workers: {}", config.worker_count);
    }

    let pipeline = Pipeline::new(config).with_progress(args.progress && !quiet);
    let PipelineOutput { table, summary } = tokio::select! {
        result = pipeline.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling run; no output will be written");
            pipeline.cancel();
            return Err(ProcessingError::Cancelled);
        }
    };

    if !quiet {
        println!("\n{}", summary.generate_summary());
    }

    match parquet_writer {
        Some(writer) => {
            writer.write_records(table.rows(), &output_file)?;
            if !quiet {
                println!("{}", writer.get_file_info(&output_file)?.summary());
            }
        }
        None => CsvWriter::new().write_records(table.rows(), &output_file)?,
    }
    info!("Wrote {} records to {}", table.len(), output_file.display());

    if let Some(path) = &args.summary_json {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &summary)?;
        info!("Run summary written to {}", path.display());
    }

    if !quiet {
        println!("Processing complete!");
    }
    Ok(())
}

fn list_stations(args: StationsArgs, quiet: bool) -> Result<()> {
    let config = args.selection.to_config()?;
    config.criteria.validate()?;
    if config.archives.is_empty() && config.station_files.is_empty() {
        return Err(ProcessingError::Config(
            "Give at least one --stations table or --archive".to_string(),
        ));
    }

    let spinner = ProgressReporter::new_spinner("Scanning archives", quiet);
    let pipeline = Pipeline::new(config);
    let catalogs = pipeline.scan_archives()?;
    spinner.set_message("Reading station metadata");
    let (index, _) = pipeline.build_index(&catalogs)?;
    spinner.finish_with_message("Station metadata loaded");

    let criteria = &pipeline.config().criteria;
    let selected: Vec<&StationMetadata> = index
        .sorted()
        .into_iter()
        .filter(|station| station_rejection(station, criteria).is_none())
        .collect();
    info!("{} of {} stations selected", selected.len(), index.len());

    let writer = CsvWriter::new();
    match &args.output {
        Some(path) => writer.write_stations_to(&selected, BufWriter::new(File::create(path)?)),
        None => writer.write_stations_to(&selected, std::io::stdout().lock()),
    }
}

fn show_info(file: &Path, sample: usize) -> Result<()> {
    println!("Analyzing Parquet file: {}", file.display());

    let writer = ParquetWriter::new();
    let file_info = writer.get_file_info(file)?;
    println!("\nFile Details:");
    println!("{}", file_info.summary());

    if sample > 0 {
        let records = writer.read_sample_records(file, sample)?;
        println!("\nSample Records (showing {} records):", records.len());
        for record in &records {
            println!(
                "  {} {} {:>6} [{}{}{}] {} ({:.4}, {:.4})",
                record.station_id,
                record.date,
                record.value,
                record.mflag.unwrap_or(' '),
                record.qflag.unwrap_or(' '),
                record.sflag.unwrap_or(' '),
                record.name,
                record.latitude,
                record.longitude
            );
        }
    }

    Ok(())
}
