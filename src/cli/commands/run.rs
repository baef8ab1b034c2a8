//! Run command: extract, load staging, merge into curated

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::cli::commands::{load_config, open_backend, runtime};
use crate::cli::error::CliError;
use crate::logging::init_tracing;
use crate::pipeline::{EtlPipeline, PipelineReport, PipelineSettings};

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Batch file to load
    pub file: PathBuf,
    /// Configuration file; `customer-etl.toml` when unset
    pub config: Option<PathBuf>,
    /// Merge date override
    pub as_of: Option<NaiveDate>,
    /// Eligibility threshold override
    pub threshold_days: Option<i32>,
    /// Load even when some partitions cannot be created
    pub lenient: bool,
    /// Print the report as JSON
    pub json: bool,
}

/// Handle the run command
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    if !args.file.exists() {
        return Err(CliError::FileNotFound(args.file.clone()));
    }

    let config = load_config(args.config.as_deref())?;
    init_tracing(&config.logging)?;

    let mut settings = PipelineSettings::from(&config);
    settings.as_of = args.as_of;
    if let Some(days) = args.threshold_days {
        settings.threshold_days = days;
    }
    if args.lenient {
        settings.strict_partitions = false;
    }

    let rt = runtime()?;
    let report = rt.block_on(async {
        let backend = open_backend(&config).await?;
        let pipeline = EtlPipeline::new(backend.as_ref(), settings);
        Ok::<_, CliError>(pipeline.run(&args.file).await?)
    })?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::SerializationError(e.to_string()))?;
        println!("{}", json);
    } else {
        print_summary(&report);
    }

    Ok(())
}

fn print_summary(report: &PipelineReport) {
    println!("Run {}", report.run_id);
    println!(
        "  Extracted: {} records from {}",
        report.records_extracted,
        report.source.display()
    );
    println!(
        "  Staged:    {} rows into {}.{}",
        report.load.rows_loaded, report.load.schema, report.load.table
    );
    for failed in report.load.failed_partitions() {
        println!("  Partition {} in {} failed", failed.key, failed.schema);
    }
    println!(
        "  Merged:    {} rows into {} (as of {}, threshold {} days)",
        report.merge.rows_upserted,
        report.merge.curated,
        report.merge.as_of,
        report.merge.threshold_days
    );
    println!("  Took {}ms", report.duration_ms);
}
