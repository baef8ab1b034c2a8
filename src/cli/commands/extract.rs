//! Extract command: parse and validate a batch file without loading it

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::commands::load_config;
use crate::cli::error::CliError;
use crate::extract::extract_file;
use crate::logging::init_tracing;
use crate::models::{Batch, CustomerRecord, PartitionKey};

/// Extract command arguments
#[derive(Debug, Clone)]
pub struct ExtractArgs {
    pub file: PathBuf,
    pub config: Option<PathBuf>,
    /// Print the parsed records as JSON
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractSummary<'a> {
    source: &'a PathBuf,
    sha256: &'a str,
    columns: &'a [String],
    countries: Vec<PartitionKey>,
    records: &'a [CustomerRecord],
}

/// Handle the extract command
pub fn handle_extract(args: &ExtractArgs) -> Result<(), CliError> {
    if !args.file.exists() {
        return Err(CliError::FileNotFound(args.file.clone()));
    }

    let config = load_config(args.config.as_deref())?;
    init_tracing(&config.logging)?;

    let extracted = extract_file(&args.file)?;
    let batch = Batch::from_raw(&extracted.batch, &config.pipeline.date_formats)?;

    if args.json {
        let summary = ExtractSummary {
            source: &args.file,
            sha256: &extracted.sha256,
            columns: batch.columns(),
            countries: batch.countries().into_iter().collect(),
            records: batch.records(),
        };
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::SerializationError(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    println!("{}: {} records", args.file.display(), batch.len());
    println!("  SHA256:    {}", extracted.sha256);
    println!("  Columns:   {}", batch.columns().join(", "));
    let countries: Vec<String> = batch.countries().iter().map(|c| c.to_string()).collect();
    println!("  Countries: {}", countries.join(", "));

    Ok(())
}
