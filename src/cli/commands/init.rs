//! Init command: write a sample configuration, create the parent tables

use std::path::PathBuf;

use tracing::info;

use crate::cli::commands::{load_config, open_backend, runtime};
use crate::cli::error::CliError;
use crate::database::config::{CONFIG_FILENAME, sample_config};
use crate::logging::init_tracing;

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    pub config: Option<PathBuf>,
    /// Write a sample configuration file instead of touching the database
    pub write_config: bool,
}

/// Handle the init command
pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    if args.write_config {
        let path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
        if path.exists() {
            return Err(CliError::InvalidArgument(format!(
                "{} already exists",
                path.display()
            )));
        }
        std::fs::write(&path, sample_config())
            .map_err(|e| CliError::FileWriteError(path.clone(), e.to_string()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    init_tracing(&config.logging)?;
    let layout = config.layout();

    let rt = runtime()?;
    rt.block_on(async {
        let backend = open_backend(&config).await?;
        backend.initialize(&layout).await?;
        info!("Initialized {} backend", backend.backend_type());
        Ok::<_, CliError>(())
    })?;

    println!(
        "Ready: {}.{} and {}.{}",
        layout.staging_schema, layout.table, layout.curated_schema, layout.table
    );
    Ok(())
}
