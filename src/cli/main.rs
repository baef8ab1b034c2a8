//! CLI binary entry point for customer-etl

#[cfg(feature = "cli")]
use chrono::NaiveDate;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use customer_etl::cli::commands::extract::{ExtractArgs, handle_extract};
#[cfg(feature = "cli")]
use customer_etl::cli::commands::init::{InitArgs, handle_init};
#[cfg(feature = "cli")]
use customer_etl::cli::commands::run::{RunArgs, handle_run};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "customer-etl")]
#[command(about = "Load customer batch files into partitioned staging and merge them into curated")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./customer-etl.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Extract, stage and merge one batch file
    Run {
        /// Batch file with H| header and D| data lines
        file: PathBuf,
        /// Merge date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Only merge rows last consulted more than this many days ago
        #[arg(long)]
        threshold_days: Option<i32>,
        /// Load even when some partitions cannot be created
        #[arg(long)]
        lenient: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a batch file without loading it
    Extract {
        /// Batch file with H| header and D| data lines
        file: PathBuf,
        /// Print the parsed records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the schemas and partitioned parent tables
    Init {
        /// Write a sample configuration file instead
        #[arg(long)]
        write_config: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            as_of,
            threshold_days,
            lenient,
            json,
        } => {
            let args = RunArgs {
                file,
                config: cli.config,
                as_of,
                threshold_days,
                lenient,
                json,
            };
            handle_run(&args)
        }

        Commands::Extract { file, json } => {
            let args = ExtractArgs {
                file,
                config: cli.config,
                json,
            };
            handle_extract(&args)
        }

        Commands::Init { write_config } => {
            let args = InitArgs {
                config: cli.config,
                write_config,
            };
            handle_init(&args)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
