//! Customer ETL - batch loads of customer vaccination records
//!
//! Provides:
//! - Extraction of `H|`/`D|` pipe-delimited batch files into typed batches
//! - Per-country partition management for staging and curated tables
//! - Staging loads that replace the previous batch in one transaction
//! - Incremental merge of the latest observation per customer into curated
//! - PostgreSQL and in-memory warehouse backends

#[cfg(feature = "cli")]
pub mod cli;
pub mod database;
pub mod extract;
pub mod logging;
pub mod merge;
pub mod models;
pub mod partition;
pub mod pipeline;
pub mod staging;
pub mod validation;

// Re-export commonly used types
pub use database::{
    DatabaseError, DatabaseResult, MemoryBackend, PipelineConfig, TableLayout, WarehouseBackend,
};
#[cfg(feature = "postgres-backend")]
pub use database::PostgresBackend;
pub use extract::{ExtractError, ExtractedFile, extract_file};
pub use merge::{MergeEngine, MergeError, MergeOptions, MergeReport};
pub use models::{Batch, BatchError, CuratedRecord, CustomerRecord, PartitionKey};
pub use partition::{PartitionManager, PartitionOutcome};
pub use pipeline::{EtlPipeline, PipelineError, PipelineReport, PipelineSettings};
pub use staging::{LoadOptions, LoadReport, StagingError, StagingLoader};
