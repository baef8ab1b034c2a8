//! Staging loader
//!
//! Loads one batch into the staging table. Before any write, every
//! distinct country of the batch gets a partition in the staging schema
//! and in the curated schema. The load itself replaces the staging
//! contents in one transaction.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::{DatabaseError, WarehouseBackend};
use crate::models::{Batch, PartitionKey, STAGING_COLUMNS};
use crate::partition::{PartitionManager, PartitionOutcome};
use crate::validation::{ValidationError, validate_identifier};

/// Errors raised by a staging load
#[derive(Debug, Error)]
pub enum StagingError {
    /// Batch columns do not line up with the staging columns
    #[error("Batch columns {found:?} do not match staging columns {expected:?}")]
    Schema {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Partitions could not be ensured and the load is strict
    #[error("Failed to ensure partitions: {}", .failures.join("; "))]
    Partition { failures: Vec<String> },

    /// Schema or table name is not a valid identifier
    #[error("Invalid staging target: {0}")]
    InvalidIdentifier(#[from] ValidationError),

    /// Delete or bulk insert failed; staging is unchanged
    #[error("Staging load failed: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type for staging loads
pub type StagingResult<T> = Result<T, StagingError>;

/// Staging load settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Schema of the curated parent that also needs the partitions
    pub curated_schema: String,
    /// Abort before writing when any partition cannot be ensured
    pub strict_partitions: bool,
}

impl LoadOptions {
    pub fn new(curated_schema: impl Into<String>) -> Self {
        Self {
            curated_schema: curated_schema.into(),
            strict_partitions: true,
        }
    }

    /// Proceed with the load even when partitions fail
    pub fn lenient(mut self) -> Self {
        self.strict_partitions = false;
        self
    }
}

/// Partition outcome for one key in one schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionReport {
    pub schema: String,
    pub key: PartitionKey,
    pub outcome: PartitionOutcome,
}

/// Outcome of a staging load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub schema: String,
    pub table: String,
    pub rows_loaded: u64,
    pub partitions: Vec<PartitionReport>,
}

impl LoadReport {
    /// Partitions that could not be ensured
    pub fn failed_partitions(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions.iter().filter(|p| !p.outcome.is_success())
    }
}

/// Partition-aware staging loader
pub struct StagingLoader<'a, B: WarehouseBackend + ?Sized> {
    backend: &'a B,
    options: LoadOptions,
}

impl<'a, B: WarehouseBackend + ?Sized> StagingLoader<'a, B> {
    /// Create a new staging loader over `backend`
    pub fn new(backend: &'a B, options: LoadOptions) -> Self {
        Self { backend, options }
    }

    /// Replace the contents of `schema.table` with `batch`.
    pub async fn load(&self, batch: &Batch, table: &str, schema: &str) -> StagingResult<LoadReport> {
        info!("Loading {} records into {}.{}", batch.len(), schema, table);

        validate_identifier("table", table)?;
        validate_identifier("staging schema", schema)?;
        validate_identifier("curated schema", &self.options.curated_schema)?;

        if batch.columns().iter().map(String::as_str).ne(STAGING_COLUMNS) {
            let err = StagingError::Schema {
                expected: STAGING_COLUMNS.iter().map(|c| c.to_string()).collect(),
                found: batch.columns().to_vec(),
            };
            error!("Error during loading data into {}.{}: {}", schema, table, err);
            return Err(err);
        }

        let partitions = self.ensure_partitions(batch, table, schema).await;

        let failures: Vec<String> = partitions
            .iter()
            .filter_map(|p| match &p.outcome {
                PartitionOutcome::Failed { reason } => {
                    Some(format!("{} in {}: {}", p.key, p.schema, reason))
                }
                _ => None,
            })
            .collect();

        if !failures.is_empty() {
            if self.options.strict_partitions {
                let err = StagingError::Partition { failures };
                error!("Error during loading data into {}.{}: {}", schema, table, err);
                return Err(err);
            }
            warn!(
                "{} partition(s) could not be ensured, loading anyway",
                failures.len()
            );
        }

        let rows_loaded = self
            .backend
            .replace_staging(schema, table, batch.records())
            .await
            .inspect_err(|e| {
                error!("Error during loading data into {}.{}: {}", schema, table, e);
            })?;

        info!("Data loaded into {}.{} successfully", schema, table);

        Ok(LoadReport {
            schema: schema.to_string(),
            table: table.to_string(),
            rows_loaded,
            partitions,
        })
    }

    async fn ensure_partitions(&self, batch: &Batch, table: &str, schema: &str) -> Vec<PartitionReport> {
        let manager = PartitionManager::new(self.backend);
        let mut reports = Vec::new();

        for key in batch.countries() {
            for target_schema in [schema, self.options.curated_schema.as_str()] {
                let outcome = manager.ensure_key(&key, table, target_schema).await;
                reports.push(PartitionReport {
                    schema: target_schema.to_string(),
                    key: key.clone(),
                    outcome,
                });
            }
        }

        reports
    }
}
