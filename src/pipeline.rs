//! End-to-end pipeline: extract, load staging, merge into curated
//!
//! Steps run strictly one after the other. A failed step stops the run;
//! everything already committed stays committed, and a re-run of the same
//! file is safe.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::database::{PipelineConfig, WarehouseBackend};
use crate::extract::{ExtractError, extract_file};
use crate::merge::{MergeEngine, MergeError, MergeOptions, MergeReport};
use crate::models::{Batch, BatchError};
use crate::staging::{LoadOptions, LoadReport, StagingError, StagingLoader};

/// Errors raised by a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Invalid batch: {0}")]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Result type for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Settings for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub table: String,
    pub staging_schema: String,
    pub curated_schema: String,
    pub strict_partitions: bool,
    pub date_formats: Vec<String>,
    pub threshold_days: i32,
    /// Merge date; today when unset
    pub as_of: Option<NaiveDate>,
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            table: config.pipeline.table.clone(),
            staging_schema: config.pipeline.staging_schema.clone(),
            curated_schema: config.pipeline.curated_schema.clone(),
            strict_partitions: config.pipeline.strict_partitions,
            date_formats: config.pipeline.date_formats.clone(),
            threshold_days: config.merge.threshold_days,
            as_of: None,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    /// SHA256 of the source file, hex encoded
    pub source_sha256: String,
    pub records_extracted: usize,
    pub load: LoadReport,
    pub merge: MergeReport,
    pub duration_ms: u64,
}

/// Batch ETL pipeline over a warehouse backend
pub struct EtlPipeline<'a, B: WarehouseBackend + ?Sized> {
    backend: &'a B,
    settings: PipelineSettings,
}

impl<'a, B: WarehouseBackend + ?Sized> EtlPipeline<'a, B> {
    pub fn new(backend: &'a B, settings: PipelineSettings) -> Self {
        Self { backend, settings }
    }

    /// Read `path` and build a validated batch.
    ///
    /// # Returns
    /// The batch and the SHA256 of the file
    pub fn extract(&self, path: &Path) -> PipelineResult<(Batch, String)> {
        let extracted = extract_file(path)?;
        let batch = Batch::from_raw(&extracted.batch, &self.settings.date_formats)
            .inspect_err(|e| tracing::error!("Invalid batch in {}: {}", path.display(), e))?;
        Ok((batch, extracted.sha256))
    }

    /// Replace staging with `batch`, ensuring partitions first.
    pub async fn load_staging(&self, batch: &Batch) -> PipelineResult<LoadReport> {
        let options = LoadOptions {
            curated_schema: self.settings.curated_schema.clone(),
            strict_partitions: self.settings.strict_partitions,
        };
        let loader = StagingLoader::new(self.backend, options);
        Ok(loader
            .load(batch, &self.settings.table, &self.settings.staging_schema)
            .await?)
    }

    /// Merge staging into curated.
    pub async fn incremental_merge(&self) -> PipelineResult<MergeReport> {
        let mut options = MergeOptions::new(self.settings.curated_schema.clone())
            .threshold_days(self.settings.threshold_days);
        if let Some(as_of) = self.settings.as_of {
            options = options.as_of(as_of);
        }

        let engine = MergeEngine::new(self.backend, options);
        Ok(engine
            .merge(&self.settings.table, &self.settings.staging_schema)
            .await?)
    }

    /// Run all three steps for one file.
    pub async fn run(&self, path: &Path) -> PipelineResult<PipelineReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", %run_id, backend = self.backend.backend_type());

        async {
            let started = Instant::now();
            info!("Starting run for {}", path.display());

            let (batch, source_sha256) = self.extract(path)?;
            let load = self.load_staging(&batch).await?;
            let merge = self.incremental_merge().await?;

            let duration_ms = started.elapsed().as_millis() as u64;
            info!(duration_ms, "ETL pipeline completed");

            Ok::<_, PipelineError>(PipelineReport {
                run_id,
                source: path.to_path_buf(),
                source_sha256,
                records_extracted: batch.len(),
                load,
                merge,
                duration_ms,
            })
        }
        .instrument(span)
        .await
    }
}
