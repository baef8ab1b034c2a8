//! CLI command implementations

pub mod extract;
pub mod init;
pub mod run;

use std::path::Path;

use tracing::info;

use crate::cli::error::CliError;
use crate::database::config::{DatabaseBackendType, PipelineConfig};
use crate::database::{DatabaseError, MemoryBackend, WarehouseBackend};

/// Load configuration from `path`, or the default location
pub(crate) fn load_config(path: Option<&Path>) -> Result<PipelineConfig, CliError> {
    PipelineConfig::load(path).map_err(|e| CliError::ConfigError(e.to_string()))
}

/// Single-threaded runtime; pipeline steps never run concurrently
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

/// Open the configured backend and check that it answers.
///
/// The in-memory store starts empty, so its parent tables are created
/// right away.
pub(crate) async fn open_backend(
    config: &PipelineConfig,
) -> Result<Box<dyn WarehouseBackend>, CliError> {
    let backend = connect(config).await?;
    if !backend.health_check().await? {
        return Err(DatabaseError::ConnectionFailed(format!(
            "{} backend failed its health check",
            backend.backend_type()
        ))
        .into());
    }
    Ok(backend)
}

async fn connect(config: &PipelineConfig) -> Result<Box<dyn WarehouseBackend>, CliError> {
    match config.database.backend {
        DatabaseBackendType::Memory => {
            info!("Using in-memory backend; nothing will be persisted");
            let backend = MemoryBackend::new();
            backend.initialize(&config.layout()).await?;
            Ok(Box::new(backend))
        }
        DatabaseBackendType::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                use crate::database::PostgresBackend;

                let conn_str = config.get_postgres_connection_string().ok_or_else(|| {
                    CliError::InvalidArgument(
                        "PostgreSQL connection string not configured".to_string(),
                    )
                })?;

                let backend = PostgresBackend::new(conn_str, config.postgres.pool_size)?;
                info!("Using PostgreSQL at {}", backend.connection_string_masked());
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(CliError::InvalidArgument(
                    "PostgreSQL backend not enabled. Build with --features postgres-backend"
                        .to_string(),
                ))
            }
        }
    }
}
