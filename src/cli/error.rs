//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::database::DatabaseError;
use crate::extract::ExtractError;
use crate::logging::LoggingError;
use crate::models::BatchError;
use crate::pipeline::PipelineError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to write file {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Logging error: {0}")]
    LoggingError(#[from] LoggingError),

    #[error(transparent)]
    ExtractError(#[from] ExtractError),

    #[error("Invalid batch: {0}")]
    BatchError(#[from] BatchError),

    #[error("Pipeline failed: {0}")]
    PipelineError(#[from] PipelineError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
