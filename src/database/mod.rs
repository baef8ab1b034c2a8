//! Warehouse backend abstraction
//!
//! The pipeline talks to its store through [`WarehouseBackend`]. Two
//! implementations exist:
//! - PostgreSQL: the production store, declaratively partitioned tables
//! - Memory: an in-process store with the same semantics, used for dry runs
//!   and tests
//!
//! Every operation acquires its connection for the duration of the call
//! and releases it on return, success or failure.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod config;
pub mod memory;
pub mod schema;

pub use self::memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use config::PipelineConfig;
pub use schema::{DatabaseSchema, TableLayout};

use crate::models::{CustomerRecord, PartitionKey};

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Bulk load failed
    #[error("Bulk load failed: {0}")]
    CopyFailed(String),

    /// Schema bootstrap failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Relation does not exist
    #[error("Relation {0} does not exist")]
    UndefinedRelation(String),

    /// A row's partition key has no partition
    #[error("No partition of relation {relation} found for key {key}")]
    NoPartition { relation: String, key: PartitionKey },

    /// Driver error with the statement context it happened in
    #[cfg(feature = "postgres-backend")]
    #[error("{context}: {source}")]
    Postgres {
        context: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Partition to create, with its parent and bound value.
#[derive(Debug, Clone, Copy)]
pub struct PartitionTarget<'a> {
    /// Schema holding both the parent and the partition
    pub schema: &'a str,
    /// Partitioned parent table
    pub parent: &'a str,
    /// Derived partition name
    pub partition: &'a str,
    /// Bound value, `FOR VALUES IN (key)`
    pub key: &'a PartitionKey,
}

/// Parameters of one incremental merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub staging_schema: String,
    pub curated_schema: String,
    /// Table name, shared by the staging and curated parents
    pub table: String,
    /// Date the derived fields are computed against
    pub as_of: NaiveDate,
    /// Only rows strictly older than this many days are eligible
    pub threshold_days: i32,
}

/// Warehouse backend trait
///
/// All operations are async; callers drive them one at a time.
#[async_trait(?Send)]
pub trait WarehouseBackend: Send + Sync {
    /// Create schemas and the partitioned parent tables if missing.
    ///
    /// Existing objects are left untouched.
    async fn initialize(&self, layout: &TableLayout) -> DatabaseResult<()>;

    /// Check the catalog for a relation named `name` in `schema`.
    async fn partition_exists(&self, schema: &str, name: &str) -> DatabaseResult<bool>;

    /// Create one list partition and commit it.
    ///
    /// On error nothing is left behind.
    async fn create_partition(&self, target: PartitionTarget<'_>) -> DatabaseResult<()>;

    /// Replace the full contents of a staging table with `records`.
    ///
    /// Delete and bulk insert happen in one transaction; on error the
    /// previous contents survive.
    ///
    /// # Returns
    /// Number of rows loaded
    async fn replace_staging(
        &self,
        schema: &str,
        table: &str,
        records: &[CustomerRecord],
    ) -> DatabaseResult<u64>;

    /// Upsert the latest eligible staged row per customer into curated.
    ///
    /// # Returns
    /// Number of curated rows inserted or updated
    async fn merge_into_curated(&self, request: &MergeRequest) -> DatabaseResult<u64>;

    /// Check if the store is reachable
    async fn health_check(&self) -> DatabaseResult<bool>;

    /// Get the backend type name
    ///
    /// # Returns
    /// Backend type string ("postgres" or "memory")
    fn backend_type(&self) -> &'static str;
}
