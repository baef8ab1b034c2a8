//! PostgreSQL database backend implementation
//!
//! The production warehouse. Uses connection pooling via deadpool-postgres;
//! each operation checks a client out of the pool and returns it when the
//! pooled object drops.

use std::pin::pin;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;
use tracing::{debug, info};

use super::config::mask_connection_string;
use super::schema::{DatabaseSchema, TableLayout};
use super::{DatabaseError, DatabaseResult, MergeRequest, PartitionTarget, WarehouseBackend};
use crate::models::CustomerRecord;

/// Binary COPY column types, in staging column order
const STAGING_COLUMN_TYPES: [Type; 10] = [
    Type::TEXT,
    Type::TEXT,
    Type::DATE,
    Type::DATE,
    Type::TEXT,
    Type::TEXT,
    Type::TEXT,
    Type::TEXT,
    Type::DATE,
    Type::BOOL,
];

/// PostgreSQL database backend
pub struct PostgresBackend {
    /// Connection string
    connection_string: String,
    pool: Pool,
}

impl PostgresBackend {
    /// Create a new PostgreSQL backend
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Arguments
    /// * `connection_string` - PostgreSQL connection string
    /// * `pool_size` - Maximum number of pooled connections
    pub fn new(connection_string: &str, pool_size: usize) -> DatabaseResult<Self> {
        let mut config = Config::new();
        config.url = Some(connection_string.to_string());
        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        config.pool = Some(PoolConfig::new(pool_size.max(1)));

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self {
            connection_string: connection_string.to_string(),
            pool,
        })
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        mask_connection_string(&self.connection_string)
    }

    async fn client(&self) -> DatabaseResult<Object> {
        self.pool.get().await.map_err(|e| {
            DatabaseError::ConnectionFailed(format!(
                "Failed to connect to {}: {}",
                self.connection_string_masked(),
                e
            ))
        })
    }
}

fn pg_error(context: impl Into<String>) -> impl FnOnce(tokio_postgres::Error) -> DatabaseError {
    let context = context.into();
    move |source| DatabaseError::Postgres { context, source }
}

#[async_trait(?Send)]
impl WarehouseBackend for PostgresBackend {
    async fn initialize(&self, layout: &TableLayout) -> DatabaseResult<()> {
        layout
            .validate()
            .map_err(|e| DatabaseError::InvalidInput(e.to_string()))?;

        let client = self.client().await?;
        client
            .batch_execute(&DatabaseSchema::create_tables_sql(layout))
            .await
            .map_err(|e| DatabaseError::MigrationFailed(format!("Failed to create tables: {}", e)))?;

        info!(
            "Ensured {}.{} and {}.{}",
            layout.staging_schema, layout.table, layout.curated_schema, layout.table
        );
        Ok(())
    }

    async fn partition_exists(&self, schema: &str, name: &str) -> DatabaseResult<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(DatabaseSchema::relation_exists_sql(), &[&schema, &name])
            .await
            .map_err(pg_error(format!("Failed to look up {}.{}", schema, name)))?;
        Ok(row.get(0))
    }

    async fn create_partition(&self, target: PartitionTarget<'_>) -> DatabaseResult<()> {
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(pg_error("Failed to begin transaction"))?;

        let row = tx
            .query_one(
                DatabaseSchema::render_partition_ddl_sql(),
                &[
                    &target.schema,
                    &target.partition,
                    &target.schema,
                    &target.parent,
                    &target.key.as_str(),
                ],
            )
            .await
            .map_err(pg_error("Failed to render partition DDL"))?;
        let ddl: String = row.get(0);
        debug!("{}", ddl);

        tx.batch_execute(&ddl).await.map_err(pg_error(format!(
            "Failed to create partition {}.{}",
            target.schema, target.partition
        )))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(format!("Commit failed: {}", e)))
    }

    async fn replace_staging(
        &self,
        schema: &str,
        table: &str,
        records: &[CustomerRecord],
    ) -> DatabaseResult<u64> {
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(pg_error("Failed to begin transaction"))?;

        let delete_sql = DatabaseSchema::delete_staging_sql(schema, table);
        let deleted = tx
            .execute(delete_sql.as_str(), &[])
            .await
            .map_err(pg_error(format!("Failed to clear {}.{}", schema, table)))?;
        debug!("Removed {} rows from {}.{}", deleted, schema, table);

        let copy_sql = DatabaseSchema::copy_staging_sql(schema, table);
        let sink = tx
            .copy_in(copy_sql.as_str())
            .await
            .map_err(pg_error(format!("Failed to start COPY into {}.{}", schema, table)))?;

        let writer = BinaryCopyInWriter::new(sink, &STAGING_COLUMN_TYPES);
        let mut writer = pin!(writer);

        for record in records {
            writer
                .as_mut()
                .write(&[
                    &record.customer_name,
                    &record.customer_id,
                    &record.customer_open_date,
                    &record.last_consulted_date,
                    &record.vaccination_type,
                    &record.doctor_consulted,
                    &record.state,
                    &record.country.as_str(),
                    &record.date_of_birth,
                    &record.active_customer,
                ])
                .await
                .map_err(|e| DatabaseError::CopyFailed(format!("{}.{}: {}", schema, table, e)))?;
        }

        let loaded = writer
            .as_mut()
            .finish()
            .await
            .map_err(|e| DatabaseError::CopyFailed(format!("{}.{}: {}", schema, table, e)))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(format!("Commit failed: {}", e)))?;

        Ok(loaded)
    }

    async fn merge_into_curated(&self, request: &MergeRequest) -> DatabaseResult<u64> {
        let client = self.client().await?;
        let sql = DatabaseSchema::merge_sql(
            &request.staging_schema,
            &request.curated_schema,
            &request.table,
        );

        client
            .execute(sql.as_str(), &[&request.as_of, &request.threshold_days])
            .await
            .map_err(pg_error(format!(
                "Failed to merge into {}.{}",
                request.curated_schema, request.table
            )))
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let client = self.client().await?;
        let row = client
            .query_one("SELECT 1 AS healthy", &[])
            .await
            .map_err(pg_error("Health check failed"))?;
        Ok(row.get::<_, i32>(0) == 1)
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
