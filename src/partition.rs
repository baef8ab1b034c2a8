//! Partition manager
//!
//! Makes sure a list partition exists for one key value, creating it on
//! demand. Existence is always read from the store's catalog.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::database::{PartitionTarget, WarehouseBackend};
use crate::models::PartitionKey;
use crate::validation::{validate_identifier, validate_partition_name};

/// Result of ensuring one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PartitionOutcome {
    /// Partition was already there
    Existed,
    /// Partition was created and committed
    Created,
    /// Partition could not be ensured; nothing was left behind
    Failed { reason: String },
}

impl PartitionOutcome {
    /// True unless the partition could not be ensured
    pub fn is_success(&self) -> bool {
        !matches!(self, PartitionOutcome::Failed { .. })
    }
}

/// Creates partitions on demand
pub struct PartitionManager<'a, B: WarehouseBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: WarehouseBackend + ?Sized> PartitionManager<'a, B> {
    /// Create a new partition manager
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Ensure `schema.table` has a partition for the raw key `key`.
    ///
    /// The key is normalized first; a blank key fails without touching
    /// the store.
    pub async fn ensure_partition(&self, key: &str, table: &str, schema: &str) -> PartitionOutcome {
        match PartitionKey::parse(key) {
            Some(key) => self.ensure_key(&key, table, schema).await,
            None => {
                let reason = "partition key is blank".to_string();
                error!("Error creating partition for {}.{}: {}", schema, table, reason);
                PartitionOutcome::Failed { reason }
            }
        }
    }

    /// Ensure `schema.table` has a partition for a normalized key.
    pub async fn ensure_key(&self, key: &PartitionKey, table: &str, schema: &str) -> PartitionOutcome {
        let partition = key.partition_name(table);

        let validated = validate_identifier("schema", schema)
            .and_then(|_| validate_identifier("table", table))
            .and_then(|_| validate_partition_name(&partition));
        if let Err(e) = validated {
            return failed(key, table, schema, e.to_string());
        }

        match self.backend.partition_exists(schema, &partition).await {
            Ok(true) => {
                info!("Partition {}.{} already exists.", schema, partition);
                return PartitionOutcome::Existed;
            }
            Ok(false) => {}
            Err(e) => return failed(key, table, schema, e.to_string()),
        }

        let target = PartitionTarget {
            schema,
            parent: table,
            partition: &partition,
            key,
        };

        match self.backend.create_partition(target).await {
            Ok(()) => {
                info!("Partition created: {}.{}", schema, partition);
                PartitionOutcome::Created
            }
            Err(e) => failed(key, table, schema, e.to_string()),
        }
    }
}

fn failed(key: &PartitionKey, table: &str, schema: &str, reason: String) -> PartitionOutcome {
    error!(
        "Error creating partition for {} in {}.{}: {}",
        key, schema, table, reason
    );
    PartitionOutcome::Failed { reason }
}
