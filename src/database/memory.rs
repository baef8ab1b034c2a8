//! In-memory warehouse backend
//!
//! Keeps parent tables, their list partitions and rows in process. Routing
//! and upsert rules follow the PostgreSQL backend: a row whose key has no
//! partition fails the whole statement, staging replacement is
//! all-or-nothing, and merges only advance curated rows.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::schema::TableLayout;
use super::{DatabaseError, DatabaseResult, MergeRequest, PartitionTarget, WarehouseBackend};
use crate::merge::select_latest;
use crate::models::{CuratedRecord, CustomerRecord, PartitionKey};

type CuratedKey = (String, PartitionKey);

#[derive(Debug)]
enum Rows {
    Staging(Vec<CustomerRecord>),
    Curated(BTreeMap<CuratedKey, CuratedRecord>),
}

#[derive(Debug)]
struct ParentTable {
    /// Partition name to bound value
    partitions: BTreeMap<String, PartitionKey>,
    rows: Rows,
}

impl ParentTable {
    fn new(rows: Rows) -> Self {
        Self {
            partitions: BTreeMap::new(),
            rows,
        }
    }

    fn routes(&self, key: &PartitionKey) -> bool {
        self.partitions.values().any(|bound| bound == key)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Parent tables by (schema, table)
    tables: BTreeMap<(String, String), ParentTable>,
}

impl MemoryState {
    fn relation_exists(&self, schema: &str, name: &str) -> bool {
        self.tables.iter().any(|((s, t), parent)| {
            s == schema && (t == name || parent.partitions.contains_key(name))
        })
    }

    fn table(&self, schema: &str, table: &str) -> DatabaseResult<&ParentTable> {
        self.tables
            .get(&(schema.to_string(), table.to_string()))
            .ok_or_else(|| DatabaseError::UndefinedRelation(format!("{}.{}", schema, table)))
    }

    fn table_mut(&mut self, schema: &str, table: &str) -> DatabaseResult<&mut ParentTable> {
        self.tables
            .get_mut(&(schema.to_string(), table.to_string()))
            .ok_or_else(|| DatabaseError::UndefinedRelation(format!("{}.{}", schema, table)))
    }
}

/// In-process backend used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current staging rows, in load order.
    pub async fn staging_rows(&self, schema: &str, table: &str) -> DatabaseResult<Vec<CustomerRecord>> {
        let state = self.state.lock().await;
        match &state.table(schema, table)?.rows {
            Rows::Staging(rows) => Ok(rows.clone()),
            Rows::Curated(_) => Err(DatabaseError::InvalidInput(format!(
                "{}.{} is not a staging table",
                schema, table
            ))),
        }
    }

    /// Current curated rows, ordered by natural key.
    pub async fn curated_rows(&self, schema: &str, table: &str) -> DatabaseResult<Vec<CuratedRecord>> {
        let state = self.state.lock().await;
        match &state.table(schema, table)?.rows {
            Rows::Curated(rows) => Ok(rows.values().cloned().collect()),
            Rows::Staging(_) => Err(DatabaseError::InvalidInput(format!(
                "{}.{} is not a curated table",
                schema, table
            ))),
        }
    }

    /// Partitions of a parent table as `(name, bound value)`.
    pub async fn partitions(
        &self,
        schema: &str,
        table: &str,
    ) -> DatabaseResult<Vec<(String, PartitionKey)>> {
        let state = self.state.lock().await;
        Ok(state
            .table(schema, table)?
            .partitions
            .iter()
            .map(|(name, key)| (name.clone(), key.clone()))
            .collect())
    }

    /// Set the post code of an existing curated row.
    ///
    /// Post codes never arrive through a batch file.
    pub async fn set_post_code(
        &self,
        schema: &str,
        table: &str,
        customer_id: &str,
        country: &PartitionKey,
        post_code: &str,
    ) -> DatabaseResult<()> {
        let mut state = self.state.lock().await;
        let parent = state.table_mut(schema, table)?;
        let Rows::Curated(rows) = &mut parent.rows else {
            return Err(DatabaseError::InvalidInput(format!(
                "{}.{} is not a curated table",
                schema, table
            )));
        };
        let row = rows
            .get_mut(&(customer_id.to_string(), country.clone()))
            .ok_or_else(|| {
                DatabaseError::InvalidInput(format!("No curated row for {} in {}", customer_id, country))
            })?;
        row.post_code = Some(post_code.to_string());
        Ok(())
    }
}

#[async_trait(?Send)]
impl WarehouseBackend for MemoryBackend {
    async fn initialize(&self, layout: &TableLayout) -> DatabaseResult<()> {
        layout
            .validate()
            .map_err(|e| DatabaseError::InvalidInput(e.to_string()))?;

        let mut state = self.state.lock().await;
        state
            .tables
            .entry((layout.staging_schema.clone(), layout.table.clone()))
            .or_insert_with(|| ParentTable::new(Rows::Staging(Vec::new())));
        state
            .tables
            .entry((layout.curated_schema.clone(), layout.table.clone()))
            .or_insert_with(|| ParentTable::new(Rows::Curated(BTreeMap::new())));
        Ok(())
    }

    async fn partition_exists(&self, schema: &str, name: &str) -> DatabaseResult<bool> {
        let state = self.state.lock().await;
        Ok(state.relation_exists(schema, name))
    }

    async fn create_partition(&self, target: PartitionTarget<'_>) -> DatabaseResult<()> {
        let mut state = self.state.lock().await;

        if state.relation_exists(target.schema, target.partition) {
            return Err(DatabaseError::QueryFailed(format!(
                "relation \"{}\" already exists",
                target.partition
            )));
        }

        let parent = state.table_mut(target.schema, target.parent)?;
        if parent.routes(target.key) {
            return Err(DatabaseError::QueryFailed(format!(
                "partition \"{}\" would overlap an existing partition of {}.{} for key {}",
                target.partition, target.schema, target.parent, target.key
            )));
        }

        parent
            .partitions
            .insert(target.partition.to_string(), target.key.clone());
        Ok(())
    }

    async fn replace_staging(
        &self,
        schema: &str,
        table: &str,
        records: &[CustomerRecord],
    ) -> DatabaseResult<u64> {
        let mut state = self.state.lock().await;
        let parent = state.table_mut(schema, table)?;

        if let Some(unrouted) = records.iter().find(|r| !parent.routes(&r.country)) {
            return Err(DatabaseError::NoPartition {
                relation: format!("{}.{}", schema, table),
                key: unrouted.country.clone(),
            });
        }

        match &mut parent.rows {
            Rows::Staging(rows) => {
                *rows = records.to_vec();
                Ok(records.len() as u64)
            }
            Rows::Curated(_) => Err(DatabaseError::InvalidInput(format!(
                "{}.{} is not a staging table",
                schema, table
            ))),
        }
    }

    async fn merge_into_curated(&self, request: &MergeRequest) -> DatabaseResult<u64> {
        let mut state = self.state.lock().await;

        let selected = match &state.table(&request.staging_schema, &request.table)?.rows {
            Rows::Staging(rows) => select_latest(rows, request.as_of, request.threshold_days),
            Rows::Curated(_) => {
                return Err(DatabaseError::InvalidInput(format!(
                    "{}.{} is not a staging table",
                    request.staging_schema, request.table
                )));
            }
        };

        let curated = state.table_mut(&request.curated_schema, &request.table)?;
        if let Some(unrouted) = selected.iter().find(|r| !curated.routes(&r.customer.country)) {
            return Err(DatabaseError::NoPartition {
                relation: format!("{}.{}", request.curated_schema, request.table),
                key: unrouted.customer.country.clone(),
            });
        }

        let Rows::Curated(rows) = &mut curated.rows else {
            return Err(DatabaseError::InvalidInput(format!(
                "{}.{} is not a curated table",
                request.curated_schema, request.table
            )));
        };

        let mut upserted = 0;
        for incoming in selected {
            let (customer_id, country) = incoming.customer.natural_key();
            let key = (customer_id.to_string(), country.clone());
            match rows.get_mut(&key) {
                Some(existing) => {
                    if existing.customer.last_consulted_date
                        <= incoming.customer.last_consulted_date
                    {
                        existing.customer.last_consulted_date =
                            incoming.customer.last_consulted_date;
                        existing.age = incoming.age;
                        existing.days_since_last_consulted = incoming.days_since_last_consulted;
                        upserted += 1;
                    }
                }
                None => {
                    rows.insert(key, incoming);
                    upserted += 1;
                }
            }
        }

        Ok(upserted)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        Ok(true)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
