//! Database schema and statement definitions
//!
//! Schema, table and partition names are only ever spliced into SQL
//! through [`quote_identifier`]/[`qualified_name`]. Values (partition
//! bounds, the merge date, the threshold) are always bound parameters.

use serde::{Deserialize, Serialize};

use crate::models::{CURATED_EXTRA_COLUMNS, STAGING_COLUMNS};
use crate::validation::{
    ValidationResult, qualified_name, quote_identifier, validate_identifier,
};

/// Where the staging and curated parents live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub staging_schema: String,
    pub curated_schema: String,
    /// Table name, shared by the staging and curated parents
    pub table: String,
}

impl TableLayout {
    /// Create a new layout
    pub fn new(
        staging_schema: impl Into<String>,
        curated_schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            staging_schema: staging_schema.into(),
            curated_schema: curated_schema.into(),
            table: table.into(),
        }
    }

    /// Validate all three identifiers
    pub fn validate(&self) -> ValidationResult<()> {
        validate_identifier("staging schema", &self.staging_schema)?;
        validate_identifier("curated schema", &self.curated_schema)?;
        validate_identifier("table", &self.table)
    }
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::new("stg", "curate", "customer_info")
    }
}

/// Database schema helper
pub struct DatabaseSchema;

impl DatabaseSchema {
    /// Bootstrap SQL for both parents.
    ///
    /// Creates the schemas and the list-partitioned parent tables when they
    /// are missing. Partitions are created per batch, never here.
    pub fn create_tables_sql(layout: &TableLayout) -> String {
        let staging = qualified_name(&layout.staging_schema, &layout.table);
        let curated = qualified_name(&layout.curated_schema, &layout.table);

        format!(
            r#"
CREATE SCHEMA IF NOT EXISTS {staging_schema};
CREATE SCHEMA IF NOT EXISTS {curated_schema};

-- Current batch only, replaced on every load
CREATE TABLE IF NOT EXISTS {staging} (
{staging_columns}
) PARTITION BY LIST (country);

-- One row per (customer_id, country), updated by merge
CREATE TABLE IF NOT EXISTS {curated} (
{staging_columns},
    post_code TEXT,
    age INTEGER,
    days_since_last_consulted INTEGER,
    UNIQUE (customer_id, country)
) PARTITION BY LIST (country);
"#,
            staging_schema = quote_identifier(&layout.staging_schema),
            curated_schema = quote_identifier(&layout.curated_schema),
            staging_columns = Self::staging_column_definitions(),
        )
    }

    fn staging_column_definitions() -> &'static str {
        r#"    customer_name TEXT,
    customer_id TEXT NOT NULL,
    customer_open_date DATE,
    last_consulted_date DATE NOT NULL,
    vaccination_type TEXT,
    doctor_consulted TEXT,
    state TEXT,
    country TEXT NOT NULL,
    date_of_birth DATE NOT NULL,
    active_customer BOOLEAN"#
    }

    /// Catalog lookup for a relation; `$1` schema, `$2` relation name.
    pub fn relation_exists_sql() -> &'static str {
        r#"
SELECT EXISTS (
    SELECT 1
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2
)
"#
    }

    /// Server-side rendering of the partition DDL.
    ///
    /// `$1` schema, `$2` partition, `$3` schema, `$4` parent, `$5` bound
    /// value. `%I` quotes identifiers and `%L` quotes the literal, so the
    /// key never reaches the statement text unquoted.
    pub fn render_partition_ddl_sql() -> &'static str {
        "SELECT format('CREATE TABLE %I.%I PARTITION OF %I.%I FOR VALUES IN (%L)', \
         $1::text, $2::text, $3::text, $4::text, $5::text)"
    }

    /// Remove all rows from a staging table
    pub fn delete_staging_sql(schema: &str, table: &str) -> String {
        format!("DELETE FROM {}", qualified_name(schema, table))
    }

    /// Binary COPY into the fixed staging column list
    pub fn copy_staging_sql(schema: &str, table: &str) -> String {
        format!(
            "COPY {} ({}) FROM STDIN (FORMAT binary)",
            qualified_name(schema, table),
            STAGING_COLUMNS.join(", ")
        )
    }

    /// Incremental merge from staging into curated.
    ///
    /// `$1` is the merge date, `$2` the eligibility threshold in days.
    /// Only the latest eligible row per customer is upserted; a conflict
    /// on `(customer_id, country)` refreshes the consultation date and the
    /// derived fields, unless the curated row already holds a later
    /// consultation.
    pub fn merge_sql(staging_schema: &str, curated_schema: &str, table: &str) -> String {
        let staging = qualified_name(staging_schema, table);
        let curated = qualified_name(curated_schema, table);

        let mut curated_columns: Vec<&str> = STAGING_COLUMNS.to_vec();
        curated_columns.extend(CURATED_EXTRA_COLUMNS);
        let curated_columns = curated_columns.join(", ");

        format!(
            r#"
WITH customer_updates AS (
    SELECT
        {staging_columns},
        NULL::text AS post_code,
        EXTRACT(YEAR FROM AGE($1::date, date_of_birth))::integer AS age,
        ($1::date - last_consulted_date) AS days_since_last_consulted,
        ROW_NUMBER() OVER (
            PARTITION BY customer_id
            ORDER BY last_consulted_date DESC, tableoid, ctid
        ) AS rn
    FROM {staging}
    WHERE $1::date - last_consulted_date > $2::integer
)
INSERT INTO {curated} AS curated ({curated_columns})
SELECT {curated_columns}
FROM customer_updates
WHERE rn = 1
ON CONFLICT (customer_id, country) DO UPDATE SET
    last_consulted_date = EXCLUDED.last_consulted_date,
    age = EXCLUDED.age,
    days_since_last_consulted = EXCLUDED.days_since_last_consulted
WHERE curated.last_consulted_date <= EXCLUDED.last_consulted_date
"#,
            staging_columns = STAGING_COLUMNS.join(", "),
        )
    }
}
