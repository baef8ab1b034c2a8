//! Incremental merge from staging into curated
//!
//! A merge picks, per customer, the most recent staged observation whose
//! last consultation is older than the threshold, derives `age` and
//! `days_since_last_consulted` as of the merge date and upserts the result
//! into curated, keyed by `(customer_id, country)`.
//!
//! On PostgreSQL the whole merge is a single statement (see
//! [`DatabaseSchema::merge_sql`](crate::database::DatabaseSchema::merge_sql));
//! the functions here express the same selection for the in-memory backend
//! and for reasoning about results in tests.

use std::collections::BTreeMap;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::database::{DatabaseError, MergeRequest, WarehouseBackend};
use crate::models::{CuratedRecord, CustomerRecord};
use crate::validation::{ValidationError, validate_identifier};

/// Staged rows must be strictly older than this many days to merge.
pub const DEFAULT_THRESHOLD_DAYS: i32 = 30;

/// Errors raised by a merge
#[derive(Debug, Error)]
pub enum MergeError {
    /// Schema or table name is not a valid identifier
    #[error("Invalid merge target: {0}")]
    InvalidTarget(#[from] ValidationError),

    /// The merge statement failed; nothing was applied
    #[error("Incremental load into {curated} failed: {source}")]
    Database {
        curated: String,
        #[source]
        source: DatabaseError,
    },
}

/// Result type for merges
pub type MergeResult<T> = Result<T, MergeError>;

/// Merge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Schema of the curated parent
    pub curated_schema: String,
    /// Date the derived fields are computed against
    pub as_of: NaiveDate,
    /// Eligibility threshold in days
    pub threshold_days: i32,
}

impl MergeOptions {
    /// Options for today with the default threshold.
    pub fn new(curated_schema: impl Into<String>) -> Self {
        Self {
            curated_schema: curated_schema.into(),
            as_of: Local::now().date_naive(),
            threshold_days: DEFAULT_THRESHOLD_DAYS,
        }
    }

    /// Fix the merge date
    pub fn as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    /// Override the eligibility threshold
    pub fn threshold_days(mut self, threshold_days: i32) -> Self {
        self.threshold_days = threshold_days;
        self
    }
}

/// Outcome of a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub staging: String,
    pub curated: String,
    /// Curated rows inserted or updated
    pub rows_upserted: u64,
    pub as_of: NaiveDate,
    pub threshold_days: i32,
}

/// Incremental merge engine
pub struct MergeEngine<'a, B: WarehouseBackend + ?Sized> {
    backend: &'a B,
    options: MergeOptions,
}

impl<'a, B: WarehouseBackend + ?Sized> MergeEngine<'a, B> {
    /// Create a new merge engine over `backend`
    pub fn new(backend: &'a B, options: MergeOptions) -> Self {
        Self { backend, options }
    }

    /// Merge `schema.table` into `curated_schema.table`.
    pub async fn merge(&self, table: &str, schema: &str) -> MergeResult<MergeReport> {
        let curated = format!("{}.{}", self.options.curated_schema, table);
        info!("Performing incremental load for {}", curated);

        validate_identifier("table", table)?;
        validate_identifier("staging schema", schema)?;
        validate_identifier("curated schema", &self.options.curated_schema)?;

        let request = MergeRequest {
            staging_schema: schema.to_string(),
            curated_schema: self.options.curated_schema.clone(),
            table: table.to_string(),
            as_of: self.options.as_of,
            threshold_days: self.options.threshold_days,
        };

        let rows_upserted = match self.backend.merge_into_curated(&request).await {
            Ok(rows) => rows,
            Err(source) => {
                error!("Error during incremental loading into {}: {}", curated, source);
                return Err(MergeError::Database { curated, source });
            }
        };

        info!(
            rows_upserted,
            as_of = %self.options.as_of,
            "Incremental load completed successfully."
        );

        Ok(MergeReport {
            staging: format!("{}.{}", schema, table),
            curated,
            rows_upserted,
            as_of: self.options.as_of,
            threshold_days: self.options.threshold_days,
        })
    }
}

/// Whole years from `date_of_birth` to `as_of`.
pub fn age_on(date_of_birth: NaiveDate, as_of: NaiveDate) -> i32 {
    let mut years = as_of.year() - date_of_birth.year();
    if (as_of.month(), as_of.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years
}

/// Days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to - from).num_days() as i32
}

/// Check if a staged row may advance its curated row.
pub fn is_eligible(record: &CustomerRecord, as_of: NaiveDate, threshold_days: i32) -> bool {
    days_between(record.last_consulted_date, as_of) > threshold_days
}

/// Latest eligible observation per customer ID, with derived fields.
///
/// Rows are considered in order; among rows with the same last-consulted
/// date the earliest one wins. The result is ordered by customer ID.
///
/// The PostgreSQL backend breaks the same ties by partition first
/// (`tableoid`, then `ctid`), so when one customer has equally recent rows
/// in two countries it keeps the row from the partition created first,
/// which need not be the first row of the file.
pub fn select_latest<'r>(
    rows: impl IntoIterator<Item = &'r CustomerRecord>,
    as_of: NaiveDate,
    threshold_days: i32,
) -> Vec<CuratedRecord> {
    let mut latest: BTreeMap<&str, &CustomerRecord> = BTreeMap::new();

    for record in rows
        .into_iter()
        .filter(|r| is_eligible(r, as_of, threshold_days))
    {
        latest
            .entry(record.customer_id.as_str())
            .and_modify(|current| {
                if record.last_consulted_date > current.last_consulted_date {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    latest
        .into_values()
        .map(|record| derive_curated(record, as_of))
        .collect()
}

/// Build the curated row for a staged record as of `as_of`.
pub fn derive_curated(record: &CustomerRecord, as_of: NaiveDate) -> CuratedRecord {
    CuratedRecord {
        customer: record.clone(),
        post_code: None,
        age: age_on(record.date_of_birth, as_of),
        days_since_last_consulted: days_between(record.last_consulted_date, as_of),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartitionKey;
    use chrono::Days;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: &str, country: &str, last_consulted: NaiveDate) -> CustomerRecord {
        CustomerRecord {
            customer_name: format!("Customer {id}"),
            customer_id: id.to_string(),
            customer_open_date: Some(date(2010, 10, 12)),
            last_consulted_date: last_consulted,
            vaccination_type: "MVD".to_string(),
            doctor_consulted: "Paul".to_string(),
            state: "SA".to_string(),
            country: PartitionKey::parse(country).unwrap(),
            date_of_birth: date(1987, 3, 6),
            active_customer: true,
        }
    }

    #[test]
    fn test_age_on() {
        assert_eq!(age_on(date(1987, 3, 6), date(2024, 3, 5)), 36);
        assert_eq!(age_on(date(1987, 3, 6), date(2024, 3, 6)), 37);
        assert_eq!(age_on(date(2000, 2, 29), date(2023, 2, 28)), 22);
        assert_eq!(age_on(date(2000, 2, 29), date(2023, 3, 1)), 23);
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(date(2024, 1, 1), date(2024, 3, 1)), 60);
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 3, 1)), 0);
    }

    #[test]
    fn test_threshold_is_strict() {
        let today = date(2024, 6, 30);
        let exactly = record("1", "USA", today - Days::new(30));
        let older = record("1", "USA", today - Days::new(31));
        assert!(!is_eligible(&exactly, today, 30));
        assert!(is_eligible(&older, today, 30));
    }

    #[test]
    fn test_only_overdue_row_is_selected() {
        let today = date(2024, 6, 30);
        let rows = vec![
            record("1", "USA", today - Days::new(10)),
            record("1", "USA", today - Days::new(40)),
        ];

        let selected = select_latest(&rows, today, DEFAULT_THRESHOLD_DAYS);
        assert_eq!(selected.len(), 1);
        assert_eq!(
            selected[0].customer.last_consulted_date,
            today - Days::new(40)
        );
        assert_eq!(selected[0].days_since_last_consulted, 40);
    }

    #[test]
    fn test_most_recent_eligible_row_wins() {
        let today = date(2024, 6, 30);
        let rows = vec![
            record("1", "USA", today - Days::new(90)),
            record("1", "USA", today - Days::new(45)),
            record("1", "USA", today - Days::new(60)),
            record("2", "IND", today - Days::new(35)),
        ];

        let selected = select_latest(&rows, today, DEFAULT_THRESHOLD_DAYS);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].customer.customer_id, "1");
        assert_eq!(selected[0].days_since_last_consulted, 45);
        assert_eq!(selected[1].customer.customer_id, "2");
        assert_eq!(selected[1].age, 37);
    }

    #[test]
    fn test_ties_keep_first_row() {
        let today = date(2024, 6, 30);
        let when = today - Days::new(50);
        let mut first = record("1", "USA", when);
        first.doctor_consulted = "First".to_string();
        let mut second = record("1", "USA", when);
        second.doctor_consulted = "Second".to_string();

        let selected = select_latest([&first, &second], today, DEFAULT_THRESHOLD_DAYS);
        assert_eq!(selected[0].customer.doctor_consulted, "First");
    }

    #[test]
    fn test_ties_across_countries_keep_file_order() {
        let today = date(2024, 6, 30);
        let when = today - Days::new(50);
        let usa = record("1", "USA", when);
        let ind = record("1", "IND", when);

        let selected = select_latest([&usa, &ind], today, DEFAULT_THRESHOLD_DAYS);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].customer.country.as_str(), "USA");

        let selected = select_latest([&ind, &usa], today, DEFAULT_THRESHOLD_DAYS);
        assert_eq!(selected[0].customer.country.as_str(), "IND");
    }

    #[test]
    fn test_merge_options_builder() {
        let options = MergeOptions::new("curate")
            .as_of(date(2024, 1, 1))
            .threshold_days(7);
        assert_eq!(options.curated_schema, "curate");
        assert_eq!(options.as_of, date(2024, 1, 1));
        assert_eq!(options.threshold_days, 7);
        assert_eq!(
            MergeOptions::new("curate").threshold_days,
            DEFAULT_THRESHOLD_DAYS
        );
    }
}
