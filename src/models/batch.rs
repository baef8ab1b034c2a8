//! Batches: the raw tokenized form and the typed, validated form
//!
//! [`RawBatch`] is what the extractor produces: the header fields and the
//! data rows as text, with their source line numbers. [`Batch`] is built
//! from it once the header has been checked against the staging column
//! list and every field has been parsed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::partition::PartitionKey;
use super::record::{
    CustomerRecord, HEADER_ALIASES, STAGING_COLUMNS, parse_active_flag, parse_date,
};

/// Errors raised while turning a raw batch into typed records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    /// Header width differs from the staging column list
    #[error("Header has {found} columns, expected {expected}")]
    ColumnCount { expected: usize, found: usize },

    /// Header column does not match the staging column at that position
    #[error("Header column {position} is '{found}', expected '{expected}'")]
    HeaderMismatch {
        position: usize,
        expected: &'static str,
        found: String,
    },

    /// Data row width differs from the header
    #[error("Line {line}: row has {found} fields, expected {expected}")]
    RowWidth {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Required field is blank
    #[error("Line {line}: {column} is blank")]
    BlankField { line: usize, column: &'static str },

    /// Field could not be parsed
    #[error("Line {line}: invalid {column} '{value}': {reason}")]
    InvalidField {
        line: usize,
        column: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Result type for batch construction
pub type BatchResult<T> = Result<T, BatchError>;

/// One `D|` line, split into fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based line number in the source file
    pub line: usize,
    pub fields: Vec<String>,
}

/// Header and data rows of a batch file, untyped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBatch {
    /// Header fields in file order
    pub header: Vec<String>,
    /// Data rows in file order
    pub rows: Vec<RawRow>,
}

impl RawBatch {
    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A validated batch of customer records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    columns: Vec<String>,
    records: Vec<CustomerRecord>,
}

impl Batch {
    /// Create a batch from already-typed records.
    pub fn new(records: Vec<CustomerRecord>) -> Self {
        Self {
            columns: STAGING_COLUMNS.iter().map(|c| c.to_string()).collect(),
            records,
        }
    }

    /// Validate the header of `raw` and parse every row.
    ///
    /// `date_formats` are tried in order for each date field.
    pub fn from_raw<S: AsRef<str>>(raw: &RawBatch, date_formats: &[S]) -> BatchResult<Self> {
        let columns = validate_header(&raw.header)?;

        let records = raw
            .rows
            .iter()
            .map(|row| parse_row(row, date_formats))
            .collect::<BatchResult<Vec<_>>>()?;

        Ok(Self { columns, records })
    }

    /// Column order of the batch, using staging column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in file order
    pub fn records(&self) -> &[CustomerRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct partition keys present in the batch, sorted.
    pub fn countries(&self) -> BTreeSet<PartitionKey> {
        self.records.iter().map(|r| r.country.clone()).collect()
    }
}

/// Check a header against the staging column list.
///
/// Returns the header translated to staging column names.
pub fn validate_header(header: &[String]) -> BatchResult<Vec<String>> {
    if header.len() != STAGING_COLUMNS.len() {
        return Err(BatchError::ColumnCount {
            expected: STAGING_COLUMNS.len(),
            found: header.len(),
        });
    }

    header
        .iter()
        .enumerate()
        .map(|(position, found)| {
            let normalized = found.trim().to_lowercase();
            if HEADER_ALIASES[position].contains(&normalized.as_str()) {
                Ok(STAGING_COLUMNS[position].to_string())
            } else {
                Err(BatchError::HeaderMismatch {
                    position,
                    expected: STAGING_COLUMNS[position],
                    found: found.clone(),
                })
            }
        })
        .collect()
}

fn parse_row<S: AsRef<str>>(row: &RawRow, date_formats: &[S]) -> BatchResult<CustomerRecord> {
    if row.fields.len() != STAGING_COLUMNS.len() {
        return Err(BatchError::RowWidth {
            line: row.line,
            expected: STAGING_COLUMNS.len(),
            found: row.fields.len(),
        });
    }

    let line = row.line;
    let field = |idx: usize| row.fields[idx].trim();

    let required_date = |idx: usize| {
        let value = field(idx);
        if value.is_empty() {
            return Err(BatchError::BlankField {
                line,
                column: STAGING_COLUMNS[idx],
            });
        }
        parse_date(value, date_formats).ok_or_else(|| BatchError::InvalidField {
            line,
            column: STAGING_COLUMNS[idx],
            value: value.to_string(),
            reason: "not a date in any configured format",
        })
    };

    let customer_id = field(1);
    if customer_id.is_empty() {
        return Err(BatchError::BlankField {
            line,
            column: STAGING_COLUMNS[1],
        });
    }

    let customer_open_date = match field(2) {
        "" => None,
        value => Some(parse_date(value, date_formats).ok_or_else(|| {
            BatchError::InvalidField {
                line,
                column: STAGING_COLUMNS[2],
                value: value.to_string(),
                reason: "not a date in any configured format",
            }
        })?),
    };

    let country = PartitionKey::parse(field(7)).ok_or(BatchError::BlankField {
        line,
        column: STAGING_COLUMNS[7],
    })?;

    let active_customer = parse_active_flag(field(9)).ok_or_else(|| BatchError::InvalidField {
        line,
        column: STAGING_COLUMNS[9],
        value: field(9).to_string(),
        reason: "expected an active/inactive flag",
    })?;

    Ok(CustomerRecord {
        customer_name: field(0).to_string(),
        customer_id: customer_id.to_string(),
        customer_open_date,
        last_consulted_date: required_date(3)?,
        vaccination_type: field(4).to_string(),
        doctor_consulted: field(5).to_string(),
        state: field(6).to_string(),
        country,
        date_of_birth: required_date(8)?,
        active_customer,
    })
}
