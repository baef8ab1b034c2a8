//! Partition key normalization
//!
//! Staging and curated tables are list-partitioned by country. The key is
//! normalized once, when a record is built, so that `" India "`, `"india"`
//! and `"INDIA"` route to the same partition and carry the same bound value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized country value used as the partition bound.
///
/// Normalization trims surrounding whitespace and upper-cases the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Normalize a raw country value.
    ///
    /// Returns `None` when the value is blank after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    /// The normalized value, as stored in the `country` column.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic partition name for this key under `table`.
    ///
    /// `customer_info` + `USA` gives `customer_info_usa`.
    pub fn partition_name(&self, table: &str) -> String {
        format!("{}_{}", table, self.0.to_lowercase())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "partition key cannot be blank".to_string())
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.0
    }
}
