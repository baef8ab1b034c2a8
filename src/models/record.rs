//! Customer records as staged and as curated

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::partition::PartitionKey;

/// Staging column list, in load order.
///
/// The bulk load targets exactly these columns in exactly this order, and
/// an extracted header must line up with it position by position.
pub const STAGING_COLUMNS: [&str; 10] = [
    "customer_name",
    "customer_id",
    "customer_open_date",
    "last_consulted_date",
    "vaccination_type",
    "doctor_consulted",
    "state",
    "country",
    "date_of_birth",
    "active_customer",
];

/// Columns the curated table carries on top of [`STAGING_COLUMNS`].
pub const CURATED_EXTRA_COLUMNS: [&str; 3] = ["post_code", "age", "days_since_last_consulted"];

/// Header spellings accepted for each staging column, by position.
///
/// Matching is case-insensitive. The first spelling of each entry is the
/// source-file name, the staging column name is always accepted as well.
pub(crate) const HEADER_ALIASES: [&[&str]; 10] = [
    &["customer_name"],
    &["customer_id"],
    &["open_date", "customer_open_date"],
    &["last_consulted_date"],
    &["vaccination_id", "vaccination_type"],
    &["dr_name", "doctor_consulted"],
    &["state"],
    &["country"],
    &["dob", "date_of_birth"],
    &["is_active", "active_customer"],
];

/// Default date formats, tried in order.
pub const DEFAULT_DATE_FORMATS: [&str; 5] = ["%Y%m%d", "%Y-%m-%d", "%d%m%Y", "%d-%m-%Y", "%m/%d/%Y"];

/// One customer observation from a batch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub customer_name: String,
    /// Natural key component
    pub customer_id: String,
    pub customer_open_date: Option<NaiveDate>,
    pub last_consulted_date: NaiveDate,
    pub vaccination_type: String,
    pub doctor_consulted: String,
    pub state: String,
    /// Natural key component and partition key
    pub country: PartitionKey,
    pub date_of_birth: NaiveDate,
    pub active_customer: bool,
}

impl CustomerRecord {
    /// Natural key `(customer_id, country)`.
    pub fn natural_key(&self) -> (&str, &PartitionKey) {
        (&self.customer_id, &self.country)
    }
}

/// A row of the curated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedRecord {
    #[serde(flatten)]
    pub customer: CustomerRecord,
    /// Not present in batch files; kept as-is once a row exists.
    pub post_code: Option<String>,
    /// Whole years from date of birth to the merge date
    pub age: i32,
    /// Days from last consultation to the merge date
    pub days_since_last_consulted: i32,
}

/// Parse a date with the first format that accepts it.
pub fn parse_date<S: AsRef<str>>(value: &str, formats: &[S]) -> Option<NaiveDate> {
    let value = value.trim();
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format.as_ref()).ok())
}

/// Parse the active-customer flag.
///
/// An empty flag reads as inactive.
pub fn parse_active_flag(value: &str) -> Option<bool> {
    match value.trim().to_uppercase().as_str() {
        "A" | "Y" | "YES" | "TRUE" | "T" | "1" => Some(true),
        "" | "I" | "N" | "NO" | "FALSE" | "F" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("20101012", &DEFAULT_DATE_FORMATS),
            Some(date(2010, 10, 12))
        );
        assert_eq!(
            parse_date(" 2010-10-12 ", &DEFAULT_DATE_FORMATS),
            Some(date(2010, 10, 12))
        );
        // Day-first birth dates fall through to %d%m%Y
        assert_eq!(
            parse_date("06031987", &DEFAULT_DATE_FORMATS),
            Some(date(1987, 3, 6))
        );
        assert_eq!(
            parse_date("03/06/1987", &DEFAULT_DATE_FORMATS),
            Some(date(1987, 3, 6))
        );
        assert_eq!(parse_date("not a date", &DEFAULT_DATE_FORMATS), None);
        assert_eq!(parse_date("", &DEFAULT_DATE_FORMATS), None);
    }

    #[test]
    fn test_parse_date_respects_format_order() {
        let day_first = ["%d%m%Y", "%Y%m%d"];
        assert_eq!(parse_date("20101012", &day_first), Some(date(1012, 10, 20)));
        assert_eq!(parse_date("19871203", &day_first), Some(date(1987, 12, 3)));
    }

    #[test]
    fn test_parse_active_flag() {
        assert_eq!(parse_active_flag("A"), Some(true));
        assert_eq!(parse_active_flag("y"), Some(true));
        assert_eq!(parse_active_flag("1"), Some(true));
        assert_eq!(parse_active_flag("I"), Some(false));
        assert_eq!(parse_active_flag(""), Some(false));
        assert_eq!(parse_active_flag("maybe"), None);
    }

    #[test]
    fn test_header_aliases_cover_staging_columns() {
        for (aliases, column) in HEADER_ALIASES.iter().zip(STAGING_COLUMNS) {
            assert!(
                aliases.contains(&column),
                "{column} missing from its alias list"
            );
        }
    }
}
