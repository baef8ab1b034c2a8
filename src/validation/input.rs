//! Input validation for database identifiers.
//!
//! Schema, table and partition names end up in DDL and DML as quoted
//! identifiers. They are validated before use so that a typo in the
//! configuration fails fast instead of creating an oddly named relation.
//!
//! # Security
//!
//! Identifiers are always quoted with [`quote_identifier`]; values never
//! pass through this module and are bound as statement parameters.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// PostgreSQL truncates identifiers longer than `NAMEDATALEN - 1` bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

/// Errors that can occur during input validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} contains invalid characters: {value}")]
    InvalidCharacters { field: &'static str, value: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a schema or table name taken from configuration.
///
/// # Rules
///
/// - Must not be empty
/// - Must not exceed 63 bytes
/// - Must start with a letter or underscore
/// - May contain ASCII letters, digits and underscores
///
/// # Examples
///
/// ```
/// use customer_etl::validation::input::validate_identifier;
///
/// assert!(validate_identifier("schema", "stg").is_ok());
/// assert!(validate_identifier("table", "customer_info").is_ok());
/// assert!(validate_identifier("table", "").is_err());
/// assert!(validate_identifier("table", "1st").is_err());
/// ```
pub fn validate_identifier(field: &'static str, name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Empty(field));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_IDENTIFIER_LENGTH,
            actual: name.len(),
        });
    }

    if !IDENTIFIER_RE.is_match(name) {
        return Err(ValidationError::InvalidCharacters {
            field,
            value: name.to_string(),
        });
    }

    Ok(())
}

/// Validate a derived partition name.
///
/// Partition names embed the partition key verbatim (lower-cased), so they
/// may contain spaces or punctuation. Only emptiness and length are
/// checked; quoting takes care of the rest.
pub fn validate_partition_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Empty("partition name"));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field: "partition name",
            max: MAX_IDENTIFIER_LENGTH,
            actual: name.len(),
        });
    }

    if name.contains('\0') {
        return Err(ValidationError::InvalidCharacters {
            field: "partition name",
            value: name.replace('\0', "\\0"),
        });
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Embedded double quotes are doubled.
///
/// # Examples
///
/// ```
/// use customer_etl::validation::input::quote_identifier;
///
/// assert_eq!(quote_identifier("customer_info"), "\"customer_info\"");
/// assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a schema-qualified relation name.
pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(name))
}
