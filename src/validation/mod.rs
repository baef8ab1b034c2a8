//! Validation functionality
//!
//! Provides identifier validation and quoting for the SQL the backends issue.

pub mod input;

pub use input::{
    ValidationError, ValidationResult, qualified_name, quote_identifier, validate_identifier,
    validate_partition_name,
};
