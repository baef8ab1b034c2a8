//! Command line interface for the `customer-etl` binary

pub mod commands;
pub mod error;

pub use error::CliError;
