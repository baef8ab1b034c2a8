//! Models module
//!
//! Defines the records that move through the pipeline: raw and typed
//! batches, staged customer records, curated rows and the partition key.

pub mod batch;
pub mod partition;
pub mod record;

pub use batch::{Batch, BatchError, BatchResult, RawBatch, RawRow, validate_header};
pub use partition::PartitionKey;
pub use record::{
    CURATED_EXTRA_COLUMNS, CuratedRecord, CustomerRecord, DEFAULT_DATE_FORMATS, STAGING_COLUMNS,
    parse_active_flag, parse_date,
};
