//! Bulk-load a delimited text file into a table store in fixed-size batches.
//!
//! A [`RowSource`] reads header-delimited records lazily, an optional
//! [`TimestampNormalizer`] rewrites designated columns, and a [`BatchLoader`]
//! submits each chunk with one [`TableStore::insert`] call, stopping at the
//! first failed chunk.

mod config;
mod errors;
mod loader;
mod record;
mod source;
mod store;
mod transform;

pub mod snowpipe;

pub use config::{
    Config, ConfigLocation, DEFAULT_BATCH_SIZE, DEFAULT_SCHEMA, DEFAULT_TIMESTAMP_FORMAT,
    Delimiter, LoadSettings,
};
pub use errors::{ConfigurationError, Error, SubmissionError};
pub use loader::{
    BatchLoader, LoadReport, LoadState, MAX_WARNING_SAMPLES, PreparedLoad, load_with,
};
pub use record::{Header, Record, Row};
pub use snowpipe::SnowpipeStore;
pub use source::RowSource;
pub use store::{Insert, MemoryStore, TableStore};
pub use transform::{CANONICAL_FORMAT, FieldParseWarning, TimestampNormalizer, normalize_timestamp};
