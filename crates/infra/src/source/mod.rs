//! Record source: where a run reads its records from.
//!
//! A source returns the whole record set of one run, in the order the run must
//! process it. Rows that cannot be turned into a [`SourceRecord`] are skipped
//! with a warning; only a failure to read the set at all is an error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use omiesync_core::SourceRecord;

pub use memory::InMemoryRecordSource;
pub use postgres::PostgresRecordSource;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("invalid view name: {0}")]
    InvalidViewName(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("record source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the full, ordered record set for one run.
    async fn fetch(&self) -> Result<Vec<SourceRecord>, SourceError>;
}
