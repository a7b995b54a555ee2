use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use omiesync_core::SourceRecord;

use super::{RecordSource, SourceError};

/// Fixed record set held in memory (dev mode and tests).
#[derive(Debug, Default)]
pub struct InMemoryRecordSource {
    records: Mutex<Vec<SourceRecord>>,
    failure: Option<SourceError>,
}

impl InMemoryRecordSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failure: None,
        }
    }

    /// A source whose every fetch fails with `error`.
    pub fn failing(error: SourceError) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    pub fn replace(&self, records: Vec<SourceRecord>) {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records;
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn fetch(&self) -> Result<Vec<SourceRecord>, SourceError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
