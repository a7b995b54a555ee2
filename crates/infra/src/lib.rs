//! Infrastructure layer: dispatch lane, remote ledger transport, record source,
//! configuration, and the run orchestrator that ties them together.

pub mod config;
pub mod dispatch;
pub mod omie;
pub mod source;
pub mod sync;

pub use config::{AppConfig, ConfigError, OmieConfig, SourceConfig};
pub use dispatch::{CallOutcome, CallTask, Dispatcher, DispatcherConfig};
pub use omie::{InMemoryLedger, LedgerTransport, OmieHttpClient, TransportError};
pub use source::{InMemoryRecordSource, PostgresRecordSource, RecordSource, SourceError};
pub use sync::{RunStatus, RunSummary, SyncError, SyncRunner};
