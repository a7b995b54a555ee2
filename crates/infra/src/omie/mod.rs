//! Remote ledger transport.
//!
//! `LedgerTransport` is the seam between the dispatch lane and the remote API:
//! one call in, either a success payload or a [`CallFailure`] out. Retrying,
//! pacing and classification all happen in the lane, never here.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use omiesync_ledger::LedgerRequest;

use crate::dispatch::CallFailure;

pub use http::OmieHttpClient;
pub use memory::InMemoryLedger;

/// Executes one remote call.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    async fn execute(&self, request: &LedgerRequest) -> Result<JsonValue, CallFailure>;
}

/// Transport construction error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}
