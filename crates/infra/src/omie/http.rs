//! HTTP transport to the remote ledger API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::instrument;

use omiesync_ledger::LedgerRequest;

use super::{LedgerTransport, TransportError};
use crate::config::OmieConfig;
use crate::dispatch::{CallFailure, OmieFault};

/// `reqwest`-backed client. Credentials are attached to every envelope.
#[derive(Clone)]
pub struct OmieHttpClient {
    client: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
}

impl std::fmt::Debug for OmieHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmieHttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OmieHttpClient {
    pub fn new(config: &OmieConfig) -> Result<Self, TransportError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::InvalidBaseUrl(config.base_url.clone()));
        }
        let client = Client::builder()
            .user_agent(concat!("omiesync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
        })
    }

    fn url(&self, request: &LedgerRequest) -> String {
        format!("{}/{}", self.base_url, request.call.resource())
    }
}

/// Interpret a raw response. A 2xx body carrying a fault is still a failure.
fn interpret(status: u16, text: &str) -> Result<JsonValue, CallFailure> {
    let body: Option<JsonValue> = serde_json::from_str(text).ok();
    let fault = body.as_ref().and_then(OmieFault::from_body);

    match fault {
        Some(fault) => Err(CallFailure::fault(status, fault)),
        None if (200..300).contains(&status) => {
            Ok(body.unwrap_or_else(|| JsonValue::String(text.to_string())))
        }
        None => Err(CallFailure {
            http_status: Some(status),
            fault: None,
            detail: text.to_string(),
        }),
    }
}

#[async_trait]
impl LedgerTransport for OmieHttpClient {
    #[instrument(level = "debug", skip(self, request), fields(call = %request.call))]
    async fn execute(&self, request: &LedgerRequest) -> Result<JsonValue, CallFailure> {
        let envelope = request.envelope(&self.app_key, &self.app_secret);
        let resp = self
            .client
            .post(self.url(request))
            .json(&envelope)
            .send()
            .await
            .map_err(|e| CallFailure::transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| CallFailure::transport(e.to_string()))?;
        interpret(status, &text)
    }
}
