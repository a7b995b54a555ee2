//! Core dispatch types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use omiesync_ledger::{LedgerRequest, LedgerStep, OmieCall, OutcomeKind};

/// A unit of work submitted to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTask {
    pub request: LedgerRequest,
    /// Human label for diagnostics.
    pub label: String,
    /// Integration key the call concerns (matched against duplicate faults).
    pub integration_key: Option<String>,
}

impl CallTask {
    pub fn new(request: LedgerRequest, label: impl Into<String>) -> Self {
        Self {
            request,
            label: label.into(),
            integration_key: None,
        }
    }

    pub fn with_integration_key(mut self, key: impl Into<String>) -> Self {
        self.integration_key = Some(key.into());
        self
    }

    pub fn call(&self) -> OmieCall {
        self.request.call
    }
}

impl From<LedgerStep> for CallTask {
    fn from(step: LedgerStep) -> Self {
        Self {
            request: step.request,
            label: step.label,
            integration_key: Some(step.integration_key.as_str().to_string()),
        }
    }
}

/// SOAP-style fault object returned by the remote API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmieFault {
    pub faultcode: Option<String>,
    pub faultstring: Option<String>,
    /// Numeric or textual; normalized to text.
    pub codigo_erro: Option<String>,
}

impl OmieFault {
    /// Extract a fault from a response body, if it carries one.
    pub fn from_body(body: &JsonValue) -> Option<Self> {
        let text = |field: &str| -> Option<String> {
            match body.get(field)? {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };
        let fault = Self {
            faultcode: text("faultcode"),
            faultstring: text("faultstring"),
            codigo_erro: text("codigo_erro"),
        };
        (fault.faultcode.is_some() || fault.faultstring.is_some()).then_some(fault)
    }
}

/// A failed call, as observed by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFailure {
    pub http_status: Option<u16>,
    pub fault: Option<OmieFault>,
    /// Raw error detail (fault text, body, or transport error).
    pub detail: String,
}

impl CallFailure {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            http_status: None,
            fault: None,
            detail: detail.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::transport(format!("call timed out after {}s", after.as_secs()))
    }

    pub fn fault(http_status: u16, fault: OmieFault) -> Self {
        let detail = fault
            .faultstring
            .clone()
            .or_else(|| fault.faultcode.clone())
            .unwrap_or_default();
        Self {
            http_status: Some(http_status),
            fault: Some(fault),
            detail,
        }
    }

    pub fn faultcode(&self) -> Option<&str> {
        self.fault.as_ref()?.faultcode.as_deref()
    }

    pub fn faultstring(&self) -> Option<&str> {
        self.fault.as_ref()?.faultstring.as_deref()
    }

    pub fn codigo_erro(&self) -> Option<&str> {
        self.fault.as_ref()?.codigo_erro.as_deref()
    }
}

impl core::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (self.http_status, self.faultcode()) {
            (Some(status), Some(code)) => write!(f, "HTTP {status} [{code}] {}", self.detail),
            (Some(status), None) => write!(f, "HTTP {status} {}", self.detail),
            (None, _) => f.write_str(&self.detail),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    /// Exponential backoff after a transient failure (consumes retry budget).
    Backoff,
    /// Account-wide forced wait after a blocking fault (does not consume budget).
    Cooldown,
}

/// Record of one failed call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub error: String,
    pub http_status: Option<u16>,
    /// Wait applied before the next call, if one followed.
    pub wait: Option<(WaitKind, Duration)>,
}

impl AttemptRecord {
    pub fn new(attempt: u32, failure: &CallFailure, wait: Option<(WaitKind, Duration)>) -> Self {
        Self {
            attempt,
            error: failure.to_string(),
            http_status: failure.http_status,
            wait,
        }
    }
}

/// Result of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub label: String,
    pub call: OmieCall,
    pub integration_key: Option<String>,
    pub kind: OutcomeKind,
    /// Response payload (or the duplicate sentinel) on logical success.
    pub response: Option<JsonValue>,
    /// Last observed error on failure.
    pub error: Option<String>,
    pub http_status: Option<u16>,
    /// Attempts consumed against the retry budget.
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
}

impl CallOutcome {
    /// Sentinel payload marking a resolved duplicate.
    pub fn duplicate_sentinel(detail: &str) -> JsonValue {
        serde_json::json!({
            "resolvedDuplicate": true,
            "detail": detail,
        })
    }

    pub fn success(&self) -> bool {
        self.kind.is_logical_success()
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind == OutcomeKind::DuplicateSuccess
    }

    pub fn waits(&self, kind: WaitKind) -> impl Iterator<Item = Duration> + '_ {
        self.history
            .iter()
            .filter_map(move |r| r.wait.filter(|(k, _)| *k == kind).map(|(_, d)| d))
    }
}
