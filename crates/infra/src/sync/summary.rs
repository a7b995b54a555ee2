//! Run counters and the summary returned to the trigger.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use omiesync_ledger::OmieCall;

use crate::dispatch::CallOutcome;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "concluido")]
    Completed,
    #[serde(rename = "erro_critico")]
    Critical,
}

/// One dispatched task, as reported in `results[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReport {
    pub label: String,
    pub integration_key: Option<String>,
    pub call: OmieCall,
    pub success: bool,
    pub resolved_duplicate: bool,
    pub http_status: Option<u16>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CallOutcome> for CallReport {
    fn from(outcome: &CallOutcome) -> Self {
        Self {
            label: outcome.label.clone(),
            integration_key: outcome.integration_key.clone(),
            call: outcome.call,
            success: outcome.success(),
            resolved_duplicate: outcome.is_duplicate(),
            http_status: outcome.http_status,
            attempts: outcome.attempts,
            response: outcome.response.clone(),
            error: outcome.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: RunStatus,
    pub total_registros_encontrados: usize,
    pub registros_processados: usize,
    pub successful_omie_operations: usize,
    pub failed_omie_operations: usize,
    pub results: Vec<CallReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RunSummary {
    /// Summary of a run that could not start dispatching.
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Critical,
            total_registros_encontrados: 0,
            registros_processados: 0,
            successful_omie_operations: 0,
            failed_omie_operations: 0,
            results: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.status == RunStatus::Critical
    }
}

/// Per-run accumulator. Owned by a single run; never shared.
#[derive(Debug, Default)]
pub struct RunCounters {
    pub records_found: usize,
    pub records_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<CallReport>,
}

impl RunCounters {
    pub fn new(records_found: usize) -> Self {
        Self {
            records_found,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &CallOutcome) {
        if outcome.success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(CallReport::from(outcome));
    }

    pub fn finish(self) -> RunSummary {
        RunSummary {
            status: RunStatus::Completed,
            total_registros_encontrados: self.records_found,
            registros_processados: self.records_processed,
            successful_omie_operations: self.successful,
            failed_omie_operations: self.failed,
            results: self.results,
            message: None,
        }
    }
}
