//! In-memory ledger (dry runs and tests).
//!
//! Behaves like the remote API for the parts the sync depends on: creating an
//! entry twice under the same integration key yields the "already registered"
//! fault, and settling an entry that was never created is rejected.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tokio::time::Instant;

use omiesync_ledger::{LedgerRequest, OmieCall};

use super::LedgerTransport;
use crate::dispatch::classifier::DUPLICATE_FAULT_CODE;
use crate::dispatch::{CallFailure, OmieFault};

#[derive(Debug, Default)]
struct LedgerState {
    next_code: i64,
    /// Created entries by integration key.
    entries: HashMap<String, JsonValue>,
    /// Settlement keys already applied.
    settlements: HashSet<String>,
    calls: Vec<LedgerRequest>,
    call_instants: Vec<Instant>,
    /// Failures to return, each flagged with whether the call is applied first.
    scripted_failures: VecDeque<(CallFailure, bool)>,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    latency: Option<Duration>,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated round-trip time applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a failure returned (instead of processing) by the next call.
    pub fn fail_next(&self, failure: CallFailure) {
        self.lock().scripted_failures.push_back((failure, false));
    }

    /// Queue a failure returned by the next call after it was applied anyway
    /// (the remote side kept the entry but the caller only sees the fault).
    pub fn apply_then_fail_next(&self, failure: CallFailure) {
        self.lock().scripted_failures.push_back((failure, true));
    }

    /// Every request received, in arrival order.
    pub fn calls(&self) -> Vec<LedgerRequest> {
        self.lock().calls.clone()
    }

    /// Start instant of every call, in arrival order.
    pub fn call_instants(&self) -> Vec<Instant> {
        self.lock().call_instants.clone()
    }

    pub fn entry(&self, integration_key: &str) -> Option<JsonValue> {
        self.lock().entries.get(integration_key).cloned()
    }

    pub fn is_settled(&self, integration_key: &str) -> bool {
        self.lock()
            .settlements
            .contains(&format!("{integration_key}-B"))
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn respond(&self, request: &LedgerRequest) -> Result<JsonValue, CallFailure> {
        let scripted = self.lock().scripted_failures.pop_front();
        match scripted {
            Some((failure, false)) => Err(failure),
            Some((failure, true)) => {
                let _ = self.apply(request);
                Err(failure)
            }
            None => self.apply(request),
        }
    }

    fn apply(&self, request: &LedgerRequest) -> Result<JsonValue, CallFailure> {
        let mut state = self.lock();

        let key = text(&request.param, "codigo_lancamento_integracao")
            .ok_or_else(|| client_fault("codigo_lancamento_integracao não informado"))?;

        match request.call {
            OmieCall::IncluirContaReceber | OmieCall::IncluirContaPagar => {
                if state.entries.contains_key(&key) {
                    return Err(CallFailure::fault(
                        500,
                        OmieFault {
                            faultcode: Some(DUPLICATE_FAULT_CODE.to_string()),
                            faultstring: Some(format!(
                                "ERROR: Lançamento cadastrado para o Código de Integração [{key}] !"
                            )),
                            codigo_erro: Some("102".to_string()),
                        },
                    ));
                }
                state.next_code += 1;
                let code = state.next_code;
                state.entries.insert(key.clone(), request.param.clone());
                Ok(json!({
                    "codigo_lancamento_omie": code,
                    "codigo_lancamento_integracao": key,
                    "codigo_status": "0",
                    "descricao_status": "Lançamento cadastrado com sucesso!",
                }))
            }
            OmieCall::LancarRecebimento | OmieCall::LancarPagamento => {
                if !state.entries.contains_key(&key) {
                    return Err(client_fault(&format!(
                        "Lançamento não encontrado para o Código de Integração [{key}]"
                    )));
                }
                let settlement = text(&request.param, "codigo_baixa_integracao")
                    .unwrap_or_else(|| format!("{key}-B"));
                if !state.settlements.insert(settlement.clone()) {
                    return Err(CallFailure::fault(
                        500,
                        OmieFault {
                            faultcode: Some(DUPLICATE_FAULT_CODE.to_string()),
                            faultstring: Some(format!(
                                "ERROR: Baixa já cadastrada para o Código de Integração [{settlement}] !"
                            )),
                            codigo_erro: Some("102".to_string()),
                        },
                    ));
                }
                state.next_code += 1;
                Ok(json!({
                    "codigo_baixa": state.next_code,
                    "codigo_baixa_integracao": settlement,
                    "codigo_status": "0",
                    "descricao_status": "Baixa realizada com sucesso!",
                }))
            }
        }
    }
}

fn text(param: &JsonValue, field: &str) -> Option<String> {
    param.get(field)?.as_str().map(str::to_string)
}

fn client_fault(message: &str) -> CallFailure {
    CallFailure::fault(
        500,
        OmieFault {
            faultcode: Some("SOAP-ENV:Client-5".to_string()),
            faultstring: Some(format!("ERROR: {message}")),
            codigo_erro: None,
        },
    )
}

#[async_trait]
impl LedgerTransport for InMemoryLedger {
    async fn execute(&self, request: &LedgerRequest) -> Result<JsonValue, CallFailure> {
        {
            let mut state = self.lock();
            state.calls.push(request.clone());
            state.call_instants.push(Instant::now());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.respond(request)
    }
}
