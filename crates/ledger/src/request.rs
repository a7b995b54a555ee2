//! Remote ledger calls and their `param[0]` payloads.
//!
//! The remote API takes an envelope `{call, param: [..], app_key, app_secret}`.
//! Requests are built here without credentials; the transport attaches them
//! when the envelope is serialized for sending.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use omiesync_core::{Amount, BoundaryDate, ContractId, IntegrationKey, Side, format_boundary_date};

/// Remote call names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OmieCall {
    IncluirContaReceber,
    LancarRecebimento,
    IncluirContaPagar,
    LancarPagamento,
}

impl OmieCall {
    pub fn create(side: Side) -> Self {
        match side {
            Side::Receivable => OmieCall::IncluirContaReceber,
            Side::Payable => OmieCall::IncluirContaPagar,
        }
    }

    pub fn settle(side: Side) -> Self {
        match side {
            Side::Receivable => OmieCall::LancarRecebimento,
            Side::Payable => OmieCall::LancarPagamento,
        }
    }

    pub fn side(self) -> Side {
        match self {
            OmieCall::IncluirContaReceber | OmieCall::LancarRecebimento => Side::Receivable,
            OmieCall::IncluirContaPagar | OmieCall::LancarPagamento => Side::Payable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OmieCall::IncluirContaReceber => "IncluirContaReceber",
            OmieCall::LancarRecebimento => "LancarRecebimento",
            OmieCall::IncluirContaPagar => "IncluirContaPagar",
            OmieCall::LancarPagamento => "LancarPagamento",
        }
    }

    /// Resource path (relative to the API base URL) serving this call.
    pub fn resource(self) -> &'static str {
        match self.side() {
            Side::Receivable => "financas/contareceber/",
            Side::Payable => "financas/contapagar/",
        }
    }
}

impl core::fmt::Display for OmieCall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed account/category codes of the integrated company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccounts {
    /// `codigo_cliente_fornecedor`
    pub counterparty_code: i64,
    pub receivable_category: String,
    pub payable_category: String,
    /// `id_conta_corrente` on creation, `codigo_conta_corrente` on settlement.
    pub account_id: i64,
}

impl LedgerAccounts {
    fn category(&self, side: Side) -> &str {
        match side {
            Side::Receivable => &self.receivable_category,
            Side::Payable => &self.payable_category,
        }
    }
}

/// A fully-built remote request (minus credentials).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRequest {
    pub call: OmieCall,
    pub param: JsonValue,
}

impl LedgerRequest {
    /// Create a ledger entry (`IncluirContaReceber` / `IncluirContaPagar`).
    pub fn create_entry(
        side: Side,
        key: &IntegrationKey,
        contract: &ContractId,
        accounts: &LedgerAccounts,
        due: &BoundaryDate,
        amount: Amount,
    ) -> Self {
        let due = due.formatted();
        Self {
            call: OmieCall::create(side),
            param: json!({
                "codigo_lancamento_integracao": key.as_str(),
                "codigo_cliente_fornecedor": accounts.counterparty_code,
                "data_vencimento": due,
                "data_previsao": due,
                "valor_documento": amount.to_decimal(),
                "numero_documento": contract.as_str(),
                "codigo_categoria": accounts.category(side),
                "id_conta_corrente": accounts.account_id,
            }),
        }
    }

    /// Settle a previously created entry (`LancarRecebimento` / `LancarPagamento`).
    pub fn settle_entry(
        side: Side,
        key: &IntegrationKey,
        contract: &ContractId,
        accounts: &LedgerAccounts,
        on: NaiveDate,
        amount: Amount,
    ) -> Self {
        Self {
            call: OmieCall::settle(side),
            param: json!({
                "codigo_lancamento_integracao": key.as_str(),
                "codigo_baixa_integracao": key.settlement_key(),
                "codigo_conta_corrente": accounts.account_id,
                "valor": amount.to_decimal(),
                "data": format_boundary_date(on),
                "observacao": format!("Baixa automática do contrato {contract}"),
            }),
        }
    }

    /// Serialize the wire envelope with credentials attached.
    pub fn envelope(&self, app_key: &str, app_secret: &str) -> JsonValue {
        json!({
            "call": self.call.as_str(),
            "app_key": app_key,
            "app_secret": app_secret,
            "param": [self.param],
        })
    }

    /// Amount carried by the request, whichever field name the call uses.
    pub fn amount(&self) -> Option<f64> {
        self.param
            .get("valor_documento")
            .or_else(|| self.param.get("valor"))
            .and_then(JsonValue::as_f64)
    }
}
