//! Status vocabulary of the operational view.
//!
//! The view exposes free-text status columns, some of them duplicated under two
//! names that mean the same business state. All matching goes through
//! [`normalize`] (trim, lowercase, Portuguese accents folded), and every phrase
//! the sync understands is listed here and nowhere else.

use serde::{Deserialize, Serialize};

const CANCELLED: &[&str] = &["cancelado", "cancelada", "cancelled", "canceled"];
const RECEIVED_FROM_BANK: &[&str] = &["recebido do banco", "received from bank"];
const PAID_TO_CLIENT: &[&str] = &["pago ao cliente", "paid to client"];
const COMMISSION_PAID: &[&str] = &["comissao paga", "commission paid"];

/// Normalize a status value for comparison.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A raw status column value (possibly NULL in the view).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusText(Option<String>);

impl StatusText {
    pub fn new(raw: Option<impl Into<String>>) -> Self {
        Self(raw.map(Into::into))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    fn is_one_of(&self, phrases: &[&str]) -> bool {
        match &self.0 {
            Some(raw) => {
                let n = normalize(raw);
                phrases.iter().any(|p| *p == n)
            }
            None => false,
        }
    }

    pub fn is_paid_to_client(&self) -> bool {
        self.is_one_of(PAID_TO_CLIENT)
    }

    pub fn is_commission_paid(&self) -> bool {
        self.is_one_of(COMMISSION_PAID)
    }
}

impl From<&str> for StatusText {
    fn from(value: &str) -> Self {
        Self(Some(value.to_string()))
    }
}

/// Bank-settlement status of the principal document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankSettlement {
    Cancelled,
    ReceivedFromBank,
    /// Anything else, including a missing value (kept for diagnostics).
    Other(Option<String>),
}

impl BankSettlement {
    pub fn from_status(status: &StatusText) -> Self {
        if status.is_one_of(CANCELLED) {
            BankSettlement::Cancelled
        } else if status.is_one_of(RECEIVED_FROM_BANK) {
            BankSettlement::ReceivedFromBank
        } else {
            BankSettlement::Other(status.as_deref().map(str::to_string))
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BankSettlement::Cancelled)
    }

    pub fn is_received(&self) -> bool {
        matches!(self, BankSettlement::ReceivedFromBank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bank_status_matches_regardless_of_case_and_accents() {
        assert!(BankSettlement::from_status(&"Cancelled".into()).is_cancelled());
        assert!(BankSettlement::from_status(&"  CANCELADO ".into()).is_cancelled());
        assert!(BankSettlement::from_status(&"Received from bank".into()).is_received());
        assert!(BankSettlement::from_status(&"Recebido  do Banco".into()).is_received());
    }

    #[test]
    fn unknown_or_missing_bank_status_is_other() {
        assert_eq!(
            BankSettlement::from_status(&StatusText::empty()),
            BankSettlement::Other(None)
        );
        assert_eq!(
            BankSettlement::from_status(&"Aguardando".into()),
            BankSettlement::Other(Some("Aguardando".to_string()))
        );
    }

    #[test]
    fn payment_phrases() {
        assert!(StatusText::from("Pago ao Cliente").is_paid_to_client());
        assert!(StatusText::from("Comissão Paga").is_commission_paid());
        assert!(!StatusText::from("Comissão Pendente").is_commission_paid());
        assert!(!StatusText::empty().is_paid_to_client());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC{0,24}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
