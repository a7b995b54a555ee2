//! Identifiers used across the domain.
//!
//! `ContractId` is the stable business identifier carried by every source row.
//! `IntegrationKey` is the caller-generated idempotency token the remote ledger
//! stores alongside each entry; it embeds the contract id so a key seen in a
//! remote error message can be traced back to its record.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Business identifier of a source record (contract number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

impl ContractId {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(DomainError::invalid_id("ContractId: empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ContractId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContractId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Which side of the books a ledger entry belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Money owed to the business (principal document).
    Receivable,
    /// Money owed by the business (commission).
    Payable,
}

impl Side {
    /// Single-letter prefix used in integration keys.
    pub fn key_prefix(self) -> char {
        match self {
            Side::Receivable => 'R',
            Side::Payable => 'P',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Receivable => "receivable",
            Side::Payable => "payable",
        }
    }
}

impl core::fmt::Display for Side {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record-pass unique token shared by both sides' integration keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySuffix(String);

impl KeySuffix {
    const LEN: usize = 10;

    /// Generate a fresh suffix from the random tail of a UUIDv7.
    pub fn generate() -> Self {
        let hex = Uuid::now_v7().simple().to_string();
        Self(hex[hex.len() - Self::LEN..].to_string())
    }

    /// Use a fixed suffix (tests, replays).
    pub fn fixed(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Idempotency token correlating one logical ledger entry to one sync attempt.
///
/// Format: `<side prefix><contract id>-<suffix>`, e.g. `R1042-0f3a9c11d2`.
/// The create call and its settle call for the same side must carry the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationKey(String);

impl IntegrationKey {
    pub fn new(side: Side, contract: &ContractId, suffix: &KeySuffix) -> Self {
        Self(format!(
            "{}{}-{}",
            side.key_prefix(),
            contract.as_str(),
            suffix.as_str()
        ))
    }

    /// Key of the settlement (baixa) registered against this entry.
    pub fn settlement_key(&self) -> String {
        format!("{}-B", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IntegrationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
