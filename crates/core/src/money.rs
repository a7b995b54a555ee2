//! Money in the smallest currency unit.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Monetary amount in centavos.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Parse a decimal string such as `"1234.5"` or `"1234,50"`.
    ///
    /// At most two fractional digits are accepted.
    pub fn parse_decimal(s: &str) -> Result<Self, DomainError> {
        let s = s.trim().replace(',', ".");
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.as_str()),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(DomainError::invalid_amount(format!("'{s}'")));
        }
        if frac.len() > 2 {
            return Err(DomainError::invalid_amount(format!(
                "'{s}' has more than two fractional digits"
            )));
        }
        let parse = |part: &str| -> Result<i64, DomainError> {
            if part.is_empty() {
                return Ok(0);
            }
            part.parse::<i64>()
                .map_err(|e| DomainError::invalid_amount(format!("'{s}': {e}")))
        };
        let whole = parse(whole)?;
        let frac = parse(&format!("{frac:0<2}"))?;
        let cents = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| DomainError::invalid_amount(format!("'{s}' overflows")))?;
        Ok(Self(if negative { -cents } else { cents }))
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Decimal value as sent to the remote API (`valor_documento`, `valor`).
    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}
