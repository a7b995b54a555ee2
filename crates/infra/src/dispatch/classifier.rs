//! Classification of failed remote calls.
//!
//! The remote API reports rate-limit blocks and idempotent replays as faults.
//! A block pauses the whole lane; a replay of something the remote side already
//! has is a success as far as the create/settle dependency is concerned.

use super::types::CallFailure;

/// Fault code the remote API uses when it blocks an account for misuse.
pub const COOLDOWN_FAULT_CODE: &str = "MISUSE_API_PROCESS";
/// Text present in block messages, alongside the wait time in seconds.
pub const COOLDOWN_MARKER: &str = "consumo indevido";
/// Wait used when a block message carries no parseable number.
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Fault code for "entry already registered under this integration key".
pub const DUPLICATE_FAULT_CODE: &str = "SOAP-ENV:Client-102";
/// Phrases meaning the entry already exists (matched lowercase).
pub const DUPLICATE_PHRASES: &[&str] = &["já existe", "já cadastrad", "already exists"];
/// `codigo_erro` values meaning the entry already exists.
pub const DUPLICATE_ERROR_CODES: &[&str] = &["102", "1104"];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Account-wide block; no call may start for `seconds` (+ padding).
    BlockingCooldown { seconds: u64 },
    /// The remote side already has this operation.
    AlreadyApplied,
    /// Anything else; retry with backoff.
    Transient,
}

/// Classify a failed call. HTTP status does not take part in the decision.
pub fn classify(failure: &CallFailure, integration_key: Option<&str>) -> Classification {
    let faultstring = failure.faultstring().unwrap_or_default();

    if failure.faultcode() == Some(COOLDOWN_FAULT_CODE)
        || faultstring.to_lowercase().contains(COOLDOWN_MARKER)
    {
        return Classification::BlockingCooldown {
            seconds: embedded_seconds(faultstring).unwrap_or(DEFAULT_COOLDOWN_SECS),
        };
    }

    if is_duplicate(failure, faultstring, integration_key) {
        return Classification::AlreadyApplied;
    }

    Classification::Transient
}

fn is_duplicate(failure: &CallFailure, faultstring: &str, integration_key: Option<&str>) -> bool {
    let keyed = failure.faultcode() == Some(DUPLICATE_FAULT_CODE)
        && integration_key.is_some_and(|k| !k.is_empty() && faultstring.contains(k));
    if keyed {
        return true;
    }

    let phrase = [faultstring, failure.detail.as_str()].iter().any(|text| {
        let text = text.to_lowercase();
        DUPLICATE_PHRASES.iter().any(|p| text.contains(p))
    });
    if phrase {
        return true;
    }

    failure
        .codigo_erro()
        .is_some_and(|code| DUPLICATE_ERROR_CODES.contains(&code.trim()))
}

/// First run of ASCII digits in `text`.
fn embedded_seconds(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
