//! Ledger synchronization module (per-record track state machine).
//!
//! Pure domain logic only: no IO, no HTTP, no scheduling. The runtime in
//! `omiesync-infra` asks a [`TrackMachine`] for its next [`LedgerStep`], submits
//! it, and feeds the tagged [`OutcomeKind`] back in.

pub mod request;
pub mod track;

pub use request::{LedgerAccounts, LedgerRequest, OmieCall};
pub use track::{
    Exclusion, LedgerStep, OutcomeKind, RecordTracks, StepKind, TrackMachine, TrackState,
};

/// Days added to the reference date to obtain the due (and forecast) date.
pub const DUE_DATE_OFFSET_DAYS: u64 = 3;
