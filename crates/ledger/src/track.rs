//! Per-record track state machine.
//!
//! Each record has two independent tracks (receivable, payable). A track moves
//! `NotStarted -> Created -> Settled`, or straight to `Excluded` when its create
//! guard fails. A settle step is only offered after the create step reported a
//! *logical* success (true success or a duplicate the remote side already had).
//!
//! ```text
//!              guard fails
//! NotStarted ──────────────▶ Excluded
//!     │ create ok/duplicate
//!     ▼
//!  Created ──(settle guard && settle ok/duplicate)──▶ Settled
//! ```
//!
//! A failed step leaves the state where it was and halts the track for the run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use omiesync_core::{Amount, BoundaryDate, ContractId, IntegrationKey, KeySuffix, Side, SourceRecord};

use crate::DUE_DATE_OFFSET_DAYS;
use crate::request::{LedgerAccounts, LedgerRequest};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    NotStarted,
    Created,
    Settled,
    Excluded,
}

/// Why a track never left `NotStarted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    /// Bank-settlement status is cancelled (receivable).
    Cancelled,
    /// Not yet paid to the client (payable).
    NotPaidToClient,
    /// No positive amount could be resolved for this side.
    MissingAmount,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Create,
    Settle,
}

/// Tagged result of one submitted step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    /// The remote side reported the operation as already applied.
    DuplicateSuccess,
    Failure,
}

impl OutcomeKind {
    pub fn is_logical_success(self) -> bool {
        matches!(self, OutcomeKind::Success | OutcomeKind::DuplicateSuccess)
    }
}

/// A step the machine wants submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStep {
    pub side: Side,
    pub kind: StepKind,
    pub integration_key: IntegrationKey,
    pub request: LedgerRequest,
    pub label: String,
}

/// State machine for one side of one record.
#[derive(Debug, Clone)]
pub struct TrackMachine {
    side: Side,
    contract: ContractId,
    key: IntegrationKey,
    accounts: LedgerAccounts,
    amount: Amount,
    due: BoundaryDate,
    settle_on: NaiveDate,
    may_settle: bool,
    state: TrackState,
    exclusion: Option<Exclusion>,
    halted: bool,
}

impl TrackMachine {
    /// Receivable track: principal amount, gated on the bank-settlement status.
    pub fn receivable(
        record: &SourceRecord,
        suffix: &KeySuffix,
        accounts: &LedgerAccounts,
        today: NaiveDate,
    ) -> Self {
        let bank = record.bank_settlement();
        let exclusion = bank.is_cancelled().then_some(Exclusion::Cancelled);
        Self::build(
            Side::Receivable,
            record,
            suffix,
            accounts,
            today,
            record.principal_amount(),
            exclusion,
            bank.is_received(),
        )
    }

    /// Payable track: commission amount, gated on the client/commission payment statuses.
    pub fn payable(
        record: &SourceRecord,
        suffix: &KeySuffix,
        accounts: &LedgerAccounts,
        today: NaiveDate,
    ) -> Self {
        let exclusion = (!record.is_paid_to_client()).then_some(Exclusion::NotPaidToClient);
        Self::build(
            Side::Payable,
            record,
            suffix,
            accounts,
            today,
            record.commission(),
            exclusion,
            record.is_commission_paid(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        side: Side,
        record: &SourceRecord,
        suffix: &KeySuffix,
        accounts: &LedgerAccounts,
        today: NaiveDate,
        amount: Option<Amount>,
        exclusion: Option<Exclusion>,
        may_settle: bool,
    ) -> Self {
        let exclusion = exclusion.or_else(|| match amount {
            Some(a) if a.is_positive() => None,
            _ => Some(Exclusion::MissingAmount),
        });
        let state = if exclusion.is_some() {
            TrackState::Excluded
        } else {
            TrackState::NotStarted
        };
        let due = if exclusion.is_some() {
            BoundaryDate::exact(today)
        } else {
            record.reference(today).plus_days(DUE_DATE_OFFSET_DAYS)
        };

        Self {
            side,
            contract: record.contract_id.clone(),
            key: IntegrationKey::new(side, &record.contract_id, suffix),
            accounts: accounts.clone(),
            amount: amount.unwrap_or(Amount::ZERO),
            due,
            settle_on: today,
            may_settle,
            state,
            exclusion,
            halted: false,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn exclusion(&self) -> Option<&Exclusion> {
        self.exclusion.as_ref()
    }

    pub fn integration_key(&self) -> &IntegrationKey {
        &self.key
    }

    /// True once the track will not offer further steps this run.
    pub fn is_finished(&self) -> bool {
        self.next_step().is_none()
    }

    /// The step to submit next, if any.
    pub fn next_step(&self) -> Option<LedgerStep> {
        if self.halted {
            return None;
        }
        match self.state {
            TrackState::NotStarted => Some(self.step(
                StepKind::Create,
                LedgerRequest::create_entry(
                    self.side,
                    &self.key,
                    &self.contract,
                    &self.accounts,
                    &self.due,
                    self.amount,
                ),
            )),
            TrackState::Created if self.may_settle => Some(self.step(
                StepKind::Settle,
                LedgerRequest::settle_entry(
                    self.side,
                    &self.key,
                    &self.contract,
                    &self.accounts,
                    self.settle_on,
                    self.amount,
                ),
            )),
            TrackState::Created | TrackState::Settled | TrackState::Excluded => None,
        }
    }

    fn step(&self, kind: StepKind, request: LedgerRequest) -> LedgerStep {
        LedgerStep {
            side: self.side,
            kind,
            integration_key: self.key.clone(),
            label: format!("{} contrato {} ({})", request.call, self.contract, self.key),
            request,
        }
    }

    /// Apply the outcome of a submitted step.
    ///
    /// Outcomes for a step the machine is not currently offering are ignored.
    pub fn apply(&mut self, kind: StepKind, outcome: OutcomeKind) -> TrackState {
        match (self.state, kind) {
            (TrackState::NotStarted, StepKind::Create) | (TrackState::Created, StepKind::Settle)
                if !self.halted =>
            {
                if outcome.is_logical_success() {
                    self.state = match kind {
                        StepKind::Create => TrackState::Created,
                        StepKind::Settle => TrackState::Settled,
                    };
                } else {
                    self.halted = true;
                }
            }
            _ => {
                tracing::debug!(
                    side = %self.side,
                    state = ?self.state,
                    step = ?kind,
                    "ignoring outcome for a step that was not offered"
                );
            }
        }
        self.state
    }
}

/// Both tracks of one record, sharing the per-record key suffix.
#[derive(Debug, Clone)]
pub struct RecordTracks {
    pub receivable: TrackMachine,
    pub payable: TrackMachine,
}

impl RecordTracks {
    pub fn new(
        record: &SourceRecord,
        suffix: &KeySuffix,
        accounts: &LedgerAccounts,
        today: NaiveDate,
    ) -> Self {
        Self {
            receivable: TrackMachine::receivable(record, suffix, accounts, today),
            payable: TrackMachine::payable(record, suffix, accounts, today),
        }
    }

    /// Tracks in processing order (receivable first).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackMachine> {
        [&mut self.receivable, &mut self.payable].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omiesync_core::StatusText;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn accounts() -> LedgerAccounts {
        LedgerAccounts {
            counterparty_code: 1,
            receivable_category: "1.01.01".to_string(),
            payable_category: "2.01.01".to_string(),
            account_id: 7,
        }
    }

    fn record(bank: &str) -> SourceRecord {
        SourceRecord {
            reference_date: Some("2024-06-20".to_string()),
            document_amount: Some(Amount::from_cents(10_000)),
            commission_amount: Some(Amount::from_cents(1_500)),
            bank_status: StatusText::from(bank),
            ..SourceRecord::new(ContractId::new("500").unwrap())
        }
    }

    fn receivable(r: &SourceRecord) -> TrackMachine {
        TrackMachine::receivable(r, &KeySuffix::fixed("x"), &accounts(), today())
    }

    /// Drive a track to completion, answering every step with `answer`.
    fn drive(m: &mut TrackMachine, answer: impl Fn(StepKind) -> OutcomeKind) -> Vec<LedgerStep> {
        let mut issued = Vec::new();
        while let Some(step) = m.next_step() {
            let kind = step.kind;
            issued.push(step);
            m.apply(kind, answer(kind));
        }
        issued
    }

    #[test]
    fn cancelled_receivable_issues_nothing() {
        let r = record("Cancelled");
        let mut m = receivable(&r);

        assert_eq!(m.state(), TrackState::Excluded);
        assert_eq!(m.exclusion(), Some(&Exclusion::Cancelled));
        assert!(drive(&mut m, |_| OutcomeKind::Success).is_empty());
    }

    #[test]
    fn cancelled_receivable_leaves_payable_independent() {
        let r = SourceRecord {
            client_payment_status: "Pago ao cliente".into(),
            ..record("Cancelado")
        };
        let mut tracks = RecordTracks::new(&r, &KeySuffix::fixed("x"), &accounts(), today());

        assert_eq!(tracks.receivable.state(), TrackState::Excluded);
        let steps = drive(&mut tracks.payable, |_| OutcomeKind::Success);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, StepKind::Create);
        assert_eq!(tracks.payable.state(), TrackState::Created);
    }

    #[test]
    fn received_from_bank_creates_then_settles_same_amount() {
        let r = record("Received from bank");
        let mut m = receivable(&r);
        let steps = drive(&mut m, |_| OutcomeKind::Success);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind, StepKind::Create);
        assert_eq!(steps[1].kind, StepKind::Settle);
        assert_eq!(steps[0].request.amount(), steps[1].request.amount());
        assert_eq!(steps[0].integration_key, steps[1].integration_key);
        assert_eq!(steps[0].request.param["data_vencimento"], "23/06/2024");
        assert_eq!(steps[1].request.param["data"], "01/07/2024");
        assert_eq!(m.state(), TrackState::Settled);
    }

    #[test]
    fn create_without_settle_guard_stays_created() {
        let r = record("Aguardando");
        let mut m = receivable(&r);
        let steps = drive(&mut m, |_| OutcomeKind::Success);

        assert_eq!(steps.len(), 1);
        assert_eq!(m.state(), TrackState::Created);
        assert!(m.is_finished());
    }

    #[test]
    fn failed_create_never_settles() {
        let r = record("Recebido do banco");
        let mut m = receivable(&r);
        let steps = drive(&mut m, |_| OutcomeKind::Failure);

        assert_eq!(steps.len(), 1);
        assert_eq!(m.state(), TrackState::NotStarted);
    }

    #[test]
    fn duplicate_create_still_allows_settle() {
        let r = record("Recebido do banco");
        let mut m = receivable(&r);
        let steps = drive(&mut m, |kind| match kind {
            StepKind::Create => OutcomeKind::DuplicateSuccess,
            StepKind::Settle => OutcomeKind::Success,
        });

        assert_eq!(steps.len(), 2);
        assert_eq!(m.state(), TrackState::Settled);
    }

    #[test]
    fn failed_settle_stays_created() {
        let r = record("Recebido do banco");
        let mut m = receivable(&r);
        drive(&mut m, |kind| match kind {
            StepKind::Create => OutcomeKind::Success,
            StepKind::Settle => OutcomeKind::Failure,
        });
        assert_eq!(m.state(), TrackState::Created);
        assert!(m.is_finished());
    }

    #[test]
    fn payable_requires_paid_to_client_and_settles_on_commission_paid() {
        let not_paid = record("Recebido do banco");
        let m = TrackMachine::payable(&not_paid, &KeySuffix::fixed("x"), &accounts(), today());
        assert_eq!(m.exclusion(), Some(&Exclusion::NotPaidToClient));

        let paid = SourceRecord {
            client_payment_status_alt: "Paid to client".into(),
            commission_status_alt: "Commission paid".into(),
            ..record("Recebido do banco")
        };
        let mut m = TrackMachine::payable(&paid, &KeySuffix::fixed("x"), &accounts(), today());
        let steps = drive(&mut m, |_| OutcomeKind::Success);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].request.amount(), Some(15.0));
        assert_eq!(steps[0].request.param["codigo_categoria"], "2.01.01");
        assert_eq!(steps[1].integration_key.as_str(), "P500-x");
    }

    #[test]
    fn missing_amount_excludes_track() {
        let r = SourceRecord {
            document_amount: None,
            ..record("Recebido do banco")
        };
        let m = receivable(&r);
        assert_eq!(m.exclusion(), Some(&Exclusion::MissingAmount));
        assert!(m.next_step().is_none());
    }

    #[test]
    fn stray_outcomes_are_ignored() {
        let r = record("Recebido do banco");
        let mut m = receivable(&r);
        assert_eq!(m.apply(StepKind::Settle, OutcomeKind::Success), TrackState::NotStarted);
    }

    proptest! {
        /// Property: a settle step is only ever issued after a logically successful create,
        /// and a track never issues more than two steps.
        #[test]
        fn settle_only_follows_logical_success(
            bank in prop::sample::select(vec!["Cancelado", "Recebido do banco", "Aguardando", ""]),
            create in prop::sample::select(vec![
                OutcomeKind::Success,
                OutcomeKind::DuplicateSuccess,
                OutcomeKind::Failure,
            ]),
        ) {
            let r = record(bank);
            let mut m = receivable(&r);
            let steps = drive(&mut m, |kind| match kind {
                StepKind::Create => create,
                StepKind::Settle => OutcomeKind::Success,
            });

            prop_assert!(steps.len() <= 2);
            if steps.iter().any(|s| s.kind == StepKind::Settle) {
                prop_assert!(create.is_logical_success());
                prop_assert_eq!(steps[0].kind, StepKind::Create);
            }
        }
    }
}
