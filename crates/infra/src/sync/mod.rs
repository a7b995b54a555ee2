//! Run orchestrator.
//!
//! One run: fetch the record set once, then for each record (in source order)
//! drive the receivable track and then the payable track to completion through
//! the shared dispatcher, awaiting each step before offering the next. After the
//! last record the dispatcher is drained and the counters are finalized.
//!
//! Task-level failures are counted, never propagated. Only a failure to read
//! the record set ends the run early, before any remote call is issued.

pub mod summary;

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use omiesync_core::{KeySuffix, SourceRecord};
use omiesync_ledger::{Exclusion, LedgerAccounts, RecordTracks, TrackMachine};

use crate::dispatch::{CallTask, Dispatcher};
use crate::source::{RecordSource, SourceError};

pub use summary::{CallReport, RunCounters, RunStatus, RunSummary};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch source records: {0}")]
    RecordFetch(#[from] SourceError),
}

#[derive(Clone)]
pub struct SyncRunner {
    source: Arc<dyn RecordSource>,
    dispatcher: Dispatcher,
    accounts: LedgerAccounts,
    today: Option<NaiveDate>,
}

impl std::fmt::Debug for SyncRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRunner")
            .field("dispatcher", &self.dispatcher)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}

impl SyncRunner {
    pub fn new(source: Arc<dyn RecordSource>, dispatcher: Dispatcher, accounts: LedgerAccounts) -> Self {
        Self {
            source,
            dispatcher,
            accounts,
            today: None,
        }
    }

    /// Pin "today" (settlement date and date fallback). Defaults to the local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Execute one full pass.
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        let records = self.source.fetch().await.map_err(|e| {
            error!(error = %e, "record fetch failed; aborting run");
            SyncError::from(e)
        })?;

        let today = self.today();
        info!(records = records.len(), %today, "sync run started");

        let mut counters = RunCounters::new(records.len());
        for record in &records {
            self.process_record(record, today, &mut counters).await;
            counters.records_processed += 1;
        }

        // Lane-wide: also waits for tasks submitted by an overlapping run.
        self.dispatcher.drain().await;

        info!(
            records = counters.records_found,
            processed = counters.records_processed,
            successful = counters.successful,
            failed = counters.failed,
            "sync run finished"
        );
        Ok(counters.finish())
    }

    async fn process_record(&self, record: &SourceRecord, today: NaiveDate, counters: &mut RunCounters) {
        let suffix = KeySuffix::generate();
        let mut tracks = RecordTracks::new(record, &suffix, &self.accounts, today);
        debug!(contract = %record.contract_id, suffix = suffix.as_str(), "processing record");

        for track in tracks.iter_mut() {
            log_exclusion(record, track);
            self.drive(track, counters).await;
        }
    }

    async fn drive(&self, track: &mut TrackMachine, counters: &mut RunCounters) {
        while let Some(step) = track.next_step() {
            let kind = step.kind;
            let outcome = self.dispatcher.submit(CallTask::from(step)).await;
            counters.record(&outcome);
            track.apply(kind, outcome.kind);
        }
    }
}

fn log_exclusion(record: &SourceRecord, track: &TrackMachine) {
    match track.exclusion() {
        Some(Exclusion::MissingAmount) => warn!(
            contract = %record.contract_id,
            side = %track.side(),
            "no positive amount for this side; skipping"
        ),
        Some(reason) => debug!(
            contract = %record.contract_id,
            side = %track.side(),
            ?reason,
            "track excluded"
        ),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{CallFailure, DispatcherConfig, OmieFault, RetryPolicy};
    use crate::omie::InMemoryLedger;
    use crate::source::InMemoryRecordSource;
    use omiesync_core::{Amount, ContractId};
    use omiesync_ledger::OmieCall;
    use std::time::Duration;

    fn accounts() -> LedgerAccounts {
        LedgerAccounts {
            counterparty_code: 9001,
            receivable_category: "1.01.01".into(),
            payable_category: "2.01.01".into(),
            account_id: 42,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    /// Record eligible for all four calls.
    fn eligible(contract: &str) -> SourceRecord {
        SourceRecord {
            reference_date: Some("2024-03-01".into()),
            document_amount: Some(Amount::from_cents(150_000)),
            commission_amount: Some(Amount::from_cents(12_550)),
            bank_status: "Recebido do banco".into(),
            client_payment_status: "Pago ao cliente".into(),
            commission_status: "Comissão paga".into(),
            ..SourceRecord::new(ContractId::new(contract).unwrap())
        }
    }

    fn runner(records: Vec<SourceRecord>, ledger: Arc<InMemoryLedger>) -> SyncRunner {
        let dispatcher = Dispatcher::new(
            ledger,
            DispatcherConfig::default()
                .with_name("sync-test")
                .with_retry(RetryPolicy::exponential(5, Duration::from_millis(100))),
        );
        SyncRunner::new(Arc::new(InMemoryRecordSource::new(records)), dispatcher, accounts())
            .with_today(today())
    }

    fn transient() -> CallFailure {
        CallFailure::fault(
            503,
            OmieFault {
                faultcode: Some("SOAP-ENV:Server".into()),
                faultstring: Some("Service unavailable".into()),
                codigo_erro: None,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fully_eligible_record_issues_four_successful_calls() {
        let ledger = Arc::new(InMemoryLedger::new());
        let summary = runner(vec![eligible("1042")], ledger.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.total_registros_encontrados, 1);
        assert_eq!(summary.registros_processados, 1);
        assert_eq!(summary.successful_omie_operations, 4);
        assert_eq!(summary.failed_omie_operations, 0);

        let calls: Vec<_> = ledger.calls().iter().map(|r| r.call).collect();
        assert_eq!(
            calls,
            vec![
                OmieCall::IncluirContaReceber,
                OmieCall::LancarRecebimento,
                OmieCall::IncluirContaPagar,
                OmieCall::LancarPagamento,
            ]
        );

        let requests = ledger.calls();
        assert_eq!(requests[0].param["data_vencimento"], "04/03/2024");
        assert_eq!(requests[1].param["data"], "10/03/2024");
        assert_eq!(requests[0].amount(), requests[1].amount());
        assert_eq!(requests[2].amount(), Some(125.5));

        // Both sides share the record's suffix.
        let r_key = requests[0].param["codigo_lancamento_integracao"].as_str().unwrap();
        let p_key = requests[2].param["codigo_lancamento_integracao"].as_str().unwrap();
        assert!(r_key.starts_with("R1042-"));
        assert_eq!(&r_key[1..], &p_key[1..]);
        assert!(ledger.is_settled(r_key) && ledger.is_settled(p_key));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_record_skips_receivable_but_evaluates_payable() {
        let ledger = Arc::new(InMemoryLedger::new());
        let record = SourceRecord {
            bank_status: "Cancelado".into(),
            ..eligible("7")
        };
        let summary = runner(vec![record], ledger.clone()).run().await.unwrap();

        let calls: Vec<_> = ledger.calls().iter().map(|r| r.call).collect();
        assert_eq!(
            calls,
            vec![OmieCall::IncluirContaPagar, OmieCall::LancarPagamento]
        );
        assert_eq!(summary.successful_omie_operations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn received_status_missing_only_creates_the_receivable() {
        let ledger = Arc::new(InMemoryLedger::new());
        let record = SourceRecord {
            bank_status: "Aguardando".into(),
            client_payment_status: "Pendente".into(),
            ..eligible("8")
        };
        let summary = runner(vec![record], ledger.clone()).run().await.unwrap();

        let calls: Vec<_> = ledger.calls().iter().map(|r| r.call).collect();
        assert_eq!(calls, vec![OmieCall::IncluirContaReceber]);
        assert_eq!(summary.successful_omie_operations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_create_is_counted_once_and_blocks_its_settle() {
        let ledger = Arc::new(InMemoryLedger::new());
        for _ in 0..5 {
            ledger.fail_next(transient());
        }
        let summary = runner(vec![eligible("9")], ledger.clone()).run().await.unwrap();

        assert_eq!(summary.failed_omie_operations, 1);
        assert_eq!(summary.successful_omie_operations, 2);
        assert_eq!(summary.registros_processados, 1);

        let failed = &summary.results[0];
        assert_eq!(failed.call, OmieCall::IncluirContaReceber);
        assert!(!failed.success);
        assert_eq!(failed.attempts, 5);
        assert_eq!(failed.http_status, Some(503));

        // Five create attempts, no receivable settle, then the payable pair.
        let calls: Vec<_> = ledger.calls().iter().map(|r| r.call).collect();
        assert_eq!(calls.len(), 7);
        assert!(!calls.contains(&OmieCall::LancarRecebimento));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_create_still_allows_the_settle() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.apply_then_fail_next(CallFailure::fault(
            500,
            OmieFault {
                faultcode: Some("SOAP-ENV:Client-5".into()),
                faultstring: Some("ERROR: Lançamento já cadastrado".into()),
                codigo_erro: None,
            },
        ));
        let record = SourceRecord {
            client_payment_status: "".into(),
            ..eligible("10")
        };
        let summary = runner(vec![record], ledger.clone()).run().await.unwrap();

        assert!(summary.results[0].resolved_duplicate);
        assert!(summary.results[0].success);
        assert_eq!(summary.results[1].call, OmieCall::LancarRecebimento);
        assert_eq!(summary.failed_omie_operations, 0);
        assert_eq!(summary.successful_omie_operations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_commission_excludes_the_payable_track() {
        let ledger = Arc::new(InMemoryLedger::new());
        let record = SourceRecord {
            commission_amount: None,
            ..eligible("11")
        };
        let summary = runner(vec![record], ledger.clone()).run().await.unwrap();

        assert_eq!(summary.successful_omie_operations, 2);
        assert!(
            ledger
                .calls()
                .iter()
                .all(|r| r.call.side() == omiesync_core::Side::Receivable)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_leading_amount_column_falls_back_to_the_next_one() {
        let ledger = Arc::new(InMemoryLedger::new());
        let record = SourceRecord {
            document_amount: Some(Amount::ZERO),
            gross_amount: Some(Amount::from_cents(50_000)),
            ..eligible("12")
        };
        let summary = runner(vec![record], ledger.clone()).run().await.unwrap();

        assert_eq!(summary.successful_omie_operations, 4);
        assert_eq!(summary.failed_omie_operations, 0);
        let receivables = ledger
            .calls()
            .iter()
            .filter(|r| r.call.side() == omiesync_core::Side::Receivable)
            .count();
        assert_eq!(receivables, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_runs_share_the_lane_but_keep_their_own_counters() {
        let ledger = Arc::new(InMemoryLedger::new());
        let first = runner(vec![eligible("21"), eligible("22")], ledger.clone());
        let second = SyncRunner::new(
            Arc::new(InMemoryRecordSource::new(vec![eligible("23")])),
            first.dispatcher().clone(),
            accounts(),
        )
        .with_today(today());

        let (a, b) = tokio::join!(first.run(), second.run());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.successful_omie_operations, 8);
        assert_eq!(b.successful_omie_operations, 4);
        assert_eq!(first.dispatcher().pending(), 0);
        assert_eq!(ledger.calls().len(), 12);
        let starts = ledger.call_instants();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(260));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn records_are_processed_in_source_order() {
        let ledger = Arc::new(InMemoryLedger::new());
        let summary = runner(vec![eligible("2"), eligible("1")], ledger.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.registros_processados, 2);
        assert_eq!(summary.successful_omie_operations, 8);
        assert_eq!(ledger.calls()[0].param["numero_documento"], "2");
        assert_eq!(ledger.calls()[4].param["numero_documento"], "1");
        assert_eq!(ledger.call_instants().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn source_failure_is_critical_and_issues_no_calls() {
        let ledger = Arc::new(InMemoryLedger::new());
        let dispatcher = Dispatcher::new(ledger.clone(), DispatcherConfig::default());
        let runner = SyncRunner::new(
            Arc::new(InMemoryRecordSource::failing(SourceError::Unavailable(
                "connection refused".into(),
            ))),
            dispatcher,
            accounts(),
        );

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, SyncError::RecordFetch(_)));
        assert!(err.to_string().contains("connection refused"));
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_record_set_completes_with_zero_counts() {
        let ledger = Arc::new(InMemoryLedger::new());
        let summary = runner(Vec::new(), ledger.clone()).run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.total_registros_encontrados, 0);
        assert!(summary.results.is_empty());
        assert!(ledger.calls().is_empty());
    }
}
