//! The dispatch lane.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, Semaphore, watch};
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, info, warn};

use omiesync_ledger::OutcomeKind;

use super::backoff::RetryPolicy;
use super::classifier::{Classification, classify};
use super::types::{AttemptRecord, CallFailure, CallOutcome, CallTask, WaitKind};
use crate::omie::LedgerTransport;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum tasks in flight.
    pub concurrency: usize,
    /// Minimum spacing between two call starts.
    pub interval: Duration,
    /// Per-call timeout.
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    /// Added on top of the wait the remote side asks for when it blocks the account.
    pub cooldown_padding: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            interval: Duration::from_millis(260),
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            cooldown_padding: Duration::from_secs(5),
            name: "omie-lane".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DispatcherStats {
    pub tasks_completed: u64,
    pub tasks_succeeded: u64,
    pub tasks_duplicated: u64,
    pub tasks_failed: u64,
    pub calls_started: u64,
    pub backoffs: u64,
    pub cooldowns: u64,
}

/// Shared pacing state: when the last call started, and the account-wide
/// instant before which no call may start.
#[derive(Debug, Default)]
struct PacingGate {
    last_start: Option<Instant>,
    resume_not_before: Option<Instant>,
}

struct Inner {
    config: DispatcherConfig,
    transport: Arc<dyn LedgerTransport>,
    lane: Semaphore,
    gate: AsyncMutex<PacingGate>,
    pending: watch::Sender<usize>,
    stats: Mutex<DispatcherStats>,
}

/// Process-wide, single-lane, interval-paced call queue.
///
/// Cloning yields another handle to the same lane. Construct once at startup
/// and pass it to whatever submits calls.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Counts a task as pending for as long as it is alive.
struct PendingGuard<'a>(&'a watch::Sender<usize>);

impl<'a> PendingGuard<'a> {
    fn enter(tx: &'a watch::Sender<usize>) -> Self {
        tx.send_modify(|n| *n += 1);
        Self(tx)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn LedgerTransport>, config: DispatcherConfig) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                lane: Semaphore::new(config.concurrency.max(1)),
                config,
                transport,
                gate: AsyncMutex::new(PacingGate::default()),
                pending,
                stats: Mutex::new(DispatcherStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Tasks queued or in flight.
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    pub fn stats(&self) -> DispatcherStats {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves once no task is queued or in flight.
    pub async fn drain(&self) {
        let mut rx = self.inner.pending.subscribe();
        // The sender lives in `Inner`, which outlives this borrow.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Run a task through the lane and return its outcome.
    ///
    /// Never fails: exhausted retries come back as an `OutcomeKind::Failure` outcome.
    pub async fn submit(&self, task: CallTask) -> CallOutcome {
        let _pending = PendingGuard::enter(&self.inner.pending);
        // The semaphore is never closed, so acquisition only waits.
        let _permit = self.inner.lane.acquire().await.ok();

        let outcome = self.run(task).await;
        self.record_stats(&outcome);

        match outcome.kind {
            OutcomeKind::Failure => warn!(
                lane = %self.inner.config.name,
                task = %outcome.label,
                attempts = outcome.attempts,
                error = outcome.error.as_deref().unwrap_or_default(),
                "task failed after exhausting retries"
            ),
            kind => info!(
                lane = %self.inner.config.name,
                task = %outcome.label,
                attempts = outcome.attempts,
                outcome = ?kind,
                "task completed"
            ),
        }
        outcome
    }

    async fn run(&self, task: CallTask) -> CallOutcome {
        let config = &self.inner.config;
        let key = task.integration_key.clone();
        let mut attempt = 1u32;
        let mut history = Vec::new();

        loop {
            self.wait_for_slot().await;
            self.bump(|s| s.calls_started += 1);

            let result = match timeout(
                config.call_timeout,
                self.inner.transport.execute(&task.request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CallFailure::timeout(config.call_timeout)),
            };

            let failure = match result {
                Ok(response) => {
                    return finish(
                        task,
                        OutcomeKind::Success,
                        Some(response),
                        None,
                        attempt,
                        history,
                    );
                }
                Err(failure) => failure,
            };

            match classify(&failure, key.as_deref()) {
                Classification::BlockingCooldown { seconds } => {
                    let wait = Duration::from_secs(seconds) + config.cooldown_padding;
                    warn!(
                        lane = %config.name,
                        task = %task.label,
                        seconds,
                        wait_secs = wait.as_secs(),
                        "remote API blocked the account; pausing the lane"
                    );
                    history.push(AttemptRecord::new(
                        attempt,
                        &failure,
                        Some((WaitKind::Cooldown, wait)),
                    ));
                    self.bump(|s| s.cooldowns += 1);
                    self.impose_cooldown(wait).await;
                }
                Classification::AlreadyApplied => {
                    debug!(
                        lane = %config.name,
                        task = %task.label,
                        detail = %failure.detail,
                        "remote side already has this operation"
                    );
                    let sentinel = CallOutcome::duplicate_sentinel(&failure.detail);
                    let mut outcome = finish(
                        task,
                        OutcomeKind::DuplicateSuccess,
                        Some(sentinel),
                        None,
                        attempt,
                        history,
                    );
                    outcome.http_status = failure.http_status;
                    return outcome;
                }
                Classification::Transient if config.retry.should_retry(attempt) => {
                    let delay = config.retry.delay_for_attempt(attempt);
                    debug!(
                        lane = %config.name,
                        task = %task.label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "transient failure; backing off"
                    );
                    history.push(AttemptRecord::new(
                        attempt,
                        &failure,
                        Some((WaitKind::Backoff, delay)),
                    ));
                    self.bump(|s| s.backoffs += 1);
                    sleep(delay).await;
                    attempt += 1;
                }
                Classification::Transient => {
                    history.push(AttemptRecord::new(attempt, &failure, None));
                    let mut outcome = finish(
                        task,
                        OutcomeKind::Failure,
                        None,
                        Some(failure.to_string()),
                        attempt,
                        history,
                    );
                    outcome.http_status = failure.http_status;
                    return outcome;
                }
            }
        }
    }

    /// Wait until a call may start, then claim the start slot.
    ///
    /// The gate is released while sleeping so a cooldown imposed meanwhile is
    /// seen on the next check.
    async fn wait_for_slot(&self) {
        let interval = self.inner.config.interval;
        loop {
            let earliest = {
                let mut gate = self.inner.gate.lock().await;
                let now = Instant::now();
                let mut earliest = now;
                if let Some(last) = gate.last_start {
                    earliest = earliest.max(last + interval);
                }
                if let Some(resume) = gate.resume_not_before {
                    earliest = earliest.max(resume);
                }
                if earliest <= now {
                    gate.last_start = Some(now);
                    return;
                }
                earliest
            };
            sleep_until(earliest).await;
        }
    }

    async fn impose_cooldown(&self, wait: Duration) {
        let until = Instant::now() + wait;
        let mut gate = self.inner.gate.lock().await;
        gate.resume_not_before = Some(match gate.resume_not_before {
            Some(current) => current.max(until),
            None => until,
        });
    }

    fn bump(&self, f: impl FnOnce(&mut DispatcherStats)) {
        let mut stats = self
            .inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }

    fn record_stats(&self, outcome: &CallOutcome) {
        self.bump(|s| {
            s.tasks_completed += 1;
            match outcome.kind {
                OutcomeKind::Success => s.tasks_succeeded += 1,
                OutcomeKind::DuplicateSuccess => s.tasks_duplicated += 1,
                OutcomeKind::Failure => s.tasks_failed += 1,
            }
        });
    }
}

fn finish(
    task: CallTask,
    kind: OutcomeKind,
    response: Option<serde_json::Value>,
    error: Option<String>,
    attempts: u32,
    history: Vec<AttemptRecord>,
) -> CallOutcome {
    CallOutcome {
        call: task.request.call,
        label: task.label,
        integration_key: task.integration_key,
        kind,
        response,
        error,
        http_status: None,
        attempts,
        history,
    }
}
