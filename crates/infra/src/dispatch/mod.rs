//! Rate-limited dispatch lane with retry, backoff, and cooldown handling.
//!
//! ## Design
//!
//! - One process-wide lane; every remote call goes through it
//! - At most `concurrency` tasks in flight (configured to 1), admitted FIFO
//! - Minimum spacing between call starts, retries included
//! - Account-wide cooldown: a blocked call pauses the whole lane
//! - Transient failures retried with exponential backoff up to a bound
//! - Duplicate-entry faults resolved as success
//!
//! ## Components
//!
//! - `RetryPolicy`: backoff clock and retry bound
//! - `classify`: maps a failed call to cooldown / already-applied / transient
//! - `Dispatcher`: the lane itself (`submit`, `drain`)
//! - `CallTask` / `CallOutcome`: what goes in, what comes out

pub mod backoff;
pub mod classifier;
pub mod dispatcher;
pub mod types;

pub use backoff::RetryPolicy;
pub use classifier::{Classification, classify};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
pub use types::{AttemptRecord, CallFailure, CallOutcome, CallTask, OmieFault, WaitKind};
