//! `omiesync-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the source record as read from the operational view, the status vocabulary,
//! money, identifiers, and the date rules applied at the remote boundary.

pub mod dates;
pub mod error;
pub mod id;
pub mod money;
pub mod record;
pub mod status;

pub use dates::{BoundaryDate, format_boundary_date, resolve_date};
pub use error::{DomainError, DomainResult};
pub use id::{ContractId, IntegrationKey, KeySuffix, Side};
pub use money::Amount;
pub use record::SourceRecord;
pub use status::{BankSettlement, StatusText};
