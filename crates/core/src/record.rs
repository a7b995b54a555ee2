//! Source record (one row of the operational view).
//!
//! The view carries several columns for the same logical value: up to four
//! candidate principal amounts, two candidate commission amounts, and two
//! equivalent columns for each payment status. Each logical field has exactly
//! one resolution method below, applied in the order the columns are declared:
//!
//! | logical field     | resolution                                                               |
//! |-------------------|--------------------------------------------------------------------------|
//! | principal amount  | first positive of `document_amount`, `gross_amount`, `contract_amount`, `net_amount` |
//! | commission amount | first positive of `commission_amount`, `commission_amount_alt`           |
//! | paid to client    | either `client_payment_status` or `client_payment_status_alt` matches    |
//! | commission paid   | either `commission_status` or `commission_status_alt` matches            |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::{BoundaryDate, resolve_date};
use crate::id::ContractId;
use crate::money::Amount;
use crate::status::{BankSettlement, StatusText};

/// One row read from the operational view. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub contract_id: ContractId,
    /// Reference date as delivered by the view (parsed at the boundary).
    pub reference_date: Option<String>,

    pub document_amount: Option<Amount>,
    pub gross_amount: Option<Amount>,
    pub contract_amount: Option<Amount>,
    pub net_amount: Option<Amount>,

    pub commission_amount: Option<Amount>,
    pub commission_amount_alt: Option<Amount>,

    pub bank_status: StatusText,
    pub client_payment_status: StatusText,
    pub client_payment_status_alt: StatusText,
    pub commission_status: StatusText,
    pub commission_status_alt: StatusText,
}

/// First candidate holding a positive amount; zero or negative columns are skipped.
fn first_positive(candidates: &[Option<Amount>]) -> Option<Amount> {
    candidates.iter().copied().flatten().find(|a| a.is_positive())
}

impl SourceRecord {
    /// Record with only the identifier set; fill the rest with struct update syntax.
    pub fn new(contract_id: ContractId) -> Self {
        Self {
            contract_id,
            reference_date: None,
            document_amount: None,
            gross_amount: None,
            contract_amount: None,
            net_amount: None,
            commission_amount: None,
            commission_amount_alt: None,
            bank_status: StatusText::empty(),
            client_payment_status: StatusText::empty(),
            client_payment_status_alt: StatusText::empty(),
            commission_status: StatusText::empty(),
            commission_status_alt: StatusText::empty(),
        }
    }

    pub fn principal_amount(&self) -> Option<Amount> {
        first_positive(&[
            self.document_amount,
            self.gross_amount,
            self.contract_amount,
            self.net_amount,
        ])
    }

    pub fn commission(&self) -> Option<Amount> {
        first_positive(&[self.commission_amount, self.commission_amount_alt])
    }

    pub fn bank_settlement(&self) -> BankSettlement {
        BankSettlement::from_status(&self.bank_status)
    }

    pub fn is_paid_to_client(&self) -> bool {
        self.client_payment_status.is_paid_to_client()
            || self.client_payment_status_alt.is_paid_to_client()
    }

    pub fn is_commission_paid(&self) -> bool {
        self.commission_status.is_commission_paid() || self.commission_status_alt.is_commission_paid()
    }

    /// Reference date resolved for the boundary (today when invalid).
    pub fn reference(&self, today: NaiveDate) -> BoundaryDate {
        resolve_date(self.reference_date.as_deref(), today)
    }
}
