//! Postgres-backed record source.
//!
//! Reads one operational view. Amount columns are converted to centavos in SQL
//! (`ROUND(x * 100)::bigint`) so no floating point crosses the boundary, and
//! the reference date is read as text and parsed by the domain date rules.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use omiesync_core::{Amount, ContractId, DomainError, SourceRecord, StatusText};

use super::{RecordSource, SourceError};

pub struct PostgresRecordSource {
    pool: PgPool,
    view: String,
}

impl std::fmt::Debug for PostgresRecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRecordSource")
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl PostgresRecordSource {
    pub fn new(pool: PgPool, view: impl Into<String>) -> Result<Self, SourceError> {
        let view = view.into();
        validate_view_name(&view)?;
        Ok(Self { pool, view })
    }

    /// Build a source over a lazily-connected pool. The database is first
    /// contacted on `fetch`, so an unreachable database fails the run rather
    /// than process startup.
    pub fn connect_lazy(database_url: &str, view: impl Into<String>) -> Result<Self, SourceError> {
        let view = view.into();
        validate_view_name(&view)?;
        let pool = PgPool::connect_lazy(database_url).map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool, view })
    }

    fn query(&self) -> String {
        format!(
            r#"
            SELECT
                contract_id::text AS contract_id,
                reference_date::text AS reference_date,
                ROUND(document_amount * 100)::bigint AS document_amount,
                ROUND(gross_amount * 100)::bigint AS gross_amount,
                ROUND(contract_amount * 100)::bigint AS contract_amount,
                ROUND(net_amount * 100)::bigint AS net_amount,
                ROUND(commission_amount * 100)::bigint AS commission_amount,
                ROUND(commission_amount_alt * 100)::bigint AS commission_amount_alt,
                bank_status::text AS bank_status,
                client_payment_status::text AS client_payment_status,
                client_payment_status_alt::text AS client_payment_status_alt,
                commission_status::text AS commission_status,
                commission_status_alt::text AS commission_status_alt
            FROM {}
            "#,
            self.view
        )
    }
}

/// `schema.view` or `view`, plain identifiers only.
fn validate_view_name(view: &str) -> Result<(), SourceError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = view.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| valid_part(p)) {
        Ok(())
    } else {
        Err(SourceError::InvalidViewName(view.to_string()))
    }
}

#[async_trait]
impl RecordSource for PostgresRecordSource {
    async fn fetch(&self) -> Result<Vec<SourceRecord>, SourceError> {
        let rows = sqlx::query(&self.query())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let parsed = SourceRow::from_pg(row)
                .map_err(|e| e.to_string())
                .and_then(|r| r.into_record().map_err(|e| e.to_string()));
            match parsed {
                Ok(record) => records.push(record),
                Err(error) => warn!(view = %self.view, row = index, %error, "skipping unreadable source row"),
            }
        }
        debug!(view = %self.view, rows = rows.len(), records = records.len(), "source rows fetched");
        Ok(records)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SourceError {
    match err {
        sqlx::Error::Database(db_err) => {
            SourceError::Database(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            SourceError::Unavailable(format!("{} failed: {}", operation, err))
        }
        _ => SourceError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Raw view row, amounts already in centavos.
#[derive(Debug, Default)]
struct SourceRow {
    contract_id: Option<String>,
    reference_date: Option<String>,
    document_amount: Option<i64>,
    gross_amount: Option<i64>,
    contract_amount: Option<i64>,
    net_amount: Option<i64>,
    commission_amount: Option<i64>,
    commission_amount_alt: Option<i64>,
    bank_status: Option<String>,
    client_payment_status: Option<String>,
    client_payment_status_alt: Option<String>,
    commission_status: Option<String>,
    commission_status_alt: Option<String>,
}

impl SourceRow {
    fn from_pg(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(SourceRow {
            contract_id: row.try_get("contract_id")?,
            reference_date: row.try_get("reference_date")?,
            document_amount: row.try_get("document_amount")?,
            gross_amount: row.try_get("gross_amount")?,
            contract_amount: row.try_get("contract_amount")?,
            net_amount: row.try_get("net_amount")?,
            commission_amount: row.try_get("commission_amount")?,
            commission_amount_alt: row.try_get("commission_amount_alt")?,
            bank_status: row.try_get("bank_status")?,
            client_payment_status: row.try_get("client_payment_status")?,
            client_payment_status_alt: row.try_get("client_payment_status_alt")?,
            commission_status: row.try_get("commission_status")?,
            commission_status_alt: row.try_get("commission_status_alt")?,
        })
    }

    fn into_record(self) -> Result<SourceRecord, DomainError> {
        let contract_id = ContractId::new(self.contract_id.unwrap_or_default())?;
        let cents = |v: Option<i64>| v.map(Amount::from_cents);
        Ok(SourceRecord {
            contract_id,
            reference_date: self.reference_date,
            document_amount: cents(self.document_amount),
            gross_amount: cents(self.gross_amount),
            contract_amount: cents(self.contract_amount),
            net_amount: cents(self.net_amount),
            commission_amount: cents(self.commission_amount),
            commission_amount_alt: cents(self.commission_amount_alt),
            bank_status: StatusText::new(self.bank_status),
            client_payment_status: StatusText::new(self.client_payment_status),
            client_payment_status_alt: StatusText::new(self.client_payment_status_alt),
            commission_status: StatusText::new(self.commission_status),
            commission_status_alt: StatusText::new(self.commission_status_alt),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_names_must_be_plain_identifiers() {
        assert!(validate_view_name("vw_omie_sync").is_ok());
        assert!(validate_view_name("finance.vw_omie_sync").is_ok());
        assert!(validate_view_name("_v1").is_ok());

        for bad in ["", "1view", "a.b.c", "vw; DROP TABLE x", "vw-sync", "public."] {
            assert_eq!(
                validate_view_name(bad),
                Err(SourceError::InvalidViewName(bad.to_string())),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn row_converts_cents_and_statuses() {
        let row = SourceRow {
            contract_id: Some(" 1042 ".into()),
            reference_date: Some("2024-03-01".into()),
            gross_amount: Some(150_050),
            commission_amount_alt: Some(2_500),
            bank_status: Some("Recebido do banco".into()),
            client_payment_status: Some("Pago ao cliente".into()),
            ..Default::default()
        };
        let record = row.into_record().unwrap();

        assert_eq!(record.contract_id.as_str(), "1042");
        assert_eq!(record.principal_amount(), Some(Amount::from_cents(150_050)));
        assert_eq!(record.commission(), Some(Amount::from_cents(2_500)));
        assert!(record.bank_settlement().is_received());
        assert!(record.is_paid_to_client());
        assert!(!record.is_commission_paid());
    }

    #[test]
    fn row_without_contract_id_is_rejected() {
        assert!(SourceRow::default().into_record().is_err());
        let blank = SourceRow {
            contract_id: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.into_record().is_err());
    }
}
