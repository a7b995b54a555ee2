//! Date rules at the remote boundary.
//!
//! Every date sent to the ledger API is `DD/MM/YYYY`. A source date that is
//! missing or cannot be parsed resolves to *today* instead of being rejected;
//! the substitution is reported through `tracing` and flagged on the result so
//! callers can surface it, but the value sent out stays today's date.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use serde::Serialize;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
/// Postgres `timestamptz::text`, e.g. `2024-03-01 10:00:00+00`.
const OFFSET_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

/// A date resolved for the remote boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct BoundaryDate {
    pub value: NaiveDate,
    /// True when the source value was missing/invalid and today was used instead.
    pub substituted: bool,
}

impl BoundaryDate {
    pub fn exact(value: NaiveDate) -> Self {
        Self {
            value,
            substituted: false,
        }
    }

    /// Shift forward by whole days (due date = reference + N days).
    pub fn plus_days(self, days: u64) -> Self {
        Self {
            value: self
                .value
                .checked_add_days(Days::new(days))
                .unwrap_or(self.value),
            substituted: self.substituted,
        }
    }

    pub fn formatted(&self) -> String {
        format_boundary_date(self.value)
    }
}

/// Render a date the way the remote API expects it.
pub fn format_boundary_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn parse(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, OFFSET_DATETIME_FORMAT))
    {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

/// Resolve a raw source date, falling back to `today`.
pub fn resolve_date(raw: Option<&str>, today: NaiveDate) -> BoundaryDate {
    match raw.and_then(parse) {
        Some(value) => BoundaryDate::exact(value),
        None => {
            tracing::warn!(
                raw = raw.unwrap_or("<null>"),
                today = %today,
                "source date missing or invalid; using today"
            );
            BoundaryDate {
                value: today,
                substituted: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn accepts_iso_brazilian_and_timestamp_forms() {
        let today = d(2024, 1, 1);
        assert_eq!(resolve_date(Some("2024-03-15"), today).value, d(2024, 3, 15));
        assert_eq!(resolve_date(Some("15/03/2024"), today).value, d(2024, 3, 15));
        assert_eq!(
            resolve_date(Some("2024-03-15T10:00:00-03:00"), today).value,
            d(2024, 3, 15)
        );
        assert_eq!(
            resolve_date(Some("2024-03-15 23:59:59"), today).value,
            d(2024, 3, 15)
        );
        assert_eq!(
            resolve_date(Some("2024-03-15 10:00:00+00"), today).value,
            d(2024, 3, 15)
        );
        assert_eq!(
            resolve_date(Some("2024-03-15 10:00:00.5-03"), today).value,
            d(2024, 3, 15)
        );
    }

    #[test]
    fn invalid_or_missing_becomes_today() {
        let today = d(2024, 6, 30);
        let bad = resolve_date(Some("31/02/2024"), today);
        assert_eq!(bad.value, today);
        assert!(bad.substituted);

        let missing = resolve_date(None, today);
        assert_eq!(missing.value, today);
        assert!(missing.substituted);
    }

    #[test]
    fn due_date_rolls_over_month_end() {
        let due = BoundaryDate::exact(d(2024, 2, 28)).plus_days(3);
        assert_eq!(due.formatted(), "02/03/2024");
    }

    proptest! {
        #[test]
        fn formatted_dates_round_trip_through_the_parser(days in 0u64..40_000) {
            let date = d(1970, 1, 1).checked_add_days(Days::new(days)).unwrap();
            let text = format_boundary_date(date);
            prop_assert_eq!(text.len(), 10);
            prop_assert_eq!(resolve_date(Some(&text), d(2000, 1, 1)).value, date);
        }
    }
}
