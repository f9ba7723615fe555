//! Ledger timestamp formatting.
//!
//! Ledger entries carry a wall-clock UTC timestamp in the same
//! `MM/DD/YYYY, HH:MM:SS` layout the annotation tooling has always used.

use chrono::{DateTime, NaiveDateTime, Utc};

/// `strftime` layout of every ledger timestamp.
pub const LEDGER_TIMESTAMP_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Current UTC time formatted for the ledger.
pub fn ledger_timestamp() -> String {
    format_ledger_timestamp(Utc::now())
}

/// Format an instant for the ledger.
pub fn format_ledger_timestamp(at: DateTime<Utc>) -> String {
    at.format(LEDGER_TIMESTAMP_FORMAT).to_string()
}

/// Parse a ledger timestamp back into a UTC instant.
pub fn parse_ledger_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(ts.trim(), LEDGER_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
