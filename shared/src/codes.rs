//! Sequential business codes
//!
//! Gate entry codes are `<MMYY><seq>` and GRN codes are `GRN-<YY>-<seq>`,
//! with the sequence zero-padded to three digits and restarting each period.

use chrono::{DateTime, Utc};

/// Period key for gate entry codes, e.g. `1026` for October 2026
pub fn month_key(now: &DateTime<Utc>) -> String {
    now.format("%m%y").to_string()
}

/// Period key for GRN codes, e.g. `26`
pub fn year_key(now: &DateTime<Utc>) -> String {
    now.format("%y").to_string()
}

/// Prefix shared by every gate entry code of the period containing `now`
pub fn entry_code_prefix(now: &DateTime<Utc>) -> String {
    month_key(now)
}

/// Prefix shared by every GRN code of the period containing `now`
pub fn grn_code_prefix(now: &DateTime<Utc>) -> String {
    format!("GRN-{}-", year_key(now))
}

/// Next gate entry code given how many entries already exist in the period
pub fn next_entry_code(existing_in_period: i64, now: &DateTime<Utc>) -> String {
    format!("{}{:03}", entry_code_prefix(now), existing_in_period + 1)
}

/// Next GRN code given how many GRNs already exist in the period
pub fn next_grn_code(existing_in_period: i64, now: &DateTime<Utc>) -> String {
    format!("{}{:03}", grn_code_prefix(now), existing_in_period + 1)
}

/// Sequence number of a code within its period, if it carries `prefix`
pub fn sequence_of(code: &str, prefix: &str) -> Option<i64> {
    code.strip_prefix(prefix)?.parse().ok()
}
