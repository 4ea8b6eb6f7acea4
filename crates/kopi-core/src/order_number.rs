//! # Order Numbers
//!
//! Human-readable order numbers, unique per outlet per business day.
//!
//! ```text
//! outlet id "jkt-kemang-01"  ──► prefix "JKTK"
//! now 2026-10-18T18:30Z, +07:00 ──► business date 19/10/26
//! sequence key "JKTK191026"
//! order number "JKTK191026-001", "JKTK191026-002", ... "JKTK191026-1000"
//! ```
//!
//! The counter itself lives in storage; this module only formats keys and
//! numbers.
//!
//! ## Shared Prefixes
//! The key holds only the outlet prefix, so outlets whose ids reduce to the
//! same four characters (`jkt-kemang`, `jktk-01`) draw from one counter for
//! the day. Numbers stay unique across them; each outlet's own sequence
//! then has gaps.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Width of the outlet prefix.
pub const PREFIX_LEN: usize = 4;

/// First four alphanumerics of the outlet id, uppercased, padded with `X`.
pub fn outlet_prefix(outlet_id: &str) -> String {
    let mut prefix: String = outlet_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(PREFIX_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while prefix.len() < PREFIX_LEN {
        prefix.push('X');
    }
    prefix
}

/// The outlet-local calendar date of `now`.
pub fn business_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Builds a `FixedOffset` from whole hours east of UTC.
pub fn utc_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
}

/// `{prefix}{DDMMYY}`: the key one counter row is kept under.
pub fn sequence_key(outlet_id: &str, date: NaiveDate) -> String {
    format!("{}{}", outlet_prefix(outlet_id), date.format("%d%m%y"))
}

/// `{key}-{seq:03}`. Sequences past 999 simply grow wider.
///
/// ## Example
/// ```rust
/// use kopi_core::order_number::format_order_number;
///
/// assert_eq!(format_order_number("KEMA181026", 7), "KEMA181026-007");
/// assert_eq!(format_order_number("KEMA181026", 1234), "KEMA181026-1234");
/// ```
pub fn format_order_number(key: &str, sequence: i64) -> String {
    format!("{}-{:03}", key, sequence)
}
