//! Date-sharded deployment of on-disk indexes.
//!
//! Shards are named `{YYYY-MM-DD}_{tag}.index`; the date substring is
//! authoritative for date-range query routing.

pub mod manager;
pub mod worker;

pub use manager::{SearchHits, ShardManager};
pub use worker::ShardWorker;

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Error, Result};

/// Inclusive lower bound of an unrestricted date window.
pub const MIN_DATE: &str = "0000-00-00";

/// Inclusive upper bound of an unrestricted date window.
pub const MAX_DATE: &str = "9999-99-99";

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}[-/]\d{2}[-/]\d{2}").expect("static date pattern"))
}

fn normalize(raw: &str) -> String {
    raw.replace('/', "-")
}

fn is_real_date(iso: &str) -> bool {
    NaiveDate::parse_from_str(iso, "%Y-%m-%d").is_ok()
}

/// First ISO date in a shard or index filename, normalized to `YYYY-MM-DD`.
/// Matches that are not real calendar dates are ignored.
pub fn extract_date(name: &str) -> Option<String> {
    date_regex()
        .find_iter(name)
        .map(|m| normalize(m.as_str()))
        .find(|d| is_real_date(d))
}

/// Like [`extract_date`], but rejects a filename carrying more than one
/// date: mergers must not guess which one governs grouping.
pub fn extract_date_strict(name: &str) -> Result<Option<String>> {
    let mut dates = date_regex()
        .find_iter(name)
        .map(|m| normalize(m.as_str()))
        .filter(|d| is_real_date(d));
    let first = dates.next();
    if first.is_some() && dates.next().is_some() {
        return Err(Error::AmbiguousDate(name.to_string()));
    }
    Ok(first)
}

/// Whether a window covers everything, making dateless shards addressable.
pub fn window_is_unrestricted(start: &str, end: &str) -> bool {
    start <= MIN_DATE && end >= MAX_DATE
}
