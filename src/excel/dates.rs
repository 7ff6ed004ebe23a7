//! Date parsing shared by validation, upload generation and merge-back.

use chrono::{NaiveDate, NaiveDateTime};

use super::types::CellValue;

/// Accepted text formats, tried in this order
pub const ACCEPTED_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];

/// Parse a date cell. Date cells always parse; text tries
/// [`ACCEPTED_DATE_FORMATS`]; anything else yields `None`.
pub fn parse_cell_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::DateTime(iso) => parse_iso(iso),
        CellValue::String(s) => parse_text_date(s),
        _ => None,
    }
}

pub fn parse_text_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    ACCEPTED_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn parse_iso(iso: &str) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.date())
        .ok()
        .or_else(|| iso.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Digits-only form used for comparisons and merge keys
pub fn to_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Slash form expected by the portal upload sheet
pub fn to_slashed(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}
