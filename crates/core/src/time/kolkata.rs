use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

// Asia/Kolkata has been UTC+05:30 year-round since 1945, so a fixed offset is exact.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Calendar date "today" as seen in Asia/Kolkata.
///
/// The weather timeline API only accepts plain `YYYY-MM-DD` dates, so the
/// local calendar day is what has to go on the wire, not the UTC one.
pub fn kolkata_today(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    let ist = chrono::FixedOffset::east_opt(IST_OFFSET_SECS).context("invalid IST offset")?;
    Ok(now_utc.with_timezone(&ist).date_naive())
}

/// Inclusive date range requested from the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRange {
    /// `None` leaves the range open; the upstream API then picks its own default window.
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
}

impl FetchRange {
    pub fn ending_today(start: Option<NaiveDate>, now_utc: DateTime<Utc>) -> anyhow::Result<Self> {
        Ok(Self {
            start,
            end: kolkata_today(now_utc)?,
        })
    }

    /// A checkpoint after today leaves nothing to fetch.
    pub fn is_empty(&self) -> bool {
        self.start.is_some_and(|start| start > self.end)
    }

    pub fn start_param(&self) -> String {
        self.start.map(format_date).unwrap_or_default()
    }

    pub fn end_param(&self) -> String {
        format_date(self.end)
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Lenient date parsing for values produced by the backend.
///
/// Accepts plain dates, RFC 3339 and naive ISO timestamps, and HTTP-date style
/// RFC 2822 strings. Timestamps are reduced to their UTC calendar date.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    None
}
