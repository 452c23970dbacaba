use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use fancy_regex::Regex;
use std::sync::LazyLock;

use crate::parser::{
    classify_content, extract_component_from_json, extract_log_level, FormatParser, ParseResult,
};

// ISO 8601: "2024-01-15T10:30:00Z", "2024-01-15 10:30:00.123", "2024-01-15T10:30:00+02:00"
static ISO_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}[\sT]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+")
        .unwrap()
});

// Simple date-time with slashes: "2024/01/15 10:30:00"
static SLASH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})/(\d{2})/(\d{2})\s+(\d{2}):(\d{2}):(\d{2})\s+").unwrap()
});

/// Parses lines with ISO 8601 or slash-date timestamps.
pub struct IsoParser;

impl FormatParser for IsoParser {
    fn name(&self) -> &'static str {
        "iso"
    }

    fn description(&self) -> &'static str {
        "ISO 8601 and slash-date timestamps (generic)"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let (ts, content) = try_iso(raw).or_else(|| try_slash_date(raw))?;
        let (content_type, parsed_json) = classify_content(content);
        let log_level = extract_log_level(content, parsed_json.as_ref());
        let component = extract_component_from_json(parsed_json.as_ref());
        Some(ParseResult {
            timestamp: Some(ts),
            content: content.to_string(),
            content_type,
            parsed_json,
            log_level,
            component,
        })
    }
}

/// Try to strip an ISO 8601 timestamp off the start of the line.
/// Returns the timestamp and the remainder after it.
pub(crate) fn try_iso(raw: &str) -> Option<(DateTime<Utc>, &str)> {
    let m = ISO_SPACE_RE.captures(raw).ok().flatten()?;
    let dt = m.get(1)?;
    let ts = parse_flexible_timestamp(dt.as_str())?;
    let end = m.get(0)?.end();
    Some((ts, &raw[end..]))
}

/// Try to strip a slash-separated date-time off the start of the line.
pub(crate) fn try_slash_date(raw: &str) -> Option<(DateTime<Utc>, &str)> {
    let m = SLASH_DATE_RE.captures(raw).ok().flatten()?;
    let field = |i: usize| m.get(i).and_then(|g| g.as_str().parse::<u32>().ok());
    let year = m.get(1)?.as_str().parse::<i32>().ok()?;
    let ts = Utc
        .with_ymd_and_hms(year, field(2)?, field(3)?, field(4)?, field(5)?, field(6)?)
        .single()?;
    let end = m.get(0)?.end();
    Some((ts, &raw[end..]))
}

/// Parse an ISO 8601 timestamp string in its common variants: `T` or
/// space separator, optional fraction, optional `Z` or numeric offset
/// (with or without colon). Naive timestamps are assumed UTC.
pub(crate) fn parse_flexible_timestamp(text: &str) -> Option<DateTime<Utc>> {
    // Normalize the separator so one set of format strings covers both
    let mut normalized = text.to_string();
    if let Some(sep) = normalized.get(10..11) {
        if sep != "T" {
            normalized.replace_range(10..11, "T");
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts.with_timezone(&Utc));
    }
    // Offsets without a colon ("+0200") are not valid RFC 3339
    if let Ok(ts) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
