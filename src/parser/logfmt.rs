use chrono::{DateTime, Utc};
use fancy_regex::Regex;
use indexmap::IndexMap;
use std::sync::LazyLock;

use crate::parser::{iso, ContentType, FormatParser, LogLevel, ParseResult};

// key=value or key="quoted value" pairs
static LOGFMT_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w.]+)=(?:"([^"]*)"|(\S*))"#).unwrap());

const TIME_KEYS: [&str; 5] = ["time", "ts", "timestamp", "t", "datetime"];
const LEVEL_KEYS: [&str; 5] = ["level", "lvl", "severity", "loglevel", "log_level"];
const MSG_KEYS: [&str; 4] = ["msg", "message", "error", "err"];
const COMP_KEYS: [&str; 7] = [
    "service", "component", "app", "source", "caller", "logger", "name",
];

const MIN_LOGFMT_PAIRS: usize = 2;
const EPOCH_MS_THRESHOLD: f64 = 1e12;

/// Parses logfmt structured logs (`key=value` pairs).
///
/// Example: `time=2024-01-15T10:30:00Z level=info msg="request handled" service=api`
pub struct LogfmtParser;

impl FormatParser for LogfmtParser {
    fn name(&self) -> &'static str {
        "logfmt"
    }

    fn description(&self) -> &'static str {
        "logfmt key=value structured logs"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let mut data: IndexMap<&str, String> = IndexMap::new();
        let mut pair_count = 0;
        for caps in LOGFMT_PAIR_RE.captures_iter(raw).flatten() {
            let key = caps.get(1)?.as_str();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            data.insert(key, value);
            pair_count += 1;
        }
        if pair_count < MIN_LOGFMT_PAIRS {
            return None;
        }

        // A time-like key must be present for the line to count as logfmt
        if !TIME_KEYS.iter().any(|tk| data.contains_key(tk)) {
            return None;
        }
        let timestamp = TIME_KEYS
            .iter()
            .filter_map(|tk| data.get(tk))
            .find_map(|value| parse_timestamp(value));

        let log_level = LEVEL_KEYS
            .iter()
            .filter_map(|lk| data.get(lk))
            .find_map(|value| LogLevel::from_name(value));

        let content = MSG_KEYS
            .iter()
            .find_map(|mk| data.get(mk))
            .filter(|msg| !msg.is_empty())
            .cloned()
            .unwrap_or_else(|| raw.to_string());

        let component = COMP_KEYS.iter().find_map(|ck| data.get(ck)).cloned();

        Some(ParseResult {
            timestamp,
            content,
            content_type: ContentType::Text,
            parsed_json: None,
            log_level,
            component,
        })
    }
}

/// Parse a logfmt timestamp value: ISO 8601, else epoch seconds or
/// milliseconds (values above `1e12` read as milliseconds).
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Some(ts) = iso::parse_flexible_timestamp(value) {
        return Some(ts);
    }
    let num: f64 = value.parse().ok()?;
    let millis = if num > EPOCH_MS_THRESHOLD {
        num
    } else {
        num * 1000.0
    };
    DateTime::from_timestamp_millis(millis as i64)
}
