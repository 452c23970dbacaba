use chrono::DateTime;
use serde_json::Value;

use crate::parser::{
    classify_content, extract_log_level, ContentType, FormatParser, LogLevel, ParseResult,
};

/// Parses `journalctl -o json` output.
///
/// Each line is a JSON object with well-known systemd fields:
/// `__REALTIME_TIMESTAMP`, `_HOSTNAME`, `SYSLOG_IDENTIFIER`,
/// `PRIORITY`, `MESSAGE`.
pub struct JournalctlParser;

impl FormatParser for JournalctlParser {
    fn name(&self) -> &'static str {
        "journalctl"
    }

    fn description(&self) -> &'static str {
        "systemd journalctl JSON output (journalctl -o json)"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let (content_type, parsed_json) = classify_content(raw);
        if content_type != ContentType::Json {
            return None;
        }
        let json = parsed_json?;
        let obj = json.as_object()?;

        // __REALTIME_TIMESTAMP is microseconds since the epoch
        let micros = obj
            .get("__REALTIME_TIMESTAMP")
            .or_else(|| obj.get("_SOURCE_REALTIME_TIMESTAMP"))
            .and_then(value_as_i64)?;
        let ts = DateTime::from_timestamp_micros(micros)?;

        let component = obj
            .get("SYSLOG_IDENTIFIER")
            .or_else(|| obj.get("_COMM"))
            .and_then(Value::as_str)
            .map(ToString::to_string);

        let mut log_level = obj.get("PRIORITY").and_then(priority_to_level);
        if log_level.is_none() {
            if let Some(message) = obj.get("MESSAGE").and_then(Value::as_str) {
                log_level = extract_log_level(message, None);
            }
        }

        Some(ParseResult {
            timestamp: Some(ts),
            content: raw.to_string(),
            content_type: ContentType::Json,
            parsed_json: Some(json),
            log_level,
            component,
        })
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Map a syslog severity (journald PRIORITY field) to a level.
fn priority_to_level(value: &Value) -> Option<LogLevel> {
    let priority = value_as_i64(value)?;
    match priority {
        0..=2 => Some(LogLevel::Fatal), // emerg, alert, crit
        3 => Some(LogLevel::Error),
        4 => Some(LogLevel::Warn),
        5 | 6 => Some(LogLevel::Info), // notice, info
        7 => Some(LogLevel::Debug),
        _ => None,
    }
}
