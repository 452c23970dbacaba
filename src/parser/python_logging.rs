use chrono::{Duration, NaiveDateTime};
use fancy_regex::Regex;
use std::sync::LazyLock;

use crate::parser::{
    classify_content, extract_log_level, FormatParser, LogLevel, ParseResult,
};

// Python logging default format: "2024-01-15 10:30:00,123 - name - LEVEL - message"
// Also matches: "2024-01-15 10:30:00,123 name LEVEL message" (without separators)
// The comma before milliseconds distinguishes this from generic iso.
static PYTHON_LOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}),(\d{3})\s+(?:-\s+)?([\w.]+)\s+(?:-\s+)?([A-Z]+)\s+(?:-\s+)?(.*)$",
    )
    .unwrap()
});

/// Parses the Python stdlib logging default format.
pub struct PythonLoggingParser;

impl FormatParser for PythonLoggingParser {
    fn name(&self) -> &'static str {
        "python"
    }

    fn description(&self) -> &'static str {
        "Python logging (YYYY-MM-DD HH:MM:SS,ms - name - LEVEL - msg)"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let m = PYTHON_LOG_RE.captures(raw).ok().flatten()?;
        let naive = NaiveDateTime::parse_from_str(m.get(1)?.as_str(), "%Y-%m-%d %H:%M:%S").ok()?;
        let millis: i64 = m.get(2)?.as_str().parse().ok()?;
        let ts = (naive + Duration::milliseconds(millis)).and_utc();

        let log_level = LogLevel::from_name(m.get(4)?.as_str());
        let component = Some(m.get(3)?.as_str().to_string());
        let content = m.get(5)?.as_str().to_string();

        let (content_type, parsed_json) = classify_content(&content);
        // Prefer the level named by the format itself
        let log_level =
            log_level.or_else(|| extract_log_level(&content, parsed_json.as_ref()));

        Some(ParseResult {
            timestamp: Some(ts),
            content,
            content_type,
            parsed_json,
            log_level,
            component,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_dashed_format() {
        let result = PythonLoggingParser
            .try_parse("2024-01-15 10:30:00,123 - myapp.worker - ERROR - task crashed")
            .unwrap();
        assert_eq!(result.component.as_deref(), Some("myapp.worker"));
        assert_eq!(result.log_level, Some(LogLevel::Error));
        assert_eq!(result.content, "task crashed");
        assert_eq!(result.timestamp.unwrap().nanosecond(), 123_000_000);
    }

    #[test]
    fn test_undashed_format() {
        let result = PythonLoggingParser
            .try_parse("2024-01-15 10:30:00,001 root WARNING low disk space")
            .unwrap();
        assert_eq!(result.component.as_deref(), Some("root"));
        assert_eq!(result.log_level, Some(LogLevel::Warn));
        assert_eq!(result.content, "low disk space");
    }

    #[test]
    fn test_iso_without_comma_is_no_match() {
        assert!(PythonLoggingParser
            .try_parse("2024-01-15 10:30:00.123 name INFO message")
            .is_none());
    }
}
