use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a line's content is structured JSON or plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Text,
}

/// Log severity, ordered so that threshold comparisons work directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Normalize a level name, accepting the common synonyms found in
    /// the wild (`err`, `warning`, `critical`, `panic`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" | "dbg" => Some(Self::Debug),
            "info" | "information" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "fatal" | "critical" | "crit" | "panic" | "emerg" => Some(Self::Fatal),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    pub const fn severity(self) -> u8 {
        match self {
            Self::Trace => 0,
            Self::Debug => 1,
            Self::Info => 2,
            Self::Warn => 3,
            Self::Error => 4,
            Self::Fatal => 5,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parsed log line.
///
/// Created once by the parser at ingestion time and immutable
/// afterwards; the store never rewrites or deletes a published line.
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    /// 1-based position in the store, dense and stable.
    pub line_number: usize,
    /// The line exactly as it arrived (after decoding and size guard).
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub content_type: ContentType,
    /// Display form: the message with recognized prefixes stripped.
    pub content: String,
    /// Present iff `content_type == Json` and decoding succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// Logical source (pod/service/host) attributed to this line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Line number within the originating source, preserved across
    /// multi-file merges (equal to `line_number` for single sources).
    pub source_line: usize,
}

/// Intermediate result of a format parser's attempt on one raw line.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
    pub content_type: ContentType,
    pub parsed_json: Option<serde_json::Value>,
    pub log_level: Option<LogLevel>,
    pub component: Option<String>,
}

impl ParseResult {
    /// A text result with no timestamp or component.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            content: content.into(),
            content_type: ContentType::Text,
            parsed_json: None,
            log_level: None,
            component: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Fatal > LogLevel::Error);
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Warn > LogLevel::Info);
        assert!(LogLevel::Info > LogLevel::Debug);
        assert!(LogLevel::Debug > LogLevel::Trace);
    }

    #[test]
    fn test_level_synonyms() {
        assert_eq!(LogLevel::from_name("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_name("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_name("CRITICAL"), Some(LogLevel::Fatal));
        assert_eq!(LogLevel::from_name("panic"), Some(LogLevel::Fatal));
        assert_eq!(LogLevel::from_name(" info "), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_name("notice"), None);
    }

    #[test]
    fn test_level_serde_lowercase() {
        let json = serde_json::to_string(&LogLevel::Warn).unwrap();
        assert_eq!(json, "\"warn\"");
        let back: LogLevel = serde_json::from_str("\"fatal\"").unwrap();
        assert_eq!(back, LogLevel::Fatal);
    }
}
