pub mod apache;
pub mod docker;
pub mod iso;
pub mod journalctl;
pub mod kubernetes;
pub mod line;
pub mod logfmt;
pub mod python_logging;
pub mod syslog;

pub use line::{ContentType, LogLevel, LogLine, ParseResult};

use fancy_regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// JSON decode attempts are capped so a pathological line cannot make
/// content classification arbitrarily expensive.
const JSON_SIZE_GUARD: usize = 256 * 1024;

/// Number of leading non-empty lines sampled for format detection.
pub const DETECT_SAMPLE_LINES: usize = 20;

/// A parser must recognize more than this fraction of the sample to
/// be selected for the whole source.
const DETECT_MIN_RATE: f64 = 0.5;

// Level text patterns: [LEVEL], level=value, then a standalone LEVEL word
static LEVEL_BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(TRACE|DEBUG|DBG|INFO|WARN|WARNING|ERROR|ERR|FATAL|CRITICAL|CRIT|PANIC|EMERG)\]")
        .unwrap()
});
static LEVEL_KV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:level|severity)=(\w+)").unwrap());
static LEVEL_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)(TRACE|DEBUG|DBG|INFO|WARN|WARNING|ERROR|ERR|FATAL|CRITICAL)\s")
        .unwrap()
});

/// JSON field names checked for the log level, in priority order.
const LEVEL_JSON_KEYS: [&str; 5] = ["log_level", "level", "severity", "loglevel", "lvl"];

/// JSON field names checked for the component, in priority order.
const COMPONENT_JSON_KEYS: [&str; 6] = ["service", "component", "app", "source", "container", "pod"];

const ERROR_HINT_KEYWORDS: [&str; 7] = [
    "fail", "refused", "denied", "timeout", "abort", "segfault", "panic",
];
const WARN_HINT_KEYWORDS: [&str; 5] = ["deprecated", "warning:", "warn:", "cannot", "unable"];

/// Capability interface every log dialect implements.
///
/// `try_parse` must never fail loudly: `None` is the no-match signal,
/// so one malformed line can never abort ingestion.
pub trait FormatParser: Send + Sync {
    /// Short identifier for this parser (e.g. "syslog").
    fn name(&self) -> &'static str;

    /// One-line description shown in CLI help.
    fn description(&self) -> &'static str;

    /// Attempt to parse a raw log line; `None` if the line does not
    /// match this format.
    fn try_parse(&self, raw: &str) -> Option<ParseResult>;
}

/// How the registry picks a parser for each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserChoice {
    /// Try every registered parser in priority order, per line.
    /// Required for merged multi-format/multi-component streams.
    Auto,
    /// A fixed parser selected by [`ParserRegistry::detect`].
    Fixed(usize),
}

/// Holds all format parsers in declared priority order.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn FormatParser>>,
}

impl ParserRegistry {
    /// An empty registry; formats must be registered explicitly.
    pub const fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// The default registry with every built-in dialect, most
    /// specific first. Adding a format is one `register` call; the
    /// dispatch never changes.
    pub fn with_default_formats() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(docker::DockerParser));
        registry.register(Box::new(kubernetes::KubernetesParser));
        registry.register(Box::new(journalctl::JournalctlParser));
        registry.register(Box::new(python_logging::PythonLoggingParser));
        registry.register(Box::new(apache::ApacheParser));
        registry.register(Box::new(syslog::SyslogParser));
        registry.register(Box::new(logfmt::LogfmtParser));
        registry.register(Box::new(iso::IsoParser));
        registry
    }

    /// Append a parser at the lowest priority.
    pub fn register(&mut self, parser: Box<dyn FormatParser>) {
        self.parsers.push(parser);
    }

    /// Registered parsers in priority order.
    pub fn parsers(&self) -> impl Iterator<Item = &dyn FormatParser> {
        self.parsers.iter().map(Box::as_ref)
    }

    /// Consume the registry, yielding its parsers in priority order.
    pub fn into_parsers(self) -> Vec<Box<dyn FormatParser>> {
        self.parsers
    }

    /// Look up a parser index by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.parsers.iter().position(|p| p.name() == name)
    }

    /// Pick a parser by sampling raw input lines.
    ///
    /// For each parser in priority order the match-rate over the first
    /// [`DETECT_SAMPLE_LINES`] non-empty lines is computed; the first
    /// parser whose rate exceeds 50% wins. `None` means no parser
    /// qualifies and the caller should fall back to per-line auto
    /// mode. Deterministic for a fixed sample and priority order.
    pub fn detect(&self, sample: &[String]) -> Option<usize> {
        let sampled: Vec<&str> = sample
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .take(DETECT_SAMPLE_LINES)
            .collect();
        if sampled.is_empty() {
            return None;
        }

        for (index, parser) in self.parsers.iter().enumerate() {
            let matched = sampled
                .iter()
                .filter(|raw| parser.try_parse(raw).is_some())
                .count();
            let rate = matched as f64 / sampled.len() as f64;
            if rate > DETECT_MIN_RATE {
                debug!(
                    parser = parser.name(),
                    matched,
                    sampled = sampled.len(),
                    "format detected"
                );
                return Some(index);
            }
        }
        debug!("no parser exceeded the detection threshold, using per-line auto mode");
        None
    }

    /// Parse one raw line into a [`LogLine`].
    ///
    /// Never fails: when no parser matches, the line is emitted as an
    /// unparsed text line carrying the original raw text (content
    /// classification and level extraction still run on it).
    pub fn parse(&self, line_number: usize, raw: &str, choice: ParserChoice) -> LogLine {
        let result = match choice {
            ParserChoice::Fixed(index) => {
                self.parsers.get(index).and_then(|p| p.try_parse(raw))
            }
            ParserChoice::Auto => self.parsers.iter().find_map(|p| p.try_parse(raw)),
        };

        match result {
            Some(mut result) => {
                // A recognized timestamp without an explicit level reads as routine output
                if result.log_level.is_none() && result.timestamp.is_some() {
                    result.log_level = Some(LogLevel::Info);
                }
                LogLine {
                    line_number,
                    raw: raw.to_string(),
                    timestamp: result.timestamp,
                    content_type: result.content_type,
                    content: result.content,
                    parsed_json: result.parsed_json,
                    log_level: result.log_level,
                    component: result.component,
                    source_line: line_number,
                }
            }
            None => {
                let (content_type, parsed_json) = classify_content(raw);
                let log_level = extract_log_level(raw, parsed_json.as_ref());
                LogLine {
                    line_number,
                    raw: raw.to_string(),
                    timestamp: None,
                    content_type,
                    content: raw.to_string(),
                    parsed_json,
                    log_level,
                    component: None,
                    source_line: line_number,
                }
            }
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_default_formats()
    }
}

// ============================================================================
// Shared utilities used by all format parsers
// ============================================================================

/// Classify content as JSON or plain text.
///
/// Leading `{` heuristic first, then a guarded decode; the result must
/// be a JSON object for the line to count as structured.
pub fn classify_content(content: &str) -> (ContentType, Option<Value>) {
    let stripped = content.trim();
    if stripped.starts_with('{') && stripped.len() <= JSON_SIZE_GUARD {
        if let Ok(value) = serde_json::from_str::<Value>(stripped) {
            if value.is_object() {
                return (ContentType::Json, Some(value));
            }
        }
    }
    (ContentType::Text, None)
}

/// Extract the log level from content or parsed JSON.
///
/// Fixed precedence: JSON fields, then text patterns (`[ERROR]`,
/// `level=warn`, standalone word), then keyword heuristics. The
/// timestamp-implies-info default is applied by the caller, which
/// knows whether a timestamp was recognized.
pub fn extract_log_level(content: &str, parsed_json: Option<&Value>) -> Option<LogLevel> {
    if let Some(obj) = parsed_json.and_then(Value::as_object) {
        for key in LEVEL_JSON_KEYS {
            if let Some(value) = obj.get(key) {
                if let Some(level) = LogLevel::from_name(&json_value_to_string(value)) {
                    return Some(level);
                }
            }
        }
    }

    for pattern in [&*LEVEL_BRACKET_RE, &*LEVEL_KV_RE, &*LEVEL_WORD_RE] {
        if let Ok(Some(caps)) = pattern.captures(content) {
            if let Some(level) = caps.get(1).and_then(|m| LogLevel::from_name(m.as_str())) {
                return Some(level);
            }
        }
    }

    let lower = content.to_ascii_lowercase();
    if ERROR_HINT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(LogLevel::Error);
    }
    if WARN_HINT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(LogLevel::Warn);
    }

    None
}

/// Extract the component name from JSON fields (first string wins).
pub fn extract_component_from_json(parsed_json: Option<&Value>) -> Option<String> {
    let obj = parsed_json.and_then(Value::as_object)?;
    for key in COMPONENT_JSON_KEYS {
        if let Some(Value::String(s)) = obj.get(key) {
            return Some(s.clone());
        }
    }
    None
}

/// Render a JSON leaf the way filters compare it: strings unquoted,
/// everything else via its JSON form.
pub fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Month abbreviation to number, for syslog/CLF timestamps.
pub(crate) fn month_number(name: &str) -> Option<u32> {
    match name {
        "Jan" => Some(1),
        "Feb" => Some(2),
        "Mar" => Some(3),
        "Apr" => Some(4),
        "May" => Some(5),
        "Jun" => Some(6),
        "Jul" => Some(7),
        "Aug" => Some(8),
        "Sep" => Some(9),
        "Oct" => Some(10),
        "Nov" => Some(11),
        "Dec" => Some(12),
        _ => None,
    }
}
