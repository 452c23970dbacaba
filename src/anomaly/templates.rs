//! Message-template extraction and grouping.
//!
//! Variable substrings are replaced by typed placeholders so that
//! structurally identical messages collapse into one template. The
//! substitution order is fixed (UUID, IP, timestamp, hex, path,
//! number) to avoid double substitution; tokenization is a pure
//! function of the message text, deterministic and order-independent.

use crate::parser::{ContentType, LogLevel, LogLine};
use ahash::{AHashMap, AHashSet};
use fancy_regex::Regex;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::LazyLock;

// Tokenization patterns, in substitution order
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static IP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap());
static TS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}[\w.+:-]*").unwrap());
static HEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{8,}\b").unwrap());
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/[\w./-]+").unwrap());
static NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+\.?\d*").unwrap());

/// JSON fields commonly holding the event identifier, in priority
/// order.
const EVENT_KEYS: [&str; 8] = [
    "event",
    "message",
    "msg",
    "error",
    "err",
    "description",
    "text",
    "action",
];

/// JSON keys skipped by field analysis (noise/boilerplate).
const SKIP_FIELD_KEYS: [&str; 12] = [
    "timestamp",
    "time",
    "ts",
    "@timestamp",
    "request_id",
    "trace_id",
    "span_id",
    "level",
    "log_level",
    "severity",
    "loglevel",
    "lvl",
];

/// Field analysis skips string values longer than this.
const MAX_FIELD_VALUE_LEN: usize = 50;

/// Keys with more distinct string values than this are skipped.
pub const FIELD_CARDINALITY_LIMIT: usize = 20;

/// Fields present in at least this fraction of JSON lines are noise.
const FIELD_UBIQUITY_LIMIT: f64 = 0.95;

/// Replace variable parts of a text message with typed placeholders.
pub fn tokenize(text: &str) -> String {
    let mut result = text.to_string();
    for (pattern, placeholder) in [
        (&*UUID_RE, "<UUID>"),
        (&*IP_RE, "<IP>"),
        (&*TS_RE, "<TS>"),
        (&*HEX_RE, "<HEX>"),
        (&*PATH_RE, "<PATH>"),
        (&*NUM_RE, "<NUM>"),
    ] {
        result = pattern.replace_all(&result, placeholder).into_owned();
    }
    result
}

/// Compute the template a line groups under.
///
/// JSON lines group by their event field when one exists (the key
/// plus the tokenized value), else by full key structure with typed
/// value placeholders. Text lines tokenize their content.
pub fn extract_template(line: &LogLine) -> String {
    if line.content_type == ContentType::Json {
        if let Some(obj) = line.parsed_json.as_ref().and_then(Value::as_object) {
            for key in EVENT_KEYS {
                if let Some(Value::String(text)) = obj.get(key) {
                    return format!("{key}:{}", tokenize(text));
                }
            }
            return json_structure_template(obj);
        }
    }
    tokenize(&line.content)
}

/// Template from JSON key structure: keys kept, values typed.
fn json_structure_template(obj: &serde_json::Map<String, Value>) -> String {
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();
    let parts: Vec<String> = keys
        .into_iter()
        .map(|key| {
            let value = &obj[key];
            match value {
                Value::Object(nested) => format!("{key}={{{}}}", json_structure_template(nested)),
                Value::Array(_) => format!("{key}=[...]"),
                Value::Bool(_) => format!("{key}=<BOOL>"),
                Value::Number(_) => format!("{key}=<NUM>"),
                Value::String(text) => {
                    let tokenized = tokenize(text);
                    if tokenized == *text {
                        format!("{key}=<STR>")
                    } else {
                        format!("{key}={tokenized}")
                    }
                }
                Value::Null => format!("{key}=<?>"),
            }
        })
        .collect();
    parts.join(" ")
}

/// A group of log lines sharing one message template.
#[derive(Debug, Clone)]
pub struct TemplateGroup {
    /// The normalized template string (the grouping key).
    pub template: String,
    /// Short human-readable label.
    pub display: String,
    /// Concrete content of the first line seen.
    pub example: String,
    /// Tokenized text usable for one-click filter creation.
    pub content_pattern: String,
    pub count: usize,
    /// Snapshot indices of every member line, in order.
    pub line_indices: Vec<usize>,
    /// Representative level: the most frequent, ties toward the
    /// higher severity.
    pub level: Option<LogLevel>,
    /// Snapshot index of the first member line.
    pub first_seen: usize,
    level_counts: [u32; 6],
}

impl TemplateGroup {
    fn new(template: String, display: String, example: String, content_pattern: String, first_seen: usize) -> Self {
        Self {
            template,
            display,
            example,
            content_pattern,
            count: 0,
            line_indices: Vec::new(),
            level: None,
            first_seen,
            level_counts: [0; 6],
        }
    }

    fn add_line(&mut self, index: usize, level: Option<LogLevel>) {
        self.line_indices.push(index);
        self.count = self.line_indices.len();
        if let Some(level) = level {
            self.level_counts[level.severity() as usize] += 1;
            let mut best = 0;
            for (severity, &count) in self.level_counts.iter().enumerate() {
                if count > 0 && count >= self.level_counts[best] {
                    best = severity;
                }
            }
            self.level = level_from_severity(best as u8);
        }
    }
}

const fn level_from_severity(severity: u8) -> Option<LogLevel> {
    match severity {
        0 => Some(LogLevel::Trace),
        1 => Some(LogLevel::Debug),
        2 => Some(LogLevel::Info),
        3 => Some(LogLevel::Warn),
        4 => Some(LogLevel::Error),
        5 => Some(LogLevel::Fatal),
        _ => None,
    }
}

/// Group a snapshot by message template, sorted by count descending
/// (first-seen order breaks ties, the sort being stable).
pub fn build_template_groups(lines: &[Arc<LogLine>]) -> Vec<TemplateGroup> {
    let mut groups: IndexMap<String, TemplateGroup> = IndexMap::new();

    for (index, line) in lines.iter().enumerate() {
        let template = extract_template(line);
        let group = groups.entry(template.clone()).or_insert_with(|| {
            let (display, content_pattern) = match (
                line.content_type,
                line.parsed_json.as_ref().and_then(Value::as_object),
            ) {
                (ContentType::Json, Some(obj)) => (json_display(obj), json_filter_pattern(obj)),
                _ => {
                    let tokenized = tokenize(&line.content);
                    (tokenized.clone(), tokenized)
                }
            };
            TemplateGroup::new(template, display, line.content.clone(), content_pattern, index)
        });
        group.add_line(index, line.log_level);
    }

    let mut result: Vec<TemplateGroup> = groups.into_values().collect();
    result.sort_by(|a, b| b.count.cmp(&a.count));
    result
}

/// Compact human-readable label for a JSON line: the tokenized event
/// field, else a key summary.
fn json_display(obj: &serde_json::Map<String, Value>) -> String {
    for key in EVENT_KEYS {
        if let Some(Value::String(text)) = obj.get(key) {
            return tokenize(text);
        }
    }
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();
    let shown: Vec<&str> = keys.iter().take(5).map(|k| k.as_str()).collect();
    let suffix = if keys.len() > 5 {
        format!(" +{}", keys.len() - 5)
    } else {
        String::new()
    };
    format!("{{{}{suffix}}}", shown.join(", "))
}

/// Minimal tokenized pattern for filtering lines like this JSON one.
fn json_filter_pattern(obj: &serde_json::Map<String, Value>) -> String {
    for key in EVENT_KEYS {
        if let Some(Value::String(text)) = obj.get(key) {
            return tokenize(text);
        }
    }
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(Value::String(text)) = obj.get(key) {
            if text.len() > 3 {
                return tokenize(text);
            }
        }
    }
    String::new()
}

/// Convert a template back into a regex that matches its instances.
pub fn template_to_regex(template: &str) -> String {
    let mut pattern = escape_regex(template);
    for (placeholder, expansion) in [
        ("<UUID>", r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}"),
        ("<TS>", r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}[\w.+:-]*"),
        ("<IP>", r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}"),
        ("<PATH>", r"/[\w./-]+"),
        ("<HEX>", r"[0-9a-fA-F]{8,}"),
        ("<NUM>", r"-?\d+\.?\d*"),
        ("<STR>", r".+?"),
        ("<BOOL>", r"(?:true|false)"),
    ] {
        pattern = pattern.replace(&escape_regex(placeholder), expansion);
    }
    pattern
}

/// Escape regex metacharacters, leaving everything else untouched.
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(
            ch,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
                | '#' | '&' | '-' | '~'
        ) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// A group of lines sharing one value for one JSON field.
#[derive(Debug, Clone)]
pub struct FieldGroup {
    pub key: String,
    pub value: String,
    pub display: String,
    /// False for synthetic buckets (`>0`) that exact-match filters
    /// cannot express.
    pub is_json_filter: bool,
    pub count: usize,
    pub line_indices: Vec<usize>,
}

impl FieldGroup {
    fn new(key: String, value: String, display: String, is_json_filter: bool) -> Self {
        Self {
            key,
            value,
            display,
            is_json_filter,
            count: 0,
            line_indices: Vec::new(),
        }
    }

    fn add_line(&mut self, index: usize) {
        self.line_indices.push(index);
        self.count = self.line_indices.len();
    }
}

/// Distribution of JSON field values across a snapshot.
///
/// Strings and bools group by exact value, integers bucket into
/// `=0`/`>0`, floats are skipped as continuous, and noisy keys are
/// guarded out: known boilerplate, values over 50 chars, keys with
/// more than 20 distinct values, and fields present in ≥95% of JSON
/// lines. Sorted by (count, key) ascending so the rare combinations
/// an investigation cares about come first.
pub fn build_field_groups(lines: &[Arc<LogLine>]) -> Vec<FieldGroup> {
    let mut groups: IndexMap<String, FieldGroup> = IndexMap::new();
    let mut key_values: AHashMap<String, AHashSet<String>> = AHashMap::new();
    let mut total_json = 0usize;

    for (index, line) in lines.iter().enumerate() {
        let Some(obj) = (line.content_type == ContentType::Json)
            .then(|| line.parsed_json.as_ref().and_then(Value::as_object))
            .flatten()
        else {
            continue;
        };
        total_json += 1;

        for (key, value) in obj {
            if SKIP_FIELD_KEYS.contains(&key.as_str()) {
                continue;
            }
            match value {
                Value::Number(n) if n.as_i64().is_some() || n.as_u64().is_some() => {
                    let is_zero = n.as_i64() == Some(0) || n.as_u64() == Some(0);
                    let (bucket_value, display) = if is_zero {
                        ("0".to_string(), format!("{key}=0"))
                    } else {
                        (">0".to_string(), format!("{key}>0"))
                    };
                    let group_key = display.clone();
                    groups
                        .entry(group_key)
                        .or_insert_with(|| {
                            FieldGroup::new(key.clone(), bucket_value, display, is_zero)
                        })
                        .add_line(index);
                }
                Value::Number(_) => {} // floats are continuous, skip
                Value::String(_) | Value::Bool(_) => {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if text.len() > MAX_FIELD_VALUE_LEN {
                        continue;
                    }
                    key_values
                        .entry(key.clone())
                        .or_default()
                        .insert(text.clone());
                    let display = format!("{key}={text}");
                    groups
                        .entry(display.clone())
                        .or_insert_with(|| FieldGroup::new(key.clone(), text, display, true))
                        .add_line(index);
                }
                Value::Null | Value::Array(_) | Value::Object(_) => {}
            }
        }
    }

    let high_cardinality: AHashSet<&String> = key_values
        .iter()
        .filter(|(_, values)| values.len() > FIELD_CARDINALITY_LIMIT)
        .map(|(key, _)| key)
        .collect();

    let ubiquity_cap = total_json as f64 * FIELD_UBIQUITY_LIMIT;
    let mut result: Vec<FieldGroup> = groups
        .into_values()
        .filter(|group| !high_cardinality.contains(&group.key))
        .filter(|group| total_json == 0 || (group.count as f64) < ubiquity_cap)
        .collect();

    result.sort_by(|a, b| a.count.cmp(&b.count).then_with(|| a.key.cmp(&b.key)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParserChoice, ParserRegistry};

    fn lines(raws: &[&str]) -> Vec<Arc<LogLine>> {
        let registry = ParserRegistry::with_default_formats();
        raws.iter()
            .enumerate()
            .map(|(i, raw)| Arc::new(registry.parse(i + 1, raw, ParserChoice::Auto)))
            .collect()
    }

    #[test]
    fn test_ip_and_port_tokenize_identically() {
        let a = tokenize("Connection refused to 10.0.1.5:443");
        let b = tokenize("Connection refused to 10.0.2.9:8080");
        assert_eq!(a, b);
        assert_eq!(a, "Connection refused to <IP>:<NUM>");
    }

    #[test]
    fn test_uuid_before_hex() {
        let result = tokenize("request 550e8400-e29b-41d4-a716-446655440000 done");
        assert_eq!(result, "request <UUID> done");
    }

    #[test]
    fn test_timestamp_tokenizes() {
        let result = tokenize("at 2024-01-15T10:30:00Z something");
        assert_eq!(result, "at <TS> something");
    }

    #[test]
    fn test_hex_blob_tokenizes() {
        let result = tokenize("commit deadbeef1234 built");
        assert_eq!(result, "commit <HEX> built");
    }

    #[test]
    fn test_path_tokenizes() {
        let result = tokenize("wrote /var/log/app.log cleanly");
        assert_eq!(result, "wrote <PATH> cleanly");
    }

    #[test]
    fn test_tokenize_is_pure() {
        let text = "user 42 from 10.0.0.1 at /home/x";
        let once = tokenize(text);
        assert_eq!(tokenize(text), once);
        assert_eq!(tokenize(text), once);
    }

    #[test]
    fn test_json_event_key_template() {
        let all = lines(&[
            r#"{"event":"user 17 logged in","level":"info"}"#,
            r#"{"event":"user 42 logged in","level":"info"}"#,
        ]);
        assert_eq!(extract_template(&all[0]), extract_template(&all[1]));
        assert_eq!(extract_template(&all[0]), "event:user <NUM> logged in");
    }

    #[test]
    fn test_json_structure_template_without_event() {
        let all = lines(&[r#"{"b":1,"a":"x","flag":true}"#]);
        assert_eq!(extract_template(&all[0]), "a=<STR> b=<NUM> flag=<BOOL>");
    }

    #[test]
    fn test_groups_count_and_sort() {
        let all = lines(&[
            "connect to 10.0.0.1 failed",
            "connect to 10.0.0.2 failed",
            "server started",
            "connect to 10.0.0.3 failed",
        ]);
        let groups = build_template_groups(&all);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].line_indices, vec![0, 1, 3]);
        assert_eq!(groups[0].first_seen, 0);
        assert_eq!(groups[1].count, 1);
    }

    #[test]
    fn test_representative_level_most_frequent() {
        // The level lives in the logfmt fields, not in the message, so
        // all three lines share one template
        let all = lines(&[
            r#"time=2024-01-15T10:30:00Z level=warn msg="disk 1 filling""#,
            r#"time=2024-01-15T10:30:01Z level=warn msg="disk 2 filling""#,
            r#"time=2024-01-15T10:30:02Z level=error msg="disk 3 filling""#,
        ]);
        let groups = build_template_groups(&all);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].level, Some(LogLevel::Warn));
    }

    #[test]
    fn test_representative_level_tie_prefers_severity() {
        let all = lines(&[
            r#"time=2024-01-15T10:30:00Z level=warn msg="pump 1 stalled""#,
            r#"time=2024-01-15T10:30:01Z level=error msg="pump 2 stalled""#,
        ]);
        let groups = build_template_groups(&all);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].level, Some(LogLevel::Error));
    }

    #[test]
    fn test_template_to_regex_roundtrip() {
        let template = tokenize("Connection refused to 10.0.1.5:443");
        let pattern = template_to_regex(&template);
        let regex = Regex::new(&pattern).unwrap();
        assert!(regex
            .is_match("Connection refused to 10.0.2.9:8080")
            .unwrap());
        assert!(!regex.is_match("Connection accepted").unwrap());
    }

    #[test]
    fn test_field_groups_exact_and_bucketed() {
        let all = lines(&[
            r#"{"status":"ok","retries":0}"#,
            r#"{"status":"ok","retries":2}"#,
            r#"{"status":"failed","retries":5}"#,
            "plain text line",
        ]);
        let groups = build_field_groups(&all);
        let by_display: Vec<(&str, usize)> = groups
            .iter()
            .map(|g| (g.display.as_str(), g.count))
            .collect();
        assert!(by_display.contains(&("status=failed", 1)));
        assert!(by_display.contains(&("status=ok", 2)));
        assert!(by_display.contains(&("retries=0", 1)));
        assert!(by_display.contains(&("retries>0", 2)));
        // Ascending by count: rare values first
        assert!(groups.first().unwrap().count <= groups.last().unwrap().count);
    }

    #[test]
    fn test_field_groups_skip_floats_and_noise_keys() {
        let all = lines(&[
            r#"{"latency":1.5,"level":"info","mode":"fast"}"#,
            r#"{"latency":2.5,"level":"warn","mode":"slow"}"#,
        ]);
        let groups = build_field_groups(&all);
        assert!(groups.iter().all(|g| g.key != "latency"));
        assert!(groups.iter().all(|g| g.key != "level"));
        assert!(groups.iter().any(|g| g.key == "mode"));
    }

    #[test]
    fn test_field_groups_cardinality_guard() {
        let raws: Vec<String> = (0..=FIELD_CARDINALITY_LIMIT)
            .map(|i| format!(r#"{{"session":"sess-abc-{i}","mode":"steady"}}"#))
            .collect();
        let refs: Vec<&str> = raws.iter().map(String::as_str).collect();
        let all = lines(&refs);
        let groups = build_field_groups(&all);
        // 21 distinct session values: the key is dropped entirely
        assert!(groups.iter().all(|g| g.key != "session"));
    }
}
