use chrono::{Datelike, TimeZone, Utc};
use fancy_regex::Regex;
use std::sync::LazyLock;

use crate::parser::{
    classify_content, extract_log_level, month_number, FormatParser, ParseResult,
};

// Syslog timestamp: "Jan 15 10:30:00" or "Jan  5 10:30:00"
static SYSLOG_TS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+(\d{1,2})\s+(\d{2}):(\d{2}):(\d{2})\s+",
    )
    .unwrap()
});

// Syslog content: "hostname program[pid]: message"
static SYSLOG_HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z][\w.-]+)\s+([\w./-]+?)(?:\[(\d+)\])?:\s+").unwrap()
});

/// Parses syslog RFC 3164: `Mon DD HH:MM:SS hostname program[pid]: msg`.
///
/// The format carries no year; the current one is assumed.
pub struct SyslogParser;

impl FormatParser for SyslogParser {
    fn name(&self) -> &'static str {
        "syslog"
    }

    fn description(&self) -> &'static str {
        "Syslog RFC 3164 (Mon DD HH:MM:SS hostname program: msg)"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let m = SYSLOG_TS_RE.captures(raw).ok().flatten()?;
        let month = month_number(m.get(1)?.as_str())?;
        let field = |i: usize| m.get(i).and_then(|g| g.as_str().parse::<u32>().ok());
        let ts = Utc
            .with_ymd_and_hms(
                Utc::now().year(),
                month,
                field(2)?,
                field(3)?,
                field(4)?,
                field(5)?,
            )
            .single()?;

        let mut content = &raw[m.get(0)?.end()..];

        // Strip "hostname program[pid]:" and keep the program as component
        let mut component = None;
        if let Ok(Some(host)) = SYSLOG_HOST_RE.captures(content) {
            if let Some(prog) = host.get(2) {
                component = Some(match host.get(3) {
                    Some(pid) => format!("{}[{}]", prog.as_str(), pid.as_str()),
                    None => prog.as_str().to_string(),
                });
            }
            if let Some(whole) = host.get(0) {
                content = &content[whole.end()..];
            }
        }

        let (content_type, parsed_json) = classify_content(content);
        let log_level = extract_log_level(content, parsed_json.as_ref());
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
