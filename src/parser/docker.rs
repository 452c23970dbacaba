use fancy_regex::Regex;
use std::sync::LazyLock;

use crate::parser::{
    classify_content, extract_log_level, iso::IsoParser, syslog::SyslogParser, FormatParser,
    ParseResult,
};

// Docker Compose: "service-name  | "
static DOCKER_COMPOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w.-]+)\s+\|\s+").unwrap());

/// Parses Docker Compose output: `service-name  | <rest of line>`.
///
/// The remainder after the prefix is handed to the timestamp-bearing
/// parsers, so a composed service logging ISO or syslog lines keeps
/// its timestamps.
pub struct DockerParser;

impl FormatParser for DockerParser {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn description(&self) -> &'static str {
        "Docker Compose (service-name | message)"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let m = DOCKER_COMPOSE_RE.captures(raw).ok().flatten()?;
        let component = m.get(1)?.as_str().to_string();
        let remainder = &raw[m.get(0)?.end()..];

        for parser in [&IsoParser as &dyn FormatParser, &SyslogParser] {
            if let Some(mut result) = parser.try_parse(remainder) {
                result.component = Some(component);
                return Some(result);
            }
        }

        let (content_type, parsed_json) = classify_content(remainder);
        let log_level = extract_log_level(remainder, parsed_json.as_ref());
        Some(ParseResult {
            timestamp: None,
            content: remainder.to_string(),
            content_type,
            parsed_json,
            log_level,
            component: Some(component),
        })
    }
}
