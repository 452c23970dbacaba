use chrono::{TimeZone, Utc};
use fancy_regex::Regex;
use std::sync::LazyLock;

use crate::parser::{
    classify_content, extract_log_level, month_number, FormatParser, ParseResult,
};

// Apache CLF: "[15/Jan/2024:10:30:00 +0000]"
// The zone offset is matched and discarded.
static APACHE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(\d{2})/(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)/(\d{4}):(\d{2}):(\d{2}):(\d{2})\s+[+-]\d{4}\]\s+",
    )
    .unwrap()
});

/// Parses Apache/Nginx Common Log Format timestamps.
pub struct ApacheParser;

impl FormatParser for ApacheParser {
    fn name(&self) -> &'static str {
        "apache"
    }

    fn description(&self) -> &'static str {
        "Apache/Nginx CLF ([DD/Mon/YYYY:HH:MM:SS +0000])"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let m = APACHE_RE.captures(raw).ok().flatten()?;
        let month = month_number(m.get(2)?.as_str())?;
        let field = |i: usize| m.get(i).and_then(|g| g.as_str().parse::<u32>().ok());
        let year = m.get(3)?.as_str().parse::<i32>().ok()?;
        let ts = Utc
            .with_ymd_and_hms(year, month, field(1)?, field(4)?, field(5)?, field(6)?)
            .single()?;

        let content = &raw[m.get(0)?.end()..];
        let (content_type, parsed_json) = classify_content(content);
        let log_level = extract_log_level(content, parsed_json.as_ref());
        Some(ParseResult {
            timestamp: Some(ts),
            content: content.to_string(),
            content_type,
            parsed_json,
            log_level,
            component: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_clf_timestamp() {
        let result = ApacheParser
            .try_parse(r#"[15/Jan/2024:10:30:00 +0000] "GET / HTTP/1.1" 200"#)
            .unwrap();
        let ts = result.timestamp.unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 15));
        assert_eq!(result.content, r#""GET / HTTP/1.1" 200"#);
    }

    #[test]
    fn test_negative_offset_accepted() {
        assert!(ApacheParser
            .try_parse("[01/Dec/2023:23:59:59 -0500] request")
            .is_some());
    }

    #[test]
    fn test_non_clf_is_no_match() {
        assert!(ApacheParser.try_parse("[error] not a timestamp").is_none());
        assert!(ApacheParser.try_parse("15/Jan/2024 no brackets").is_none());
    }
}
