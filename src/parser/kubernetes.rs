use fancy_regex::Regex;
use std::sync::LazyLock;

use crate::parser::{
    classify_content, extract_log_level, iso::IsoParser, FormatParser, ParseResult,
};

// Kubernetes/CloudWatch bracket prefix: "[pod-name-abc123]"
static K8S_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([a-z0-9][\w.-]+)\]\s*").unwrap());

// Kubernetes prefix: "pod-name container 2024-..." (lookahead keeps the timestamp)
static K8S_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9][\w.-]+)\s+([a-z0-9][\w.-]+)\s+(?=\d{4}-)").unwrap());

/// Parses kubectl log output (bracket and pod/container prefix styles).
pub struct KubernetesParser;

impl FormatParser for KubernetesParser {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    fn description(&self) -> &'static str {
        "Kubernetes kubectl logs ([pod-name] or pod container timestamp)"
    }

    fn try_parse(&self, raw: &str) -> Option<ParseResult> {
        let (component, remainder) = strip_pod_prefix(raw)?;

        if let Some(mut result) = IsoParser.try_parse(remainder) {
            result.component = Some(component);
            return Some(result);
        }

        // Pod prefix found but no timestamp in the remainder
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

fn strip_pod_prefix(raw: &str) -> Option<(String, &str)> {
    if let Ok(Some(m)) = K8S_BRACKET_RE.captures(raw) {
        let component = m.get(1)?.as_str().to_string();
        return Some((component, &raw[m.get(0)?.end()..]));
    }
    if let Ok(Some(m)) = K8S_PREFIX_RE.captures(raw) {
        let component = m.get(1)?.as_str().to_string();
        return Some((component, &raw[m.get(0)?.end()..]));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_style() {
        let result = KubernetesParser
            .try_parse("[api-7d9f8b-x2x4v] 2024-01-15T10:30:00Z request handled")
            .unwrap();
        assert_eq!(result.component.as_deref(), Some("api-7d9f8b-x2x4v"));
        assert!(result.timestamp.is_some());
        assert_eq!(result.content, "request handled");
    }

    #[test]
    fn test_pod_container_style() {
        let result = KubernetesParser
            .try_parse("api-7d9f8b sidecar 2024-01-15T10:30:00Z proxy up")
            .unwrap();
        assert_eq!(result.component.as_deref(), Some("api-7d9f8b"));
        assert!(result.timestamp.is_some());
        assert_eq!(result.content, "proxy up");
    }

    #[test]
    fn test_bracket_without_timestamp() {
        let result = KubernetesParser.try_parse("[worker-1] starting up").unwrap();
        assert_eq!(result.component.as_deref(), Some("worker-1"));
        assert!(result.timestamp.is_none());
    }

    #[test]
    fn test_uppercase_prefix_is_no_match() {
        // Pod names are lowercase; an uppercase token is not a pod prefix
        assert!(KubernetesParser.try_parse("[ERROR] something broke").is_none());
    }

    #[test]
    fn test_two_words_without_timestamp_is_no_match() {
        assert!(KubernetesParser.try_parse("hello world no timestamp").is_none());
    }
}
