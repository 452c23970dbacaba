// LogLens - GPL-3.0-or-later
// This file is part of LogLens.
//
// Copyright (C) 2026 LogLens contributors
//
// LogLens is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// LogLens is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with LogLens.  If not, see <https://www.gnu.org/licenses/>.

//! Filter rules and the engine that applies them.
//!
//! Include rules combine with OR (a line passes if any enabled
//! include matches, or vacuously when there are none); exclude rules
//! combine with AND-exclusion (a line is removed if any enabled
//! exclude matches). Regexes compile exactly once, at rule creation;
//! a rule whose pattern does not compile is marked failed, never
//! matches, and never affects its siblings.
//!
//! The serde shape of [`FilterRule`] is the persisted contract shared
//! with the session storage layer: an ordered list of records
//! `{type, pattern, enabled, is_regex, case_sensitive, json_key,
//! json_value}` (plus the optional extended kinds).

use crate::error::RuleError;
use crate::parser::{LogLevel, LogLine};
use chrono::{DateTime, Utc};
use fancy_regex::Regex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Whether a rule keeps or removes matching lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Include,
    Exclude,
}

const fn enabled_default() -> bool {
    true
}

/// One filter rule, exactly as persisted.
///
/// The match kind is derived from which optional fields are set:
/// `json_key` wins, then `component`, `min_level` and the time bounds,
/// then `is_regex`, else substring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    #[serde(default)]
    pub pattern: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<DateTime<Utc>>,
}

impl FilterRule {
    /// A case-insensitive substring rule.
    pub fn substring(filter_type: FilterType, pattern: impl Into<String>) -> Self {
        Self {
            filter_type,
            pattern: pattern.into(),
            enabled: true,
            is_regex: false,
            case_sensitive: false,
            json_key: None,
            json_value: None,
            component: None,
            min_level: None,
            time_start: None,
            time_end: None,
        }
    }

    /// A regex rule (compiled when the rule set is built).
    pub fn regex(filter_type: FilterType, pattern: impl Into<String>) -> Self {
        Self {
            is_regex: true,
            ..Self::substring(filter_type, pattern)
        }
    }

    /// A dotted-path JSON key/value equality rule.
    pub fn json_key_value(
        filter_type: FilterType,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            json_key: Some(key.into()),
            json_value: Some(value.into()),
            ..Self::substring(filter_type, "")
        }
    }

    /// A component equality rule.
    pub fn for_component(filter_type: FilterType, name: impl Into<String>) -> Self {
        Self {
            component: Some(name.into()),
            ..Self::substring(filter_type, "")
        }
    }

    /// A level-threshold rule (matches `level >= min`).
    pub fn level_threshold(filter_type: FilterType, min: LogLevel) -> Self {
        Self {
            min_level: Some(min),
            ..Self::substring(filter_type, "")
        }
    }

    /// A timestamp range rule (start inclusive, end exclusive).
    pub fn time_range(
        filter_type: FilterType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            time_start: start,
            time_end: end,
            ..Self::substring(filter_type, "")
        }
    }
}

/// The compiled form of a rule: regexes are built once, here, and a
/// failure is stored instead of being retried per line.
enum Matcher {
    Substring { needle: String },
    Regex(Box<Regex>),
    JsonKeyValue { key: String, value: String },
    Component { name: String },
    Level { min: LogLevel },
    TimeRange {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    Failed,
}

/// A rule plus its compiled matcher.
pub struct CompiledRule {
    pub rule: FilterRule,
    matcher: Matcher,
}

impl CompiledRule {
    fn compile(rule: FilterRule) -> (Self, Option<RuleError>) {
        let mut error = None;
        let matcher = if let Some(key) = rule.json_key.clone() {
            Matcher::JsonKeyValue {
                key,
                value: rule.json_value.clone().unwrap_or_default(),
            }
        } else if let Some(name) = rule.component.clone() {
            Matcher::Component { name }
        } else if let Some(min) = rule.min_level {
            Matcher::Level { min }
        } else if rule.time_start.is_some() || rule.time_end.is_some() {
            Matcher::TimeRange {
                start: rule.time_start,
                end: rule.time_end,
            }
        } else if rule.is_regex {
            let pattern = if rule.case_sensitive {
                rule.pattern.clone()
            } else {
                format!("(?i){}", rule.pattern)
            };
            match Regex::new(&pattern) {
                Ok(regex) => Matcher::Regex(Box::new(regex)),
                Err(err) => {
                    warn!(pattern = %rule.pattern, %err, "filter rule failed to compile");
                    error = Some(RuleError::new(&rule.pattern, &err));
                    Matcher::Failed
                }
            }
        } else {
            Matcher::Substring {
                needle: if rule.case_sensitive {
                    rule.pattern.clone()
                } else {
                    rule.pattern.to_ascii_lowercase()
                },
            }
        };
        (Self { rule, matcher }, error)
    }

    /// Whether this rule's pattern failed to compile.
    pub const fn failed(&self) -> bool {
        matches!(self.matcher, Matcher::Failed)
    }

    /// Whether the rule matches one line. Disabled state is the
    /// caller's concern; a failed rule never matches.
    pub fn matches(&self, line: &LogLine) -> bool {
        match &self.matcher {
            Matcher::Substring { needle } => {
                if self.rule.case_sensitive {
                    line.raw.contains(needle)
                } else {
                    line.raw.to_ascii_lowercase().contains(needle)
                }
            }
            Matcher::Regex(regex) => regex.is_match(&line.raw).unwrap_or(false),
            Matcher::JsonKeyValue { key, value } => line
                .parsed_json
                .as_ref()
                .and_then(|json| get_nested_value(json, key))
                .is_some_and(|leaf| json_leaf_equals(leaf, value)),
            Matcher::Component { name } => line.component.as_deref() == Some(name.as_str()),
            Matcher::Level { min } => line.log_level.is_some_and(|level| level >= *min),
            Matcher::TimeRange { start, end } => line.timestamp.is_some_and(|ts| {
                start.is_none_or(|s| ts >= s) && end.is_none_or(|e| ts < e)
            }),
            Matcher::Failed => false,
        }
    }
}

/// All rules of one configuration, compiled once.
#[derive(Default)]
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    /// Compile a rule list. Invalid patterns are reported and their
    /// rules marked failed; sibling rules are unaffected.
    pub fn compile(rules: Vec<FilterRule>) -> (Self, Vec<RuleError>) {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();
        for rule in rules {
            let (rule, error) = CompiledRule::compile(rule);
            compiled.push(rule);
            errors.extend(error);
        }
        (Self { rules: compiled }, errors)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    fn active(&self, filter_type: FilterType) -> impl Iterator<Item = &CompiledRule> {
        self.rules
            .iter()
            .filter(move |r| r.rule.enabled && r.rule.filter_type == filter_type)
    }

    /// Apply all rules to a snapshot, returning matching indices in
    /// original order. With no enabled rules every index is returned.
    pub fn apply(&self, lines: &[Arc<LogLine>]) -> Vec<usize> {
        let includes: Vec<&CompiledRule> = self.active(FilterType::Include).collect();
        let excludes: Vec<&CompiledRule> = self.active(FilterType::Exclude).collect();

        if includes.is_empty() && excludes.is_empty() {
            return (0..lines.len()).collect();
        }

        lines
            .par_iter()
            .enumerate()
            .filter_map(|(index, line)| {
                if !includes.is_empty() && !includes.iter().any(|r| r.matches(line)) {
                    return None;
                }
                if excludes.iter().any(|r| r.matches(line)) {
                    return None;
                }
                Some(index)
            })
            .collect()
    }

    /// Evaluate a single line, e.g. one that just arrived on a tail,
    /// without recomputing the whole index set.
    pub fn check(&self, line: &LogLine) -> bool {
        let mut any_include = false;
        let mut include_hit = false;
        for rule in self.active(FilterType::Include) {
            any_include = true;
            if rule.matches(line) {
                include_hit = true;
                break;
            }
        }
        if any_include && !include_hit {
            return false;
        }
        !self.active(FilterType::Exclude).any(|r| r.matches(line))
    }
}

/// The complete active filter configuration, capturable and
/// restorable as one unit (suspend/resume).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub rules: Vec<FilterRule>,
    /// Global level threshold; lines below it are hidden. Lines
    /// without a level always pass, so raw text stays visible.
    pub min_level: Option<LogLevel>,
    /// Show only lines with a nonzero anomaly score.
    pub anomaly_only: bool,
}

/// Owns the active configuration plus its compiled form.
#[derive(Default)]
pub struct FilterState {
    config: FilterConfig,
    compiled: CompiledRuleSet,
    errors: Vec<RuleError>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Compile errors from the most recent configuration change.
    pub fn errors(&self) -> &[RuleError] {
        &self.errors
    }

    /// Replace the whole configuration atomically.
    pub fn set_config(&mut self, config: FilterConfig) -> &[RuleError] {
        let (compiled, errors) = CompiledRuleSet::compile(config.rules.clone());
        self.config = config;
        self.compiled = compiled;
        self.errors = errors;
        &self.errors
    }

    /// Replace just the rule list.
    pub fn set_rules(&mut self, rules: Vec<FilterRule>) -> &[RuleError] {
        let config = FilterConfig {
            rules,
            ..self.config.clone()
        };
        self.set_config(config)
    }

    pub fn set_min_level(&mut self, min_level: Option<LogLevel>) {
        self.config.min_level = min_level;
    }

    pub fn set_anomaly_only(&mut self, anomaly_only: bool) {
        self.config.anomaly_only = anomaly_only;
    }

    /// Capture the active configuration and clear it, preserving each
    /// rule's individual enabled state for a later [`resume`].
    ///
    /// [`resume`]: FilterState::resume
    pub fn suspend(&mut self) -> FilterConfig {
        let suspended = std::mem::take(&mut self.config);
        self.compiled = CompiledRuleSet::default();
        self.errors.clear();
        suspended
    }

    /// Restore a previously suspended configuration atomically.
    pub fn resume(&mut self, config: FilterConfig) -> &[RuleError] {
        self.set_config(config)
    }

    /// Matching indices over a snapshot, honoring rules and the
    /// global level threshold. The anomaly-only flag is applied by
    /// the session, which owns the anomaly scores.
    pub fn apply(&self, lines: &[Arc<LogLine>]) -> Vec<usize> {
        let indices = self.compiled.apply(lines);
        match self.config.min_level {
            None => indices,
            Some(min) => indices
                .into_iter()
                .filter(|&i| {
                    lines
                        .get(i)
                        .is_some_and(|l| l.log_level.is_none_or(|level| level >= min))
                })
                .collect(),
        }
    }

    /// Evaluate one line against rules and the level threshold.
    pub fn check(&self, line: &LogLine) -> bool {
        if !self.compiled.check(line) {
            return false;
        }
        self.config
            .min_level
            .is_none_or(|min| line.log_level.is_none_or(|level| level >= min))
    }
}

/// Walk a dotted key path into nested JSON objects.
pub fn get_nested_value<'a>(data: &'a Value, key_path: &str) -> Option<&'a Value> {
    let mut current = data;
    for key in key_path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Exact leaf equality, comparing strings unquoted and everything
/// else through its JSON rendering.
fn json_leaf_equals(leaf: &Value, expected: &str) -> bool {
    match leaf {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
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
    fn test_no_rules_returns_all_indices_in_order() {
        let lines = lines(&["a", "b", "c"]);
        let (set, errors) = CompiledRuleSet::compile(Vec::new());
        assert!(errors.is_empty());
        assert_eq!(set.apply(&lines), vec![0, 1, 2]);
    }

    #[test]
    fn test_includes_or_together() {
        let lines = lines(&["alpha one", "beta two", "gamma three"]);
        let rules = vec![
            FilterRule::substring(FilterType::Include, "ALPHA"),
            FilterRule::substring(FilterType::Include, "gamma"),
        ];
        let (set, _) = CompiledRuleSet::compile(rules);
        assert_eq!(set.apply(&lines), vec![0, 2]);
    }

    #[test]
    fn test_excludes_and_exclude() {
        let lines = lines(&["keep this", "drop that", "keep too", "drop also"]);
        let rules = vec![FilterRule::substring(FilterType::Exclude, "drop")];
        let (set, _) = CompiledRuleSet::compile(rules);
        assert_eq!(set.apply(&lines), vec![0, 2]);
    }

    #[test]
    fn test_removing_an_exclude_only_adds_indices() {
        let lines = lines(&["a noise", "b", "c noise", "d spam", "e"]);
        let both = vec![
            FilterRule::substring(FilterType::Exclude, "noise"),
            FilterRule::substring(FilterType::Exclude, "spam"),
        ];
        let fewer = vec![FilterRule::substring(FilterType::Exclude, "noise")];
        let (set_both, _) = CompiledRuleSet::compile(both);
        let (set_fewer, _) = CompiledRuleSet::compile(fewer);
        let with_both = set_both.apply(&lines);
        let with_fewer = set_fewer.apply(&lines);
        for index in &with_both {
            assert!(with_fewer.contains(index));
        }
        assert!(with_fewer.len() >= with_both.len());
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let lines = lines(&["x", "y"]);
        let mut rule = FilterRule::substring(FilterType::Include, "x");
        rule.enabled = false;
        let (set, _) = CompiledRuleSet::compile(vec![rule]);
        assert_eq!(set.apply(&lines), vec![0, 1]);
    }

    #[test]
    fn test_case_sensitive_substring() {
        let lines = lines(&["Error here", "error there"]);
        let mut rule = FilterRule::substring(FilterType::Include, "Error");
        rule.case_sensitive = true;
        let (set, _) = CompiledRuleSet::compile(vec![rule]);
        assert_eq!(set.apply(&lines), vec![0]);
    }

    #[test]
    fn test_regex_rule() {
        let lines = lines(&["GET /api/users 200", "GET /health 200", "POST /api/users 500"]);
        let rules = vec![FilterRule::regex(FilterType::Include, r"/api/\w+ 5\d\d")];
        let (set, _) = CompiledRuleSet::compile(rules);
        assert_eq!(set.apply(&lines), vec![2]);
    }

    #[test]
    fn test_invalid_regex_reported_and_siblings_unaffected() {
        let lines = lines(&["match me", "other"]);
        let rules = vec![
            FilterRule::regex(FilterType::Include, "[broken"),
            FilterRule::substring(FilterType::Include, "match"),
        ];
        let (set, errors) = CompiledRuleSet::compile(rules);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].pattern, "[broken");
        assert!(set.rules()[0].failed());
        // The failed include never matches; the sibling still works
        assert_eq!(set.apply(&lines), vec![0]);
    }

    #[test]
    fn test_json_key_value_dotted_path() {
        let lines = lines(&[
            r#"{"ctx":{"user":"alice"},"msg":"login"}"#,
            r#"{"ctx":{"user":"bob"},"msg":"login"}"#,
            "plain text",
        ]);
        let rules = vec![FilterRule::json_key_value(
            FilterType::Include,
            "ctx.user",
            "alice",
        )];
        let (set, _) = CompiledRuleSet::compile(rules);
        assert_eq!(set.apply(&lines), vec![0]);
    }

    #[test]
    fn test_json_number_leaf_equality() {
        let lines = lines(&[r#"{"status":500}"#, r#"{"status":200}"#]);
        let rules = vec![FilterRule::json_key_value(
            FilterType::Include,
            "status",
            "500",
        )];
        let (set, _) = CompiledRuleSet::compile(rules);
        assert_eq!(set.apply(&lines), vec![0]);
    }

    #[test]
    fn test_component_rule() {
        let lines = lines(&[
            "api  | request served",
            "db  | query ran",
            "api  | request failed",
        ]);
        let rules = vec![FilterRule::for_component(FilterType::Include, "api")];
        let (set, _) = CompiledRuleSet::compile(rules);
        assert_eq!(set.apply(&lines), vec![0, 2]);
    }

    #[test]
    fn test_level_threshold_rule() {
        let lines = lines(&[
            "2024-01-15T10:30:00Z [DEBUG] noisy",
            "2024-01-15T10:30:01Z [WARN] worth a look",
            "2024-01-15T10:30:02Z [ERROR] broken",
            "no level at all",
        ]);
        let rules = vec![FilterRule::level_threshold(FilterType::Include, LogLevel::Warn)];
        let (set, _) = CompiledRuleSet::compile(rules);
        // Lines without a level fail a level-threshold *rule*
        assert_eq!(set.apply(&lines), vec![1, 2]);
    }

    #[test]
    fn test_time_range_rule_start_inclusive_end_exclusive() {
        let lines = lines(&[
            "2024-01-15T10:30:00Z before",
            "2024-01-15T10:31:00Z at-start",
            "2024-01-15T10:32:00Z inside",
            "2024-01-15T10:33:00Z at-end",
        ]);
        let start = "2024-01-15T10:31:00Z".parse().unwrap();
        let end = "2024-01-15T10:33:00Z".parse().unwrap();
        let rules = vec![FilterRule::time_range(
            FilterType::Include,
            Some(start),
            Some(end),
        )];
        let (set, _) = CompiledRuleSet::compile(rules);
        assert_eq!(set.apply(&lines), vec![1, 2]);
    }

    #[test]
    fn test_check_agrees_with_apply() {
        let all = lines(&["alpha", "beta noise", "gamma"]);
        let rules = vec![
            FilterRule::substring(FilterType::Include, "a"),
            FilterRule::substring(FilterType::Exclude, "noise"),
        ];
        let (set, _) = CompiledRuleSet::compile(rules);
        let indices = set.apply(&all);
        for (i, line) in all.iter().enumerate() {
            assert_eq!(set.check(line), indices.contains(&i));
        }
    }

    #[test]
    fn test_filter_state_min_level_gate() {
        let all = lines(&[
            "2024-01-15T10:30:00Z [INFO] fine",
            "2024-01-15T10:30:01Z [ERROR] bad",
            "unleveled text",
        ]);
        let mut state = FilterState::new();
        state.set_min_level(Some(LogLevel::Error));
        // Lines without a level pass the *global* threshold
        assert_eq!(state.apply(&all), vec![1, 2]);
        assert!(!state.check(&all[0]));
        assert!(state.check(&all[1]));
        assert!(state.check(&all[2]));
    }

    #[test]
    fn test_suspend_resume_roundtrip_preserves_enabled_state() {
        let mut state = FilterState::new();
        let mut rule_a = FilterRule::substring(FilterType::Include, "a");
        rule_a.enabled = false;
        let rule_b = FilterRule::substring(FilterType::Exclude, "b");
        state.set_config(FilterConfig {
            rules: vec![rule_a.clone(), rule_b.clone()],
            min_level: Some(LogLevel::Warn),
            anomaly_only: true,
        });

        let suspended = state.suspend();
        assert_eq!(state.config(), &FilterConfig::default());

        state.resume(suspended.clone());
        assert_eq!(state.config(), &suspended);
        assert!(!state.config().rules[0].enabled);
        assert_eq!(state.config().min_level, Some(LogLevel::Warn));
        assert!(state.config().anomaly_only);
    }

    #[test]
    fn test_persisted_contract_roundtrip() {
        let rules = vec![
            FilterRule::substring(FilterType::Include, "needle"),
            FilterRule::json_key_value(FilterType::Exclude, "status", "500"),
        ];
        let json = serde_json::to_string(&rules).unwrap();
        assert!(json.contains(r#""type":"include""#));
        assert!(json.contains(r#""json_key":"status""#));
        let back: Vec<FilterRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rules);
    }

    #[test]
    fn test_persisted_contract_defaults() {
        let json = r#"[{"type":"exclude","pattern":"x"}]"#;
        let rules: Vec<FilterRule> = serde_json::from_str(json).unwrap();
        assert!(rules[0].enabled);
        assert!(!rules[0].is_regex);
        assert!(!rules[0].case_sensitive);
        assert!(rules[0].json_key.is_none());
    }
}
