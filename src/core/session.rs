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

//! The surface a viewer consumes: one object tying the line store to
//! the filter, search, template and anomaly engines.

use crate::anomaly::{
    build_field_groups, build_template_groups, detect_anomalies, extract_template, AnomalyConfig,
    AnomalyResult, Baseline, FieldGroup, TemplateGroup,
};
use crate::core::filter::{FilterConfig, FilterRule, FilterState};
use crate::core::line_store::{LineStore, LoadProgress};
use crate::core::search::{find_matches, SearchCursor, SearchQuery};
use crate::core::source::RawLineSource;
use crate::error::{RuleError, SourceError};
use crate::parser::{LogLine, ParserChoice, ParserRegistry};
use std::sync::Arc;
use tracing::debug;

/// What [`InspectSession::analyze`] computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Group lines by message template.
    Templates,
    /// Distribution of JSON field values.
    Fields,
}

/// Analysis output.
#[derive(Debug, Clone)]
pub enum AnalysisReport {
    Templates(Vec<TemplateGroup>),
    Fields(Vec<FieldGroup>),
}

/// One investigation over one line store.
///
/// Owns the active filter configuration and the baseline; the engines
/// themselves stay stateless and run over snapshots taken here.
pub struct InspectSession {
    store: Arc<LineStore>,
    registry: Arc<ParserRegistry>,
    filters: FilterState,
    anomaly_config: AnomalyConfig,
    baseline: Option<Baseline>,
    /// Cached anomaly result, keyed by the snapshot length it was
    /// computed for.
    anomaly_cache: Option<(usize, AnomalyResult)>,
}

impl InspectSession {
    pub fn new(store: Arc<LineStore>, registry: Arc<ParserRegistry>) -> Self {
        Self {
            store,
            registry,
            filters: FilterState::new(),
            anomaly_config: AnomalyConfig::default(),
            baseline: None,
            anomaly_cache: None,
        }
    }

    pub const fn store(&self) -> &Arc<LineStore> {
        &self.store
    }

    // ========================================================================
    // Indexed line access
    // ========================================================================

    /// Line by 0-based index.
    pub fn line(&self, index: usize) -> Option<Arc<LogLine>> {
        self.store.get(index)
    }

    pub fn total_lines(&self) -> usize {
        self.store.len()
    }

    pub fn progress(&self) -> LoadProgress {
        self.store.progress()
    }

    // ========================================================================
    // Filters
    // ========================================================================

    /// Replace the filter rule list; returns compile errors for rules
    /// whose patterns are invalid (those rules simply never match).
    pub fn set_filter_rules(&mut self, rules: Vec<FilterRule>) -> Vec<RuleError> {
        self.filters.set_rules(rules).to_vec()
    }

    pub fn set_min_level(&mut self, min_level: Option<crate::parser::LogLevel>) {
        self.filters.set_min_level(min_level);
    }

    pub fn set_anomaly_only(&mut self, anomaly_only: bool) {
        self.filters.set_anomaly_only(anomaly_only);
    }

    pub const fn filter_config(&self) -> &FilterConfig {
        self.filters.config()
    }

    /// Capture the complete active filter configuration and clear it.
    pub fn suspend_filters(&mut self) -> FilterConfig {
        self.filters.suspend()
    }

    /// Restore a previously captured configuration atomically.
    pub fn resume_filters(&mut self, config: FilterConfig) -> Vec<RuleError> {
        self.filters.resume(config).to_vec()
    }

    /// Indices of lines passing the active configuration, in order.
    pub fn apply_filters(&mut self) -> Vec<usize> {
        let snapshot = self.store.snapshot();
        let indices = self.filters.apply(&snapshot);
        if !self.filters.config().anomaly_only {
            return indices;
        }
        let Some(result) = self.anomaly_for(&snapshot) else {
            // No baseline yet: the flag has nothing to compare against
            return indices;
        };
        indices
            .into_iter()
            .filter(|&index| result.is_anomalous(index))
            .collect()
    }

    /// Evaluate one line (e.g. freshly tailed) against the active
    /// configuration without recomputing the index set.
    pub fn check_line(&self, line: &LogLine) -> bool {
        if !self.filters.check(line) {
            return false;
        }
        if !self.filters.config().anomaly_only {
            return true;
        }
        // A line not yet in any snapshot scores against the baseline
        // histogram directly
        match &self.baseline {
            None => true,
            Some(baseline) => !baseline.contains(&extract_template(line)),
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// All matches for a query over the current snapshot, wrapped in a
    /// navigable cursor.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchCursor, RuleError> {
        let snapshot = self.store.snapshot();
        Ok(SearchCursor::new(find_matches(&snapshot, query)?))
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    pub fn analyze(&self, mode: AnalysisMode) -> AnalysisReport {
        let snapshot = self.store.snapshot();
        match mode {
            AnalysisMode::Templates => AnalysisReport::Templates(build_template_groups(&snapshot)),
            AnalysisMode::Fields => AnalysisReport::Fields(build_field_groups(&snapshot)),
        }
    }

    // ========================================================================
    // Anomaly detection
    // ========================================================================

    pub const fn anomaly_config(&self) -> &AnomalyConfig {
        &self.anomaly_config
    }

    pub fn set_spike_multiplier(&mut self, multiplier: f64) {
        self.anomaly_config.spike_multiplier = multiplier;
        self.anomaly_cache = None;
    }

    /// Supply the baseline from an already-parsed line set.
    pub fn set_baseline_lines(&mut self, lines: &[Arc<LogLine>]) {
        self.baseline = Some(Baseline::from_lines(lines));
        self.anomaly_cache = None;
    }

    /// Drain a raw-line source completely and build the baseline from
    /// it. Per-line auto detection is used, as for any merged stream.
    pub fn load_baseline(&mut self, mut source: Box<dyn RawLineSource>) -> Result<usize, SourceError> {
        let mut lines = Vec::new();
        let mut number = 1;
        while let Some(raw) = source.read_line()? {
            lines.push(Arc::new(self.registry.parse(number, &raw, ParserChoice::Auto)));
            number += 1;
        }
        let count = lines.len();
        self.set_baseline_lines(&lines);
        Ok(count)
    }

    pub const fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// The anomaly comparison for the current snapshot; `None` until a
    /// baseline has been supplied. Recomputed when the store grows.
    pub fn anomaly_result(&mut self) -> Option<&AnomalyResult> {
        if self.baseline.is_none() {
            return None;
        }
        let snapshot = self.store.snapshot();
        self.anomaly_for(&snapshot);
        self.anomaly_cache.as_ref().map(|(_, result)| result)
    }

    /// Ensure the cache matches this snapshot's length.
    fn anomaly_for(&mut self, snapshot: &[Arc<LogLine>]) -> Option<&AnomalyResult> {
        let baseline = self.baseline.as_ref()?;
        let stale = self
            .anomaly_cache
            .as_ref()
            .is_none_or(|(len, _)| *len != snapshot.len());
        if stale {
            debug!(lines = snapshot.len(), "recomputing anomaly scores");
            let result = detect_anomalies(snapshot, baseline, &self.anomaly_config);
            self.anomaly_cache = Some((snapshot.len(), result));
        }
        self.anomaly_cache.as_ref().map(|(_, result)| result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::FilterType;
    use crate::core::source::MemorySource;

    fn session_with(raws: &[&str]) -> InspectSession {
        let registry = Arc::new(ParserRegistry::with_default_formats());
        let store = LineStore::new();
        let lines: Vec<crate::parser::LogLine> = raws
            .iter()
            .enumerate()
            .map(|(i, raw)| registry.parse(i + 1, raw, ParserChoice::Auto))
            .collect();
        store.extend(lines);
        InspectSession::new(store, registry)
    }

    #[test]
    fn test_indexed_access() {
        let session = session_with(&["one", "two"]);
        assert_eq!(session.total_lines(), 2);
        assert_eq!(session.line(1).unwrap().raw, "two");
        assert!(session.line(2).is_none());
    }

    #[test]
    fn test_apply_filters_empty_rules_returns_everything() {
        let mut session = session_with(&["a", "b", "c"]);
        assert_eq!(session.apply_filters(), vec![0, 1, 2]);
    }

    #[test]
    fn test_filter_and_check_line_agree() {
        let mut session = session_with(&["keep alpha", "drop beta", "keep gamma"]);
        session.set_filter_rules(vec![FilterRule::substring(FilterType::Exclude, "drop")]);
        assert_eq!(session.apply_filters(), vec![0, 2]);
        let kept = session.line(0).unwrap();
        let dropped = session.line(1).unwrap();
        assert!(session.check_line(&kept));
        assert!(!session.check_line(&dropped));
    }

    #[test]
    fn test_search_returns_cursor() {
        let session = session_with(&["alpha beta", "gamma", "beta again"]);
        let mut cursor = session.search(&SearchQuery::text("beta")).unwrap();
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.next().unwrap().index, 0);
    }

    #[test]
    fn test_analyze_templates() {
        let session = session_with(&["job 1 done", "job 2 done", "something else"]);
        let AnalysisReport::Templates(groups) = session.analyze(AnalysisMode::Templates) else {
            panic!("expected template analysis");
        };
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].template, "job <NUM> done");
    }

    #[test]
    fn test_analyze_fields() {
        let session = session_with(&[r#"{"mode":"a"}"#, r#"{"mode":"b"}"#, "text"]);
        let AnalysisReport::Fields(groups) = session.analyze(AnalysisMode::Fields) else {
            panic!("expected field analysis");
        };
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_anomaly_result_requires_baseline() {
        let mut session = session_with(&["whatever"]);
        assert!(session.anomaly_result().is_none());
        assert!(!session.has_baseline());
    }

    #[test]
    fn test_baseline_via_raw_source_then_anomalies() {
        let mut session = session_with(&["heartbeat 1", "brand new failure mode"]);
        let baseline_lines: Vec<String> =
            (0..20).map(|i| format!("heartbeat {i}")).collect();
        let source = MemorySource::new("baseline", baseline_lines);
        let drained = session.load_baseline(Box::new(source)).unwrap();
        assert_eq!(drained, 20);

        let result = session.anomaly_result().unwrap();
        assert_eq!(result.score(0), 0.0);
        assert_eq!(result.score(1), 1.0);
        assert_eq!(result.anomaly_count, 1);
    }

    #[test]
    fn test_anomaly_recomputed_when_store_grows() {
        let mut session = session_with(&["heartbeat 1"]);
        let source = MemorySource::new(
            "baseline",
            (0..5).map(|i| format!("heartbeat {i}")).collect::<Vec<_>>(),
        );
        session.load_baseline(Box::new(source)).unwrap();
        assert_eq!(session.anomaly_result().unwrap().anomaly_count, 0);

        let registry = Arc::clone(&session.registry);
        let number = session.store.next_line_number();
        session
            .store
            .append(registry.parse(number, "unseen explosion", ParserChoice::Auto));
        assert_eq!(session.anomaly_result().unwrap().anomaly_count, 1);
    }

    #[test]
    fn test_anomaly_only_filtering() {
        let mut session = session_with(&["heartbeat 1", "novel breakage", "heartbeat 2"]);
        let source = MemorySource::new(
            "baseline",
            (0..10).map(|i| format!("heartbeat {i}")).collect::<Vec<_>>(),
        );
        session.load_baseline(Box::new(source)).unwrap();
        session.set_anomaly_only(true);
        assert_eq!(session.apply_filters(), vec![1]);

        // check_line on a fresh line consults the baseline directly
        let registry = Arc::clone(&session.registry);
        let fresh_known = registry.parse(99, "heartbeat 42", ParserChoice::Auto);
        let fresh_novel = registry.parse(99, "meltdown imminent", ParserChoice::Auto);
        assert!(!session.check_line(&fresh_known));
        assert!(session.check_line(&fresh_novel));
    }

    #[test]
    fn test_suspend_resume_through_session() {
        let mut session = session_with(&["alpha", "beta"]);
        session.set_filter_rules(vec![FilterRule::substring(FilterType::Include, "alpha")]);
        session.set_anomaly_only(false);
        assert_eq!(session.apply_filters(), vec![0]);

        let config = session.suspend_filters();
        assert_eq!(session.apply_filters(), vec![0, 1]);

        session.resume_filters(config);
        assert_eq!(session.apply_filters(), vec![0]);
    }
}
