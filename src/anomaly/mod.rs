//! Baseline-relative anomaly scoring.
//!
//! A [`Baseline`] is an immutable template histogram computed once
//! from a fully-drained reference line set. [`detect_anomalies`] is a
//! pure function of two histograms: it holds no session state and is
//! recomputed whenever either side changes.

pub mod templates;

pub use templates::{
    build_field_groups, build_template_groups, extract_template, template_to_regex, tokenize,
    FieldGroup, TemplateGroup,
};

use crate::parser::LogLine;
use ahash::{AHashMap, AHashSet};
use std::sync::Arc;
use tracing::info;

/// Scoring knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyConfig {
    /// A template is a frequency spike when its current count exceeds
    /// this multiple of its baseline count. Raw counts are compared;
    /// scale the multiplier to approximate rate normalization when
    /// the two captures differ wildly in size.
    pub spike_multiplier: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            spike_multiplier: 5.0,
        }
    }
}

/// Template statistics from a known-good reference capture.
#[derive(Debug, Clone)]
pub struct Baseline {
    counts: AHashMap<String, usize>,
    total_lines: usize,
}

impl Baseline {
    /// Build from a fully-drained line set.
    pub fn from_lines(lines: &[Arc<LogLine>]) -> Self {
        let mut counts: AHashMap<String, usize> = AHashMap::new();
        for group in build_template_groups(lines) {
            counts.insert(group.template, group.count);
        }
        info!(
            templates = counts.len(),
            lines = lines.len(),
            "baseline built"
        );
        Self {
            counts,
            total_lines: lines.len(),
        }
    }

    pub fn template_count(&self, template: &str) -> usize {
        self.counts.get(template).copied().unwrap_or(0)
    }

    pub fn contains(&self, template: &str) -> bool {
        self.counts.contains_key(template)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub const fn total_lines(&self) -> usize {
        self.total_lines
    }
}

/// A template whose frequency jumped relative to the baseline.
#[derive(Debug, Clone)]
pub struct FrequencySpike {
    pub template: TemplateGroup,
    pub baseline_count: usize,
    pub current_count: usize,
}

/// Result of comparing the current lines against a baseline.
#[derive(Debug, Clone, Default)]
pub struct AnomalyResult {
    /// Templates absent from the baseline entirely.
    pub novel_templates: Vec<TemplateGroup>,
    /// Templates whose count exceeds the spike threshold.
    pub frequency_spikes: Vec<FrequencySpike>,
    /// Baseline templates no longer seen, sorted for determinism.
    pub disappeared_templates: Vec<String>,
    /// Per-line score, indexed like the snapshot. Every value is
    /// 0.0, 0.5 or 1.0.
    pub scores: Vec<f64>,
    /// Lines with a nonzero score.
    pub anomaly_count: usize,
}

impl AnomalyResult {
    /// Score of one line by snapshot index.
    pub fn score(&self, line_index: usize) -> f64 {
        self.scores.get(line_index).copied().unwrap_or(0.0)
    }

    pub fn is_anomalous(&self, line_index: usize) -> bool {
        self.score(line_index) > 0.0
    }
}

/// Compare current lines against a baseline.
///
/// Per current template: absent from the baseline scores 1.0 (novel);
/// `current > multiplier × baseline` scores 0.5 (frequency spike);
/// anything else 0.0. A line scores exactly what its template scores.
pub fn detect_anomalies(
    lines: &[Arc<LogLine>],
    baseline: &Baseline,
    config: &AnomalyConfig,
) -> AnomalyResult {
    let mut result = AnomalyResult {
        scores: vec![0.0; lines.len()],
        ..AnomalyResult::default()
    };

    let current_groups = build_template_groups(lines);
    let mut current_templates: AHashSet<&str> = AHashSet::new();

    for group in &current_groups {
        current_templates.insert(group.template.as_str());

        if !baseline.contains(&group.template) {
            for &index in &group.line_indices {
                result.scores[index] = 1.0;
            }
            result.novel_templates.push(group.clone());
            continue;
        }

        let baseline_count = baseline.template_count(&group.template);
        if group.count as f64 > config.spike_multiplier * baseline_count as f64 {
            for &index in &group.line_indices {
                result.scores[index] = result.scores[index].max(0.5);
            }
            result.frequency_spikes.push(FrequencySpike {
                template: group.clone(),
                baseline_count,
                current_count: group.count,
            });
        }
    }

    result.disappeared_templates = baseline
        .counts
        .keys()
        .filter(|template| !current_templates.contains(template.as_str()))
        .cloned()
        .collect();
    result.disappeared_templates.sort();

    result.anomaly_count = result.scores.iter().filter(|&&s| s > 0.0).count();
    result
}
