use crate::metric::{CorrectiveAction, QualityMetric};
use meridian_core::clamp_unit;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Scores of one answer over the seven quality metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Stable identifier of the assessed query.
    pub query_id: String,
    pub scores: BTreeMap<QualityMetric, f64>,
    /// Weighted sum of `scores`, always in `[0, 1]`.
    pub overall_score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Actions mapped from metrics below their thresholds, without repeats.
    #[serde(default)]
    pub suggested_corrections: Vec<CorrectiveAction>,
    #[serde(default)]
    pub reasoning: String,
}

impl QualityAssessment {
    /// Build an assessment from raw metric scores.
    ///
    /// Scores are clamped into `[0, 1]`; a metric absent from `scores` counts
    /// as 0. Every metric below its entry in `thresholds` adds an issue and
    /// its corrective actions. `extra_issues` are listed first.
    pub fn from_scores(
        query: &str,
        scores: BTreeMap<QualityMetric, f64>,
        thresholds: &BTreeMap<QualityMetric, f64>,
        extra_issues: Vec<String>,
    ) -> Self {
        let scores: BTreeMap<QualityMetric, f64> = QualityMetric::ALL
            .iter()
            .map(|&m| (m, clamp_unit(scores.get(&m).copied().unwrap_or(0.0))))
            .collect();
        let overall_score = clamp_unit(
            scores
                .iter()
                .map(|(metric, score)| metric.weight() * score)
                .sum(),
        );

        let mut issues = extra_issues;
        let mut suggested_corrections: Vec<CorrectiveAction> = Vec::new();
        for metric in QualityMetric::ALL {
            let score = scores.get(&metric).copied().unwrap_or(0.0);
            let threshold = thresholds
                .get(&metric)
                .copied()
                .unwrap_or_else(|| metric.default_threshold());
            if score < threshold {
                issues.push(format!("{metric} below threshold: {score:.2} < {threshold:.2}"));
                for action in metric.corrective_actions() {
                    if !suggested_corrections.contains(action) {
                        suggested_corrections.push(*action);
                    }
                }
            }
        }

        let reasoning = format!(
            "overall {overall_score:.2}: {}",
            scores
                .iter()
                .map(|(m, s)| format!("{m}={s:.2}"))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self {
            query_id: query_id(query),
            scores,
            overall_score,
            issues,
            suggested_corrections,
            reasoning,
        }
    }

    /// Every metric at `score`, with default thresholds.
    pub fn uniform(query: &str, score: f64) -> Self {
        let scores = QualityMetric::ALL.iter().map(|&m| (m, score)).collect();
        Self::from_scores(query, scores, &BTreeMap::new(), Vec::new())
    }

    /// True when the overall score or any single metric is below `threshold`.
    pub fn needs_correction(&self, threshold: f64) -> bool {
        self.overall_score < threshold || self.scores.values().any(|&s| s < threshold)
    }

    /// Score of one metric, 0 when missing.
    pub fn score(&self, metric: QualityMetric) -> f64 {
        self.scores.get(&metric).copied().unwrap_or(0.0)
    }
}

/// First 16 hex digits of the SHA-256 of the trimmed query.
pub fn query_id(query: &str) -> String {
    let digest = Sha256::digest(query.trim().as_bytes());
    hex::encode(&digest[..8])
}
