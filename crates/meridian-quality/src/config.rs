use crate::metric::QualityMetric;
use meridian_core::DEFAULT_ADMISSION_LIMIT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings of the self-correction loop and the components it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Overall and per-metric bar an answer must clear to stop correcting.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Minimum score gain for a corrected answer to be adopted.
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f64,
    /// Per-metric issue thresholds; missing entries use the metric default.
    #[serde(default)]
    pub metric_thresholds: BTreeMap<QualityMetric, f64>,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    /// Chunks requested by the `retrieve_more` correction.
    #[serde(default = "default_broadened_top_k")]
    pub broadened_top_k: usize,
    /// Graded chunks below this relevance are dropped.
    #[serde(default = "default_min_chunk_relevance")]
    pub min_chunk_relevance: f64,
    /// Chunk grading calls in flight at once.
    #[serde(default = "default_grading_concurrency")]
    pub grading_concurrency: usize,
}

fn default_quality_threshold() -> f64 {
    0.75
}

fn default_max_iterations() -> u32 {
    3
}

fn default_improvement_threshold() -> f64 {
    0.05
}

fn default_retrieval_top_k() -> usize {
    5
}

fn default_broadened_top_k() -> usize {
    10
}

fn default_min_chunk_relevance() -> f64 {
    0.3
}

fn default_grading_concurrency() -> usize {
    DEFAULT_ADMISSION_LIMIT
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            max_iterations: default_max_iterations(),
            improvement_threshold: default_improvement_threshold(),
            metric_thresholds: BTreeMap::new(),
            retrieval_top_k: default_retrieval_top_k(),
            broadened_top_k: default_broadened_top_k(),
            min_chunk_relevance: default_min_chunk_relevance(),
            grading_concurrency: default_grading_concurrency(),
        }
    }
}

impl CorrectionConfig {
    /// Issue threshold of `metric`.
    pub fn threshold(&self, metric: QualityMetric) -> f64 {
        self.metric_thresholds
            .get(&metric)
            .copied()
            .unwrap_or_else(|| metric.default_threshold())
    }

    /// Issue thresholds of every metric.
    pub fn thresholds(&self) -> BTreeMap<QualityMetric, f64> {
        QualityMetric::ALL
            .iter()
            .map(|&m| (m, self.threshold(m)))
            .collect()
    }
}
