use crate::assessment::QualityAssessment;
use crate::metric::QualityMetric;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use futures_util::future::join_all;
use meridian_core::{clamp_unit, extract_score, InferenceProvider, InvokeParams, RagAnswer, SourceChunk};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

/// Score given to a judged metric whose reply holds no usable number.
pub const UNPARSABLE_SCORE: f64 = 0.5;
/// Temporal score when no source carries a year.
pub const UNDATED_SCORE: f64 = 0.7;

const NEUTRAL_RELIABILITY: f64 = 0.6;
const RELIABILITY_STEP: f64 = 0.3;

/// Locator tokens of reference-grade material.
const TRUSTED_MARKERS: &[&str] = &[
    "docs",
    "doc",
    "documentation",
    "reference",
    "manual",
    "official",
    "standard",
    "paper",
    "api",
    "guide",
    "handbook",
    "readme",
    "rfc",
    "gov",
    "edu",
];

/// Locator tokens of opinion or hearsay.
const DOUBTFUL_MARKERS: &[&str] = &[
    "blog", "blogs", "opinion", "forum", "reddit", "medium", "rumor", "comments", "tweet",
];

#[allow(clippy::expect_used)]
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("Invalid year pattern"));

/// Anything that can score an answer.
///
/// [`QualityAssessor`] is the model-backed implementation.
#[async_trait]
pub trait QualityJudge: Send + Sync {
    async fn assess(&self, query: &str, answer: &RagAnswer) -> QualityAssessment;
}

/// Scores answers over the seven quality metrics.
///
/// Five metrics are graded by the inference provider, concurrently; source
/// reliability and temporal validity are local heuristics.
pub struct QualityAssessor {
    provider: Arc<dyn InferenceProvider>,
    model: String,
    params: InvokeParams,
    thresholds: BTreeMap<QualityMetric, f64>,
    reference_year: Option<i32>,
}

impl QualityAssessor {
    pub fn new(provider: Arc<dyn InferenceProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            params: InvokeParams::new(256, 0.0),
            thresholds: BTreeMap::new(),
            reference_year: None,
        }
    }

    /// Per-metric issue thresholds.
    pub fn with_thresholds(mut self, thresholds: BTreeMap<QualityMetric, f64>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Pin the year source ages are measured against. Defaults to the current year.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// Score `answer` against `query`. Never fails: a metric whose scoring
    /// call fails scores 0 and is listed as an issue.
    pub async fn assess(&self, query: &str, answer: &RagAnswer) -> QualityAssessment {
        let judged: Vec<QualityMetric> = QualityMetric::ALL
            .iter()
            .copied()
            .filter(|m| m.is_judged())
            .filter(|m| *m != QualityMetric::FactualConsistency || answer.sources.len() >= 2)
            .collect();

        let graded = join_all(judged.iter().map(|&m| self.grade(m, query, answer))).await;

        let mut scores = BTreeMap::new();
        let mut failures = Vec::new();
        for (metric, outcome) in judged.into_iter().zip(graded) {
            match outcome {
                Ok(score) => {
                    scores.insert(metric, score);
                }
                Err(issue) => {
                    scores.insert(metric, 0.0);
                    failures.push(issue);
                }
            }
        }
        // Nothing to contradict with fewer than two sources.
        scores
            .entry(QualityMetric::FactualConsistency)
            .or_insert(1.0);
        scores.insert(
            QualityMetric::SourceReliability,
            source_reliability(&answer.sources),
        );
        let year = self.reference_year.unwrap_or_else(|| Utc::now().year());
        scores.insert(
            QualityMetric::TemporalValidity,
            temporal_validity(&answer.sources, year),
        );

        let assessment = QualityAssessment::from_scores(query, scores, &self.thresholds, failures);
        info!(
            query_id = %assessment.query_id,
            overall_score = assessment.overall_score,
            issues = assessment.issues.len(),
            "Quality assessed"
        );
        assessment
    }

    /// Grade one judged metric. `Err` carries the issue text.
    async fn grade(&self, metric: QualityMetric, query: &str, answer: &RagAnswer) -> Result<f64, String> {
        let prompt = judge_prompt(metric, query, answer);
        match self.provider.invoke(&self.model, &prompt, &self.params).await {
            Ok(reply) => match extract_score(&reply) {
                Some(score) => Ok(score),
                None => {
                    warn!(metric = %metric, reply = %reply, "Unparsable metric score, using default");
                    Ok(UNPARSABLE_SCORE)
                }
            },
            Err(e) => {
                warn!(metric = %metric, error = %e, "Metric scoring failed");
                Err(format!("{metric} scoring failed: {e}"))
            }
        }
    }
}

#[async_trait]
impl QualityJudge for QualityAssessor {
    async fn assess(&self, query: &str, answer: &RagAnswer) -> QualityAssessment {
        QualityAssessor::assess(self, query, answer).await
    }
}

fn judge_prompt(metric: QualityMetric, query: &str, answer: &RagAnswer) -> String {
    let criterion = match metric {
        QualityMetric::Relevance => "How directly does the answer address the question?",
        QualityMetric::Accuracy => "How well is every claim in the answer supported by the sources?",
        QualityMetric::Completeness => "How fully does the answer cover every part of the question?",
        QualityMetric::Coherence => "How clear, well structured and internally consistent is the answer?",
        QualityMetric::FactualConsistency => {
            "How consistent are the sources with each other on the facts the answer uses?"
        }
        QualityMetric::SourceReliability | QualityMetric::TemporalValidity => {
            "How good is the answer overall?"
        }
    };
    let mut prompt = format!(
        "You are grading an answer for {metric}.\n{criterion}\n\nQuestion: {query}\n\nAnswer:\n{}\n",
        answer.answer
    );
    if !answer.sources.is_empty() {
        prompt.push_str("\nSources:\n");
        prompt.push_str(&answer.render_sources());
        prompt.push('\n');
    }
    prompt.push_str("\nReply with a single number between 0 and 1.");
    prompt
}

/// Reliability of one source judged from its title and path.
pub fn chunk_reliability(chunk: &SourceChunk) -> f64 {
    let locator = chunk.locator();
    let tokens: Vec<&str> = locator
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |markers: &[&str]| tokens.iter().any(|t| markers.contains(t));

    let mut score = NEUTRAL_RELIABILITY;
    if has(TRUSTED_MARKERS) {
        score += RELIABILITY_STEP;
    }
    if has(DOUBTFUL_MARKERS) {
        score -= RELIABILITY_STEP;
    }
    clamp_unit(score)
}

/// Mean reliability of `sources`; 0 without sources.
pub fn source_reliability(sources: &[SourceChunk]) -> f64 {
    if sources.is_empty() {
        return 0.0;
    }
    let total: f64 = sources.iter().map(chunk_reliability).sum();
    clamp_unit(total / sources.len() as f64)
}

/// Most recent four-digit year mentioned in `text`.
pub fn latest_year(text: &str) -> Option<i32> {
    YEAR.find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .max()
}

/// Freshness score for a source dated `year`, relative to `reference_year`.
pub fn age_score(year: i32, reference_year: i32) -> f64 {
    match reference_year - year {
        age if age <= 1 => 1.0,
        age if age <= 3 => 0.8,
        age if age <= 5 => 0.6,
        _ => 0.3,
    }
}

/// Mean freshness of `sources`; undated sources score [`UNDATED_SCORE`].
pub fn temporal_validity(sources: &[SourceChunk], reference_year: i32) -> f64 {
    if sources.is_empty() {
        return UNDATED_SCORE;
    }
    let total: f64 = sources
        .iter()
        .map(|s| match latest_year(&format!("{} {}", s.title, s.content)) {
            Some(year) => age_score(year, reference_year),
            None => UNDATED_SCORE,
        })
        .sum();
    total / sources.len() as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_reliability_markers() {
        let docs = SourceChunk::new("1", "Tokio documentation", "x").with_path("docs/runtime.md");
        let blog = SourceChunk::new("2", "My blog post", "x");
        let plain = SourceChunk::new("3", "Notes", "x");
        assert!((chunk_reliability(&docs) - 0.9).abs() < 1e-9);
        assert!((chunk_reliability(&blog) - 0.3).abs() < 1e-9);
        assert!((chunk_reliability(&plain) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_marker_must_be_a_whole_token() {
        let rapid = SourceChunk::new("1", "Rapid prototyping", "x");
        assert!((chunk_reliability(&rapid) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_source_reliability_without_sources() {
        assert_eq!(source_reliability(&[]), 0.0);
    }

    #[test]
    fn test_age_buckets() {
        assert_eq!(age_score(2026, 2026), 1.0);
        assert_eq!(age_score(2025, 2026), 1.0);
        assert_eq!(age_score(2023, 2026), 0.8);
        assert_eq!(age_score(2021, 2026), 0.6);
        assert_eq!(age_score(2010, 2026), 0.3);
        assert_eq!(age_score(2030, 2026), 1.0);
    }

    #[test]
    fn test_temporal_validity() {
        let fresh = SourceChunk::new("1", "Release notes", "Published in 2019, revised 2025.");
        let undated = SourceChunk::new("2", "Guide", "timeless advice");
        assert_eq!(temporal_validity(&[fresh.clone()], 2026), 1.0);
        assert!((temporal_validity(&[fresh, undated], 2026) - 0.85).abs() < 1e-9);
        assert_eq!(temporal_validity(&[], 2026), UNDATED_SCORE);
    }

    #[test]
    fn test_latest_year_ignores_other_numbers() {
        assert_eq!(latest_year("port 8080 and 12345 in 2024"), Some(2024));
        assert_eq!(latest_year("version 3.1"), None);
    }

    #[test]
    fn test_year_pattern_is_valid() {
        assert!(YEAR.is_match("1999"));
        assert!(!YEAR.is_match("2101x"));
    }
}
