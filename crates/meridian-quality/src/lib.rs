//! Answer quality assessment and bounded self-correction for Meridian.
//!
//! An answer produced by the [`AnswerGenerator`] (retrieve, grade, synthesize)
//! is scored by the [`QualityAssessor`] over seven weighted metrics. While it
//! falls short, the [`SelfCorrectionLoop`] asks the [`CorrectionEngine`] to
//! apply the corrective actions the assessment suggests, keeping the best
//! answer seen.
//!
//! # Main types
//!
//! - [`QualityMetric`] / [`CorrectiveAction`] — Metric weights, thresholds and the action table.
//! - [`QualityAssessment`] — Scores, issues and suggested corrections for one answer.
//! - [`CorrectionContext`] — State shared by the attempts of one loop run.
//! - [`CragResult`] — Outcome of a self-correction run.
//! - [`AnswerSource`], [`QualityJudge`], [`Corrector`] — Seams the loop drives.

/// Quality assessments.
pub mod assessment;
/// Model-backed assessor and scoring heuristics.
pub mod assessor;
/// Correction settings.
pub mod config;
/// Per-run correction state.
pub mod context;
/// The self-correction loop.
pub mod correction_loop;
/// Corrective action handlers.
pub mod engine;
/// Retrieval-graded answer generation.
pub mod generator;
/// Metrics and corrective actions.
pub mod metric;

pub use assessment::{query_id, QualityAssessment};
pub use assessor::{
    age_score, chunk_reliability, latest_year, source_reliability, temporal_validity,
    QualityAssessor, QualityJudge, UNDATED_SCORE, UNPARSABLE_SCORE,
};
pub use config::CorrectionConfig;
pub use context::{CorrectionAttempt, CorrectionContext};
pub use correction_loop::{CragResult, SelfCorrectionLoop};
pub use engine::{
    content_hash, dedup_sources, CorrectionEngine, Corrector, RELIABILITY_FLOOR,
    RETRIEVE_MORE_CONFIDENCE_CAP,
};
pub use generator::{mean_score, AnswerGenerator, AnswerSource};
pub use metric::{CorrectiveAction, QualityMetric};
