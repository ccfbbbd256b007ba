use crate::assessment::QualityAssessment;
use crate::assessor::{QualityAssessor, QualityJudge};
use crate::config::CorrectionConfig;
use crate::context::CorrectionContext;
use crate::engine::{CorrectionEngine, Corrector};
use crate::generator::{AnswerGenerator, AnswerSource};
use crate::metric::CorrectiveAction;
use chrono::Utc;
use meridian_core::{
    ExperienceEvent, ExperienceStore, InferenceProvider, RagAnswer, RetrievalProvider,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Output of one self-correction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CragResult {
    /// Best-scoring answer seen, not necessarily the last one produced.
    pub final_result: RagAnswer,
    /// The most recent assessment performed.
    pub quality_assessment: QualityAssessment,
    /// Overall score of `final_result`.
    pub final_score: f64,
    pub correction_iterations: u32,
    /// Every action applied during the run, once each.
    pub corrections_applied: Vec<CorrectiveAction>,
    /// Last recorded confidence minus the first.
    pub improvement_score: f64,
    #[serde(with = "meridian_core::serde_millis")]
    pub total_processing_time: Duration,
    /// Confidence of each produced answer, in order. May go down.
    pub confidence_evolution: Vec<f64>,
    /// Human-readable record of what was attempted.
    #[serde(default)]
    pub trail: Vec<String>,
}

/// Alternates assessment and correction until the answer is good enough,
/// stops improving, or the iteration cap is reached.
pub struct SelfCorrectionLoop {
    source: Arc<dyn AnswerSource>,
    judge: Arc<dyn QualityJudge>,
    corrector: Arc<dyn Corrector>,
    config: CorrectionConfig,
    experience: Option<Arc<dyn ExperienceStore>>,
}

impl SelfCorrectionLoop {
    pub fn new(
        source: Arc<dyn AnswerSource>,
        judge: Arc<dyn QualityJudge>,
        corrector: Arc<dyn Corrector>,
        config: CorrectionConfig,
    ) -> Self {
        Self {
            source,
            judge,
            corrector,
            config,
            experience: None,
        }
    }

    /// Wire the model-backed generator, assessor and correction engine.
    pub fn from_providers(
        provider: Arc<dyn InferenceProvider>,
        retriever: Arc<dyn RetrievalProvider>,
        model: &str,
        config: CorrectionConfig,
    ) -> Self {
        let generator = Arc::new(AnswerGenerator::new(
            provider.clone(),
            retriever,
            model,
            &config,
        ));
        let judge = QualityAssessor::new(provider.clone(), model).with_thresholds(config.thresholds());
        let engine = CorrectionEngine::new(provider, generator.clone(), model, config.broadened_top_k);
        Self::new(generator, Arc::new(judge), Arc::new(engine), config)
    }

    pub fn with_experience_store(mut self, store: Arc<dyn ExperienceStore>) -> Self {
        self.experience = Some(store);
        self
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Answer `query` and correct the answer. Never fails: when no initial
    /// answer can be produced the result carries an empty answer, zero
    /// scores and the error in its trail.
    pub async fn run(&self, query: &str) -> CragResult {
        let start = Instant::now();
        let threshold = self.config.quality_threshold;
        let mut trail = Vec::new();

        let initial = match self.source.answer(query).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(query = %query, error = %e, "Initial answer failed");
                trail.push(format!("initial answer failed: {e}"));
                let result = self.failed(query, e.to_string(), trail, start);
                self.record_experience(query, &result).await;
                return result;
            }
        };

        let mut confidence_evolution = vec![initial.confidence];
        let mut assessment = self.judge.assess(query, &initial).await;
        trail.push(format!(
            "initial answer scored {:.2}",
            assessment.overall_score
        ));

        let mut best = initial.clone();
        let mut best_score = assessment.overall_score;
        let mut context = CorrectionContext::new(
            query,
            initial,
            assessment.clone(),
            self.config.max_iterations,
        );

        while assessment.needs_correction(threshold) && context.iteration < self.config.max_iterations {
            context.iteration += 1;
            let attempt = self.corrector.apply(&mut context).await;
            let candidate = self.judge.assess(query, &attempt.answer).await;
            confidence_evolution.push(attempt.answer.confidence);
            let improvement = candidate.overall_score - assessment.overall_score;

            let applied: Vec<&str> = attempt.applied.iter().map(|a| a.as_str()).collect();
            info!(
                iteration = context.iteration,
                applied = ?applied,
                previous = assessment.overall_score,
                score = candidate.overall_score,
                improvement,
                "Correction attempt assessed"
            );
            if let Some(failure) = &attempt.failure {
                trail.push(format!("iteration {}: {failure}", context.iteration));
            }

            if improvement > self.config.improvement_threshold {
                trail.push(format!(
                    "iteration {}: applied [{}], score {:.2} -> {:.2}, adopted",
                    context.iteration,
                    applied.join(", "),
                    assessment.overall_score,
                    candidate.overall_score
                ));
                assessment = candidate;
                if assessment.overall_score > best_score {
                    best = attempt.answer.clone();
                    best_score = assessment.overall_score;
                }
                context.original_result = attempt.answer;
                context.assessment = assessment.clone();
            } else {
                trail.push(format!(
                    "iteration {}: applied [{}], score {:.2} -> {:.2}, not adopted; stopping",
                    context.iteration,
                    applied.join(", "),
                    assessment.overall_score,
                    candidate.overall_score
                ));
                assessment = candidate;
                break;
            }
        }

        let first = confidence_evolution.first().copied().unwrap_or(0.0);
        let last = confidence_evolution.last().copied().unwrap_or(first);
        let result = CragResult {
            final_result: best,
            quality_assessment: assessment,
            final_score: best_score,
            correction_iterations: context.iteration,
            corrections_applied: context.correction_history,
            improvement_score: last - first,
            total_processing_time: start.elapsed(),
            confidence_evolution,
            trail,
        };

        info!(
            query = %query,
            iterations = result.correction_iterations,
            final_score = result.final_score,
            duration_ms = result.total_processing_time.as_millis() as u64,
            "Self-correction complete"
        );
        self.record_experience(query, &result).await;
        result
    }

    fn failed(&self, query: &str, error: String, trail: Vec<String>, start: Instant) -> CragResult {
        let assessment = QualityAssessment::from_scores(
            query,
            Default::default(),
            &self.config.thresholds(),
            vec![error],
        );
        CragResult {
            final_result: RagAnswer::new(query, "", Vec::new(), 0.0),
            quality_assessment: assessment,
            final_score: 0.0,
            correction_iterations: 0,
            corrections_applied: Vec::new(),
            improvement_score: 0.0,
            total_processing_time: start.elapsed(),
            confidence_evolution: vec![0.0],
            trail,
        }
    }

    async fn record_experience(&self, query: &str, result: &CragResult) {
        let Some(store) = &self.experience else {
            return;
        };
        let event = ExperienceEvent::CorrectionLoopCompleted {
            query: query.to_string(),
            iterations: result.correction_iterations,
            corrections_applied: result
                .corrections_applied
                .iter()
                .map(ToString::to_string)
                .collect(),
            final_score: result.final_score,
            improvement_score: result.improvement_score,
            duration_ms: result.total_processing_time.as_millis() as u64,
            recorded_at: Utc::now(),
        };
        if let Err(e) = store.record(event).await {
            warn!(error = %e, "Failed to record experience");
        }
    }
}
