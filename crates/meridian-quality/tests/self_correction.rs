//! Self-correction loop stopping rules and correction handler behavior.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use async_trait::async_trait;
use common::{KeywordProvider, StaticRetriever};
use meridian_core::{
    ExperienceEvent, ExperienceStore, MeridianError, MeridianResult, RagAnswer, SourceChunk,
};
use meridian_quality::{
    AnswerGenerator, AnswerSource, CorrectionAttempt, CorrectionConfig, CorrectionContext,
    CorrectionEngine, CorrectiveAction, Corrector, QualityAssessment, QualityJudge, QualityMetric,
    SelfCorrectionLoop,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FixedSource(Option<RagAnswer>);

#[async_trait]
impl AnswerSource for FixedSource {
    async fn answer(&self, _query: &str) -> MeridianResult<RagAnswer> {
        self.0
            .clone()
            .ok_or_else(|| MeridianError::Retrieval("index offline".into()))
    }
}

/// Scores answers from a fixed sequence; the last score repeats.
struct ScriptedJudge {
    scores: Mutex<VecDeque<f64>>,
}

impl ScriptedJudge {
    fn new(scores: &[f64]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl QualityJudge for ScriptedJudge {
    async fn assess(&self, query: &str, _answer: &RagAnswer) -> QualityAssessment {
        let mut scores = self.scores.lock().unwrap();
        let score = if scores.len() > 1 {
            scores.pop_front().unwrap()
        } else {
            *scores.front().unwrap()
        };
        QualityAssessment::uniform(query, score)
    }
}

/// Produces "corrected N" answers, applying the first pending action each time.
#[derive(Default)]
struct CountingCorrector {
    calls: AtomicUsize,
}

#[async_trait]
impl Corrector for CountingCorrector {
    async fn apply(&self, context: &mut CorrectionContext) -> CorrectionAttempt {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut answer = context.original_result.clone();
        answer.answer = format!("corrected {n}");
        answer.confidence = 0.5 + 0.1 * n as f64;
        let mut applied = Vec::new();
        if let Some(action) = context.pending_actions().first().copied() {
            context.correction_history.push(action);
            applied.push(action);
        }
        CorrectionAttempt {
            answer,
            applied,
            failure: None,
        }
    }
}

#[derive(Default)]
struct MemoryStore {
    events: Mutex<Vec<ExperienceEvent>>,
}

#[async_trait]
impl ExperienceStore for MemoryStore {
    async fn record(&self, event: ExperienceEvent) -> MeridianResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn initial() -> RagAnswer {
    RagAnswer::new("q", "initial", vec![SourceChunk::new("1", "Notes", "text")], 0.5)
}

fn scripted_loop(scores: &[f64], corrector: Arc<CountingCorrector>) -> SelfCorrectionLoop {
    SelfCorrectionLoop::new(
        Arc::new(FixedSource(Some(initial()))),
        Arc::new(ScriptedJudge::new(scores)),
        corrector,
        CorrectionConfig::default(),
    )
}

#[tokio::test]
async fn test_small_improvement_stops_without_adopting() {
    let corrector = Arc::new(CountingCorrector::default());
    let result = scripted_loop(&[0.50, 0.52], corrector.clone()).run("q").await;

    assert_eq!(result.correction_iterations, 1);
    assert_eq!(result.final_result.answer, "initial");
    assert!((result.final_score - 0.50).abs() < 1e-9);
    assert_eq!(result.confidence_evolution.len(), 2);
    assert!(result.trail.iter().any(|t| t.contains("not adopted")));
}

#[tokio::test]
async fn test_improving_answer_is_adopted_until_good_enough() {
    let corrector = Arc::new(CountingCorrector::default());
    let result = scripted_loop(&[0.50, 0.65, 0.80], corrector.clone())
        .run("q")
        .await;

    assert_eq!(result.correction_iterations, 2);
    assert!((result.quality_assessment.overall_score - 0.80).abs() < 1e-9);
    assert!((result.final_score - 0.80).abs() < 1e-9);
    assert_eq!(result.final_result.answer, "corrected 2");
    assert_eq!(result.confidence_evolution.len(), 3);
    assert!((result.improvement_score - 0.2).abs() < 1e-9);
    assert_eq!(
        result.corrections_applied,
        vec![CorrectiveAction::RefineQuery, CorrectiveAction::RetrieveMore]
    );
}

#[tokio::test]
async fn test_zero_improvement_stops_after_first_attempt() {
    let corrector = Arc::new(CountingCorrector::default());
    let result = scripted_loop(&[0.40], corrector.clone()).run("q").await;

    assert_eq!(result.correction_iterations, 1);
    assert_eq!(corrector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.final_result.answer, "initial");
}

#[tokio::test]
async fn test_iterations_never_exceed_cap() {
    let corrector = Arc::new(CountingCorrector::default());
    let result = scripted_loop(&[0.10, 0.20, 0.30, 0.40, 0.50, 0.60], corrector.clone())
        .run("q")
        .await;

    assert_eq!(result.correction_iterations, 3);
    assert_eq!(corrector.calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.final_result.answer, "corrected 3");
    assert!((result.final_score - 0.40).abs() < 1e-9);
}

#[tokio::test]
async fn test_good_initial_answer_is_not_corrected() {
    let corrector = Arc::new(CountingCorrector::default());
    let store = Arc::new(MemoryStore::default());
    let result = scripted_loop(&[0.90], corrector.clone())
        .with_experience_store(store.clone())
        .run("q")
        .await;

    assert_eq!(result.correction_iterations, 0);
    assert_eq!(corrector.calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.improvement_score, 0.0);
    assert_eq!(result.confidence_evolution, vec![0.5]);

    let events = store.events.lock().unwrap();
    assert!(matches!(
        events.as_slice(),
        [ExperienceEvent::CorrectionLoopCompleted { iterations: 0, .. }]
    ));
}

#[tokio::test]
async fn test_initial_failure_returns_empty_result() {
    let store = Arc::new(MemoryStore::default());
    let correction = SelfCorrectionLoop::new(
        Arc::new(FixedSource(None)),
        Arc::new(ScriptedJudge::new(&[0.9])),
        Arc::new(CountingCorrector::default()),
        CorrectionConfig::default(),
    )
    .with_experience_store(store.clone());

    let result = correction.run("q").await;

    assert_eq!(result.final_result.answer, "");
    assert_eq!(result.final_score, 0.0);
    assert_eq!(result.correction_iterations, 0);
    assert!(result.trail[0].contains("index offline"));
    assert!(result.quality_assessment.issues[0].contains("index offline"));
    assert_eq!(store.events.lock().unwrap().len(), 1);
}

// Correction engine handlers against scripted model and retrieval.

fn engine(provider: Arc<KeywordProvider>, retriever: Arc<StaticRetriever>) -> CorrectionEngine {
    let config = CorrectionConfig::default();
    let generator = Arc::new(AnswerGenerator::new(provider.clone(), retriever, "m", &config));
    CorrectionEngine::new(provider, generator, "m", config.broadened_top_k)
}

fn context_with(answer: RagAnswer, actions: Vec<CorrectiveAction>) -> CorrectionContext {
    let mut assessment = QualityAssessment::uniform("q", 0.9);
    assessment.suggested_corrections = actions;
    CorrectionContext::new("q", answer, assessment, 3)
}

#[tokio::test]
async fn test_rewrite_handlers_run_in_sequence_and_once_per_run() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Rewrite the answer for clear structure", "well structured")
            .reply("Fact-check the answer", "checked"),
    );
    let engine = engine(provider.clone(), Arc::new(StaticRetriever::new(Vec::new())));
    let mut ctx = context_with(
        initial(),
        vec![CorrectiveAction::FactCheck, CorrectiveAction::SynthesizeBetter],
    );

    let attempt = engine.apply(&mut ctx).await;
    assert_eq!(attempt.answer.answer, "well structured");
    assert_eq!(attempt.answer.confidence, 0.5);
    assert!(attempt.failure.is_none());
    assert_eq!(
        ctx.correction_history,
        vec![CorrectiveAction::FactCheck, CorrectiveAction::SynthesizeBetter]
    );
    // The structure rewrite starts from the fact-checked text.
    let prompts = provider.prompts.lock().unwrap().clone();
    assert!(prompts[1].contains("Current answer:\nchecked"));

    let again = engine.apply(&mut ctx).await;
    assert!(again.applied.is_empty());
    assert_eq!(again.answer.answer, "initial");
    assert_eq!(provider.prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_retrieve_more_dedups_and_caps_confidence() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Rate how relevant", "0.9")
            .reply("Answer the question using only the sources", "broader answer"),
    );
    let retriever = Arc::new(StaticRetriever::new(vec![
        SourceChunk::new("1", "Notes", "text"),
        SourceChunk::new("7", "Copy", "text"),
        SourceChunk::new("8", "Fresh", "new material"),
    ]));
    let engine = engine(provider, retriever.clone());
    let mut start = initial();
    start.confidence = 0.3;
    start.sources[0].score = 0.5;
    let mut ctx = context_with(start, vec![CorrectiveAction::RetrieveMore]);

    let attempt = engine.apply(&mut ctx).await;

    let ids: Vec<&str> = attempt.answer.sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "8"]);
    assert_eq!(attempt.answer.answer, "broader answer");
    assert!((attempt.answer.confidence - 0.4).abs() < 1e-9);
    let request = retriever.requests.lock().unwrap()[0].clone();
    assert_eq!(request.top_k, 10);
    assert_eq!(request.exclude_ids, vec!["1".to_string()]);
}

#[tokio::test]
async fn test_validate_sources_drops_unreliable_and_falls_back() {
    let provider = Arc::new(KeywordProvider::new("validated answer"));
    let engine = engine(provider, Arc::new(StaticRetriever::new(Vec::new())));

    let mixed = RagAnswer::new(
        "q",
        "a",
        vec![
            SourceChunk::new("1", "Official guide", "x").with_score(0.8),
            SourceChunk::new("2", "Someone's blog", "y").with_score(0.8),
        ],
        0.5,
    );
    let mut ctx = context_with(mixed, vec![CorrectiveAction::ValidateSources]);
    let attempt = engine.apply(&mut ctx).await;
    assert_eq!(attempt.answer.sources.len(), 1);
    assert_eq!(attempt.answer.sources[0].id, "1");

    let blogs = RagAnswer::new(
        "q",
        "a",
        vec![
            SourceChunk::new("1", "Blog one", "x"),
            SourceChunk::new("2", "Forum thread", "y"),
        ],
        0.5,
    );
    let mut ctx = context_with(blogs, vec![CorrectiveAction::ValidateSources]);
    let attempt = engine.apply(&mut ctx).await;
    assert_eq!(attempt.answer.sources.len(), 2);
}

#[tokio::test]
async fn test_cross_reference_needs_two_sources() {
    let provider = Arc::new(KeywordProvider::new("reconciled"));
    let engine = engine(provider.clone(), Arc::new(StaticRetriever::new(Vec::new())));
    let mut ctx = context_with(initial(), vec![CorrectiveAction::CrossReference]);

    let attempt = engine.apply(&mut ctx).await;

    assert_eq!(attempt.answer.answer, "initial");
    assert_eq!(attempt.applied, vec![CorrectiveAction::CrossReference]);
    assert!(provider.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_failure_keeps_last_good_answer() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Rewrite the answer for clear structure", "tidy")
            .fail("Revise time-sensitive claims"),
    );
    let engine = engine(provider, Arc::new(StaticRetriever::new(Vec::new())));
    let mut ctx = context_with(
        initial(),
        vec![
            CorrectiveAction::SynthesizeBetter,
            CorrectiveAction::TemporalUpdate,
            CorrectiveAction::FactCheck,
        ],
    );

    let attempt = engine.apply(&mut ctx).await;

    assert_eq!(attempt.answer.answer, "tidy");
    assert_eq!(attempt.applied, vec![CorrectiveAction::SynthesizeBetter]);
    let failure = attempt.failure.unwrap();
    assert!(failure.contains("temporal_update"));
    assert_eq!(ctx.correction_history, vec![CorrectiveAction::SynthesizeBetter]);
}

#[tokio::test]
async fn test_temporal_update_rewrites_answer_as_of_today() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Revise time-sensitive claims", "As of today the 2.0 release is current."),
    );
    let engine = engine(provider.clone(), Arc::new(StaticRetriever::new(Vec::new())));
    let dated = RagAnswer::new(
        "q",
        "The 1.4 release is the latest.",
        vec![SourceChunk::new("1", "Release notes", "Published 2019.")],
        0.5,
    );
    let mut ctx = context_with(dated.clone(), vec![CorrectiveAction::TemporalUpdate]);

    let attempt = engine.apply(&mut ctx).await;

    assert!(attempt.failure.is_none());
    assert_eq!(attempt.applied, vec![CorrectiveAction::TemporalUpdate]);
    assert_eq!(attempt.answer.answer, "As of today the 2.0 release is current.");
    assert_eq!(attempt.answer.sources, dated.sources);
    assert_eq!(attempt.answer.confidence, 0.5);
    let prompts = provider.prompts.lock().unwrap().clone();
    let year = chrono::Utc::now().format("%Y").to_string();
    assert!(prompts[0].contains(&format!("Today is {year}-")));
    assert!(prompts[0].contains("Current answer:\nThe 1.4 release is the latest."));
}

// Full loop runs through the model-backed correction engine.

/// Scores answers in order, suggesting the paired actions; the last entry repeats.
struct PlannedJudge {
    plan: Mutex<VecDeque<(f64, Vec<CorrectiveAction>)>>,
}

impl PlannedJudge {
    fn new(plan: Vec<(f64, Vec<CorrectiveAction>)>) -> Self {
        Self {
            plan: Mutex::new(plan.into_iter().collect()),
        }
    }
}

#[async_trait]
impl QualityJudge for PlannedJudge {
    async fn assess(&self, query: &str, _answer: &RagAnswer) -> QualityAssessment {
        let mut plan = self.plan.lock().unwrap();
        let (score, actions) = if plan.len() > 1 {
            plan.pop_front().unwrap()
        } else {
            plan.front().cloned().unwrap()
        };
        let mut assessment = QualityAssessment::uniform(query, score);
        assessment.suggested_corrections = actions;
        assessment
    }
}

fn engine_loop(
    judge: PlannedJudge,
    provider: Arc<KeywordProvider>,
    retriever: Arc<StaticRetriever>,
) -> SelfCorrectionLoop {
    SelfCorrectionLoop::new(
        Arc::new(FixedSource(Some(initial()))),
        Arc::new(judge),
        Arc::new(engine(provider, retriever)),
        CorrectionConfig::default(),
    )
}

#[tokio::test]
async fn test_refine_query_answers_the_rewritten_query() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Rewrite this search query", "\"tokio work stealing scheduler\"")
            .reply("Rate how relevant", "0.9")
            .reply(
                "Answer the question using only the sources",
                "Idle workers steal queued tasks.",
            ),
    );
    let retriever = Arc::new(StaticRetriever::new(vec![SourceChunk::new(
        "9",
        "Scheduler guide",
        "Work stealing moves tasks between workers.",
    )]));
    let judge = PlannedJudge::new(vec![
        (0.5, vec![CorrectiveAction::RefineQuery]),
        (0.9, Vec::new()),
    ]);

    let result = engine_loop(judge, provider, retriever.clone()).run("q").await;

    assert_eq!(
        *retriever.queries.lock().unwrap(),
        vec!["tokio work stealing scheduler".to_string()]
    );
    assert_eq!(result.final_result.answer, "Idle workers steal queued tasks.");
    assert_eq!(result.final_result.query, "q");
    let ids: Vec<&str> = result.final_result.sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["9"]);
    assert!((result.final_result.confidence - 0.9).abs() < 1e-9);
    assert!((result.final_score - 0.9).abs() < 1e-9);
    assert_eq!(result.correction_iterations, 1);
    assert_eq!(result.corrections_applied, vec![CorrectiveAction::RefineQuery]);
    assert!(result
        .trail
        .iter()
        .any(|t| t.contains("applied [refine_query]") && t.ends_with(", adopted")));
}

#[tokio::test]
async fn test_temporal_update_is_adopted_when_it_scores_higher() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Revise time-sensitive claims", "Current as of this year."),
    );
    let judge = PlannedJudge::new(vec![
        (0.5, vec![CorrectiveAction::TemporalUpdate]),
        (0.8, Vec::new()),
    ]);

    let result = engine_loop(judge, provider, Arc::new(StaticRetriever::new(Vec::new())))
        .run("q")
        .await;

    assert_eq!(result.final_result.answer, "Current as of this year.");
    assert_eq!(result.corrections_applied, vec![CorrectiveAction::TemporalUpdate]);
    assert!((result.final_score - 0.8).abs() < 1e-9);
    let temporal = result.quality_assessment.score(QualityMetric::TemporalValidity);
    assert!(temporal > 0.5);
    assert!(result.trail.iter().any(|t| t.contains("applied [temporal_update]")));
}

#[tokio::test]
async fn test_handler_failure_mid_attempt_returns_best_answer() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Rewrite the answer for clear structure", "tidy")
            .reply("Fact-check the answer", "checked")
            .fail("Revise time-sensitive claims"),
    );
    let judge = PlannedJudge::new(vec![
        (0.5, vec![CorrectiveAction::SynthesizeBetter]),
        (
            0.6,
            vec![CorrectiveAction::FactCheck, CorrectiveAction::TemporalUpdate],
        ),
        (0.55, Vec::new()),
    ]);

    let result = engine_loop(judge, provider.clone(), Arc::new(StaticRetriever::new(Vec::new())))
        .run("q")
        .await;

    assert_eq!(result.correction_iterations, 2);
    assert_eq!(result.final_result.answer, "tidy");
    assert!((result.final_score - 0.6).abs() < 1e-9);
    assert!((result.quality_assessment.overall_score - 0.55).abs() < 1e-9);
    assert_eq!(
        result.corrections_applied,
        vec![CorrectiveAction::SynthesizeBetter, CorrectiveAction::FactCheck]
    );
    assert!(result
        .trail
        .iter()
        .any(|t| t.starts_with("iteration 2") && t.contains("temporal_update")));
    assert!(result.trail.iter().any(|t| t.contains("not adopted; stopping")));
    assert_eq!(provider.calls_matching("Revise time-sensitive claims"), 1);
}

#[tokio::test]
async fn test_generator_grades_with_bounded_concurrency() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Passage (Weak)", "0.1")
            .reply("Rate how relevant", "0.8")
            .reply("Answer the question using only the sources", "graded answer")
            .with_delay(Duration::from_millis(20)),
    );
    let chunks = (0..6)
        .map(|i| SourceChunk::new(i.to_string(), "Strong", format!("chunk {i}")))
        .chain(std::iter::once(SourceChunk::new("w", "Weak", "noise")))
        .collect();
    let config = CorrectionConfig {
        grading_concurrency: 2,
        retrieval_top_k: 10,
        ..CorrectionConfig::default()
    };
    let generator =
        AnswerGenerator::new(provider.clone(), Arc::new(StaticRetriever::new(chunks)), "m", &config);

    let answer = generator.generate("q").await.unwrap();

    assert_eq!(answer.sources.len(), 6);
    assert!(answer.sources.iter().all(|s| s.id != "w"));
    assert!((answer.confidence - 0.8).abs() < 1e-9);
    assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_generator_keeps_best_chunk_when_all_are_weak() {
    let provider = Arc::new(
        KeywordProvider::new("unused")
            .reply("Passage (A)", "0.2")
            .reply("Passage (B)", "0.1")
            .reply("Answer the question", "thin answer"),
    );
    let chunks = vec![SourceChunk::new("b", "B", "x"), SourceChunk::new("a", "A", "y")];
    let generator = AnswerGenerator::new(
        provider,
        Arc::new(StaticRetriever::new(chunks)),
        "m",
        &CorrectionConfig::default(),
    );

    let answer = generator.generate("q").await.unwrap();

    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].id, "a");
    assert!((answer.confidence - 0.2).abs() < 1e-9);
}
