#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use meridian_core::{
    AgentTask, AgentRole, InferenceProvider, InvokeParams, MeridianError, MeridianResult,
    ReasoningChain, ReasoningPattern, ThoughtType,
};
use meridian_reasoning::{ReasoningConfig, ReasoningEngine};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replies by step kind and focus line; optionally fails one step kind.
#[derive(Default)]
struct ScriptedProvider {
    fail_on: Option<&'static str>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    fn failing_on(step: &'static str) -> Self {
        Self {
            fail_on: Some(step),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        _params: &InvokeParams,
    ) -> MeridianResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let step = prompt
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches("STEP: ")
            .to_lowercase();
        if self.fail_on == Some(step.as_str()) || self.fail_on == Some("*") {
            return Err(MeridianError::InferenceProvider("scripted outage".into()));
        }
        let focus = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Focus: "))
            .unwrap_or("");
        let confidence = match step.as_str() {
            "analysis" if focus.contains("approach 2 of") => 0.9,
            "analysis" if focus.starts_with("refinement 1") => 0.6,
            "analysis" if focus.starts_with("refinement 2") => 0.95,
            "analysis" => 0.5,
            _ => 0.7,
        };
        let content = format!("{step} by {model} [{focus}]");
        Ok(json!({ "content": content, "confidence": confidence }).to_string())
    }
}

fn task() -> AgentTask {
    AgentTask::new(
        "t1",
        AgentRole::Analyst,
        json!({"description": "Why is the sky blue?"}),
    )
}

fn config() -> ReasoningConfig {
    ReasoningConfig::default().with_primary_model("primary")
}

async fn reason(
    provider: Arc<ScriptedProvider>,
    pattern: ReasoningPattern,
    config: &ReasoningConfig,
) -> ReasoningChain {
    ReasoningEngine::new(provider)
        .reason(&task(), "optics notes", pattern, config)
        .await
}

fn kinds(chain: &ReasoningChain) -> Vec<ThoughtType> {
    chain.thoughts().iter().map(|t| t.thought_type).collect()
}

#[tokio::test]
async fn test_linear_single_analysis() {
    let chain = reason(Arc::default(), ReasoningPattern::Linear, &config()).await;
    assert_eq!(kinds(&chain), vec![ThoughtType::Analysis]);
    assert_eq!(chain.final_decision(), Some("analysis by primary []"));
    assert!(chain.is_completed());
    assert!((chain.confidence_score() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_chain_of_thought_links_each_step() {
    let chain = reason(Arc::default(), ReasoningPattern::ChainOfThought, &config()).await;
    assert_eq!(
        kinds(&chain),
        vec![
            ThoughtType::Observation,
            ThoughtType::Hypothesis,
            ThoughtType::Analysis,
            ThoughtType::Synthesis
        ]
    );
    let thoughts: Vec<_> = chain.thoughts().iter().collect();
    assert!(thoughts[0].parent_id.is_none());
    for pair in thoughts.windows(2) {
        assert_eq!(pair[1].parent_id.as_deref(), Some(pair[0].id.as_str()));
    }
    assert_eq!(chain.final_decision(), Some(thoughts[3].content.as_str()));
}

#[tokio::test]
async fn test_chain_of_thought_optional_critique() {
    let mut config = config();
    config.include_critique = true;
    let chain = reason(Arc::default(), ReasoningPattern::ChainOfThought, &config).await;
    assert_eq!(chain.thoughts().len(), 5);
    assert_eq!(kinds(&chain)[3], ThoughtType::Critique);
}

#[tokio::test]
async fn test_tree_of_thought_selects_most_confident_branch() {
    let chain = reason(Arc::default(), ReasoningPattern::TreeOfThought, &config()).await;
    assert_eq!(chain.thoughts().len(), 8);

    let root = chain.thoughts().iter().next().unwrap();
    assert_eq!(root.thought_type, ThoughtType::Observation);
    assert_eq!(root.children_ids.len(), 3);

    let synthesis = chain.thoughts().last().unwrap();
    assert_eq!(synthesis.thought_type, ThoughtType::Synthesis);
    let parent = chain.thought(synthesis.parent_id.as_deref().unwrap()).unwrap();
    assert_eq!(parent.thought_type, ThoughtType::Analysis);
    assert!((parent.confidence - 0.9).abs() < 1e-9);
    assert!(parent.content.contains("approach 2 of 3"));
    assert_eq!(chain.final_decision(), Some(synthesis.content.as_str()));
}

#[tokio::test]
async fn test_multi_perspective_uses_distinct_models() {
    let config = config().with_perspectives(["model-a", "model-b", "model-a"]);
    let chain = reason(Arc::default(), ReasoningPattern::MultiPerspective, &config).await;
    let analyses: Vec<_> = chain
        .thoughts()
        .iter()
        .filter(|t| t.thought_type == ThoughtType::Analysis)
        .collect();
    assert_eq!(analyses.len(), 2);
    assert!(analyses.iter().all(|t| t.parent_id.is_none()));
    assert!(chain.models_used().contains(&"model-a".to_string()));
    assert!(chain.models_used().contains(&"model-b".to_string()));
    assert_eq!(
        chain.thoughts().last().unwrap().thought_type,
        ThoughtType::Synthesis
    );
}

#[tokio::test]
async fn test_perspectives_run_concurrently() {
    let provider = Arc::new(ScriptedProvider::slow(Duration::from_millis(30)));
    let config = config().with_perspectives(["a", "b", "c"]);
    let _ = reason(provider.clone(), ReasoningPattern::MultiPerspective, &config).await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    assert!(provider.max_in_flight.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_critique_and_refine_stops_above_threshold() {
    let chain = reason(Arc::default(), ReasoningPattern::CritiqueAndRefine, &config()).await;
    // initial analysis, then two critique/refine rounds
    assert_eq!(
        kinds(&chain),
        vec![
            ThoughtType::Analysis,
            ThoughtType::Critique,
            ThoughtType::Analysis,
            ThoughtType::Critique,
            ThoughtType::Analysis
        ]
    );
    let last = chain.thoughts().last().unwrap();
    let critique = chain.thought(last.parent_id.as_deref().unwrap()).unwrap();
    assert_eq!(critique.thought_type, ThoughtType::Critique);
    assert_eq!(chain.final_decision(), Some("analysis by primary [refinement 2 of 3]"));
}

#[tokio::test]
async fn test_critique_and_refine_respects_round_cap() {
    let mut config = config();
    config.refine_threshold = 0.99;
    let chain = reason(Arc::default(), ReasoningPattern::CritiqueAndRefine, &config).await;
    assert_eq!(chain.thoughts().len(), 1 + 2 * 3);
}

#[tokio::test]
async fn test_ensemble_merges_both_sub_chains() {
    let chain = reason(Arc::default(), ReasoningPattern::Ensemble, &config()).await;
    // four chain-of-thought steps, one perspective plus its synthesis, final synthesis
    assert_eq!(chain.thoughts().len(), 7);
    assert_eq!(chain.pattern(), ReasoningPattern::Ensemble);
    let syntheses = chain
        .thoughts()
        .iter()
        .filter(|t| t.thought_type == ThoughtType::Synthesis)
        .count();
    assert_eq!(syntheses, 3);
    assert!(chain.final_decision().unwrap().starts_with("synthesis"));
}

#[tokio::test]
async fn test_failed_step_degrades_instead_of_aborting() {
    let provider = Arc::new(ScriptedProvider::failing_on("hypothesis"));
    let chain = reason(provider, ReasoningPattern::ChainOfThought, &config()).await;
    assert_eq!(chain.thoughts().len(), 4);
    let hypothesis = chain.thoughts().iter().nth(1).unwrap();
    assert!(hypothesis.is_error);
    assert_eq!(hypothesis.confidence, 0.0);
    assert!(hypothesis.content.contains("scripted outage"));
    assert!(chain.final_decision().is_some());
}

#[tokio::test]
async fn test_total_outage_yields_zero_confidence_chain() {
    let provider = Arc::new(ScriptedProvider::failing_on("*"));
    let chain = reason(provider, ReasoningPattern::TreeOfThought, &config()).await;
    assert!(chain.is_completed());
    assert_eq!(chain.confidence_score(), 0.0);
    assert!(chain.final_decision().is_none());
    assert!(chain.thoughts().iter().all(|t| t.is_error));
}
