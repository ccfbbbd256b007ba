use crate::config::ReasoningConfig;
use crate::prompts::StepRequest;
use futures_util::future::join_all;
use meridian_core::{
    AgentTask, InferenceProvider, MeridianError, MeridianResult, ParseOutcome, ReasoningChain,
    ReasoningPattern, Thought, ThoughtType,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives one reasoning pattern for a single task.
///
/// Every step is one call into the inference provider. A failed call yields an
/// error thought instead of aborting the chain, so [`ReasoningEngine::reason`]
/// always returns a completed chain.
pub struct ReasoningEngine {
    provider: Arc<dyn InferenceProvider>,
}

/// Inputs shared by every step of one chain.
#[derive(Clone, Copy)]
struct Scope<'a> {
    task: &'a str,
    context: &'a str,
    config: &'a ReasoningConfig,
}

impl<'a> Scope<'a> {
    fn step(&self, kind: ThoughtType) -> StepRequest<'a> {
        StepRequest::new(kind, self.task, self.context)
    }

    fn model(&self) -> &'a str {
        &self.config.primary_model
    }
}

impl ReasoningEngine {
    pub fn new(provider: Arc<dyn InferenceProvider>) -> Self {
        Self { provider }
    }

    /// Build a completed reasoning chain for `task` with the given pattern.
    pub async fn reason(
        &self,
        task: &AgentTask,
        context: &str,
        pattern: ReasoningPattern,
        config: &ReasoningConfig,
    ) -> ReasoningChain {
        let start = Instant::now();
        let instruction = task.instruction();
        let scope = Scope {
            task: &instruction,
            context,
            config,
        };

        info!(task_id = %task.id, pattern = %pattern, "Reasoning started");

        let mut chain = ReasoningChain::new(task.id.clone(), pattern);
        let outcome = match pattern {
            ReasoningPattern::Linear => self.linear(&mut chain, scope).await,
            ReasoningPattern::ChainOfThought => self.chain_of_thought(&mut chain, scope).await,
            ReasoningPattern::TreeOfThought => self.tree_of_thought(&mut chain, scope).await,
            ReasoningPattern::MultiPerspective => self.multi_perspective(&mut chain, scope).await,
            ReasoningPattern::CritiqueAndRefine => {
                self.critique_and_refine(&mut chain, scope).await
            }
            ReasoningPattern::Ensemble => self.ensemble(&mut chain, scope).await,
        };
        let chain = seal(chain, outcome, start);

        info!(
            task_id = %task.id,
            pattern = %pattern,
            thoughts = chain.thoughts().len(),
            confidence = chain.confidence_score(),
            duration_ms = chain.total_time().as_millis() as u64,
            "Reasoning complete"
        );
        chain
    }

    /// Generate one thought. Never fails: errors become error thoughts.
    async fn think(
        &self,
        request: StepRequest<'_>,
        model: &str,
        config: &ReasoningConfig,
    ) -> Thought {
        let kind = request.kind;
        let prompt = request.render();
        match self.provider.invoke(model, &prompt, &config.params()).await {
            Ok(reply) => {
                let thought = parse_thought(kind, &reply, model, config.fallback_confidence);
                debug!(step = %kind, model = %model, confidence = thought.confidence, "Thought generated");
                thought
            }
            Err(e) => {
                warn!(step = %kind, model = %model, error = %e, "Thought generation failed");
                Thought::error(kind, MeridianError::Generation(e.to_string()), model)
            }
        }
    }

    async fn linear(
        &self,
        chain: &mut ReasoningChain,
        scope: Scope<'_>,
    ) -> MeridianResult<Option<String>> {
        let analysis = self
            .think(scope.step(ThoughtType::Analysis), scope.model(), scope.config)
            .await;
        let decision = decision_of(&analysis);
        chain.add_thought(analysis, None)?;
        Ok(decision)
    }

    async fn chain_of_thought(
        &self,
        chain: &mut ReasoningChain,
        scope: Scope<'_>,
    ) -> MeridianResult<Option<String>> {
        let mut steps = vec![
            ThoughtType::Observation,
            ThoughtType::Hypothesis,
            ThoughtType::Analysis,
        ];
        if scope.config.include_critique {
            steps.push(ThoughtType::Critique);
        }
        steps.push(ThoughtType::Synthesis);

        let mut parent: Option<String> = None;
        let mut decision = None;
        for kind in steps {
            let thought = {
                let prior: Vec<&Thought> = chain.thoughts().iter().collect();
                self.think(scope.step(kind).after(prior), scope.model(), scope.config)
                    .await
            };
            decision = decision_of(&thought);
            parent = Some(chain.add_thought(thought, parent.as_deref())?);
        }
        Ok(decision)
    }

    async fn tree_of_thought(
        &self,
        chain: &mut ReasoningChain,
        scope: Scope<'_>,
    ) -> MeridianResult<Option<String>> {
        let model = scope.model();
        let observation = self
            .think(scope.step(ThoughtType::Observation), model, scope.config)
            .await;

        let branches = scope.config.tree_branches.max(1);
        let grown = join_all((0..branches).map(|i| {
            let observation = &observation;
            async move {
                let focus = format!("approach {} of {}", i + 1, branches);
                let hypothesis = self
                    .think(
                        scope
                            .step(ThoughtType::Hypothesis)
                            .after([observation])
                            .focus(focus.clone()),
                        model,
                        scope.config,
                    )
                    .await;
                let analysis = self
                    .think(
                        scope
                            .step(ThoughtType::Analysis)
                            .after([observation, &hypothesis])
                            .focus(focus),
                        model,
                        scope.config,
                    )
                    .await;
                (hypothesis, analysis)
            }
        }))
        .await;

        let root = chain.add_thought(observation, None)?;
        let mut best: Option<(String, f64)> = None;
        for (hypothesis, analysis) in grown {
            let confidence = analysis.confidence;
            let hypothesis_id = chain.add_thought(hypothesis, Some(&root))?;
            let analysis_id = chain.add_thought(analysis, Some(&hypothesis_id))?;
            if best.as_ref().map_or(true, |(_, c)| confidence > *c) {
                best = Some((analysis_id, confidence));
            }
        }
        let Some((best_id, best_confidence)) = best else {
            return Ok(None);
        };
        debug!(branch = %best_id, confidence = best_confidence, "Selected best branch");

        let synthesis = {
            let analysis = chain.thought(&best_id);
            let hypothesis = analysis
                .and_then(|a| a.parent_id.as_deref())
                .and_then(|h| chain.thought(h));
            let prior: Vec<&Thought> = chain
                .thought(&root)
                .into_iter()
                .chain(hypothesis)
                .chain(analysis)
                .collect();
            self.think(scope.step(ThoughtType::Synthesis).after(prior), model, scope.config)
                .await
        };
        let decision = decision_of(&synthesis);
        chain.add_thought(synthesis, Some(&best_id))?;
        Ok(decision)
    }

    async fn multi_perspective(
        &self,
        chain: &mut ReasoningChain,
        scope: Scope<'_>,
    ) -> MeridianResult<Option<String>> {
        let models = scope.config.perspectives();
        let analyses = join_all(models.iter().map(|model| {
            self.think(
                scope
                    .step(ThoughtType::Analysis)
                    .focus(format!("independent perspective of {model}")),
                model,
                scope.config,
            )
        }))
        .await;

        let mut ids = Vec::with_capacity(analyses.len());
        for analysis in analyses {
            ids.push(chain.add_thought(analysis, None)?);
        }

        let synthesis = {
            let prior: Vec<&Thought> = ids.iter().filter_map(|id| chain.thought(id)).collect();
            self.think(
                scope
                    .step(ThoughtType::Synthesis)
                    .after(prior)
                    .focus("merge the perspectives"),
                scope.model(),
                scope.config,
            )
            .await
        };
        let decision = decision_of(&synthesis);
        chain.add_thought(synthesis, None)?;
        Ok(decision)
    }

    async fn critique_and_refine(
        &self,
        chain: &mut ReasoningChain,
        scope: Scope<'_>,
    ) -> MeridianResult<Option<String>> {
        let model = scope.model();
        let initial = self
            .think(scope.step(ThoughtType::Analysis), model, scope.config)
            .await;
        let mut decision = decision_of(&initial);
        let mut current = chain.add_thought(initial, None)?;

        let rounds = scope.config.max_refinements;
        for round in 1..=rounds {
            let critique = self
                .think(
                    scope
                        .step(ThoughtType::Critique)
                        .after(chain.thought(&current)),
                    model,
                    scope.config,
                )
                .await;
            let critique_id = chain.add_thought(critique, Some(&current))?;

            let refined = {
                let prior = chain
                    .thought(&current)
                    .into_iter()
                    .chain(chain.thought(&critique_id));
                self.think(
                    scope
                        .step(ThoughtType::Analysis)
                        .after(prior)
                        .focus(format!("refinement {round} of {rounds}")),
                    model,
                    scope.config,
                )
                .await
            };
            let confidence = refined.confidence;
            if let Some(text) = decision_of(&refined) {
                decision = Some(text);
            }
            current = chain.add_thought(refined, Some(&critique_id))?;

            if confidence > scope.config.refine_threshold {
                debug!(round, confidence, "Refinement cleared threshold");
                break;
            }
        }
        Ok(decision)
    }

    async fn ensemble(
        &self,
        chain: &mut ReasoningChain,
        scope: Scope<'_>,
    ) -> MeridianResult<Option<String>> {
        let task_id = chain.task_id().to_string();

        let cot = async {
            let start = Instant::now();
            let mut sub = ReasoningChain::new(task_id.as_str(), ReasoningPattern::ChainOfThought);
            let outcome = self.chain_of_thought(&mut sub, scope).await;
            seal(sub, outcome, start)
        };
        let perspectives = async {
            let start = Instant::now();
            let mut sub = ReasoningChain::new(task_id.as_str(), ReasoningPattern::MultiPerspective);
            let outcome = self.multi_perspective(&mut sub, scope).await;
            seal(sub, outcome, start)
        };
        let (cot, perspectives) = tokio::join!(cot, perspectives);

        let conclusions: Vec<String> = [&cot, &perspectives]
            .iter()
            .filter_map(|sub| sub.thoughts().last().map(|t| t.id.clone()))
            .collect();
        chain.absorb(cot)?;
        chain.absorb(perspectives)?;

        let synthesis = {
            let prior: Vec<&Thought> = conclusions
                .iter()
                .filter_map(|id| chain.thought(id))
                .collect();
            self.think(
                scope
                    .step(ThoughtType::Synthesis)
                    .after(prior)
                    .focus("combine the step-by-step and multi-perspective conclusions"),
                scope.model(),
                scope.config,
            )
            .await
        };
        let decision = decision_of(&synthesis);
        chain.add_thought(synthesis, None)?;
        Ok(decision)
    }
}

/// Complete a chain, logging a structural failure instead of returning it.
fn seal(
    chain: ReasoningChain,
    outcome: MeridianResult<Option<String>>,
    start: Instant,
) -> ReasoningChain {
    let decision = match outcome {
        Ok(decision) => decision,
        Err(e) => {
            warn!(task_id = %chain.task_id(), error = %e, "Reasoning chain stopped early");
            chain
                .thoughts()
                .iter()
                .rev()
                .find(|t| !t.is_error)
                .map(|t| t.content.clone())
        }
    };
    chain.complete(decision, start.elapsed())
}

/// Error thoughts never become a decision.
fn decision_of(thought: &Thought) -> Option<String> {
    (!thought.is_error).then(|| thought.content.clone())
}

/// Turn a model reply into a thought.
///
/// Expects `{"content": ..., "confidence": ...}`; anything else is taken as
/// plain content with the fallback confidence.
pub(crate) fn parse_thought(
    kind: ThoughtType,
    reply: &str,
    model: &str,
    fallback_confidence: f64,
) -> Thought {
    let text = reply.trim();
    if text.is_empty() {
        return Thought::error(
            kind,
            MeridianError::Generation("empty reply".to_string()),
            model,
        );
    }
    let outcome = ParseOutcome::json_object(text, serde_json::json!({ "content": text }));
    let content = outcome
        .str_field("content")
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(text)
        .to_string();
    let confidence = outcome
        .unit_field("confidence")
        .unwrap_or(fallback_confidence);
    Thought::new(kind, content, confidence, model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thought_json() {
        let t = parse_thought(
            ThoughtType::Analysis,
            r#"{"content": "it holds", "confidence": 0.9}"#,
            "m",
            0.5,
        );
        assert_eq!(t.content, "it holds");
        assert!((t.confidence - 0.9).abs() < 1e-9);
        assert!(!t.is_error);
    }

    #[test]
    fn test_parse_thought_plain_text_uses_fallback() {
        let t = parse_thought(ThoughtType::Hypothesis, "  maybe gravity  ", "m", 0.5);
        assert_eq!(t.content, "maybe gravity");
        assert!((t.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_thought_empty_reply_is_error() {
        let t = parse_thought(ThoughtType::Synthesis, "   ", "m", 0.5);
        assert!(t.is_error);
        assert_eq!(t.confidence, 0.0);
    }

    #[test]
    fn test_parse_thought_json_without_content_keeps_raw() {
        let t = parse_thought(ThoughtType::Analysis, r#"{"confidence": 2}"#, "m", 0.5);
        assert_eq!(t.content, r#"{"confidence": 2}"#);
        assert_eq!(t.confidence, 1.0);
    }

    #[test]
    fn test_error_thought_has_no_decision() {
        let t = Thought::error(ThoughtType::Analysis, "down", "m");
        assert!(decision_of(&t).is_none());
        let ok = Thought::new(ThoughtType::Analysis, "fine", 0.4, "m");
        assert_eq!(decision_of(&ok).as_deref(), Some("fine"));
    }
}
