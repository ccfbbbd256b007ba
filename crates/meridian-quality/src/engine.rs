use crate::assessor::chunk_reliability;
use crate::context::{CorrectionAttempt, CorrectionContext};
use crate::generator::AnswerGenerator;
use crate::metric::CorrectiveAction;
use async_trait::async_trait;
use chrono::Utc;
use meridian_core::{
    clamp_unit, InferenceProvider, InvokeParams, MeridianError, MeridianResult, RagAnswer,
    RetrievalContext, SourceChunk,
};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Largest confidence gain `retrieve_more` may claim.
pub const RETRIEVE_MORE_CONFIDENCE_CAP: f64 = 0.1;
/// Sources below this reliability are dropped by `validate_sources`.
pub const RELIABILITY_FLOOR: f64 = 0.5;

/// Applies corrective actions to an answer.
///
/// [`CorrectionEngine`] is the model-backed implementation.
#[async_trait]
pub trait Corrector: Send + Sync {
    /// Run every pending action of `context` in order, recording each
    /// completed one in its history.
    async fn apply(&self, context: &mut CorrectionContext) -> CorrectionAttempt;
}

/// Runs corrective action handlers in sequence, each starting from the
/// previous handler's answer.
pub struct CorrectionEngine {
    provider: Arc<dyn InferenceProvider>,
    generator: Arc<AnswerGenerator>,
    model: String,
    broadened_top_k: usize,
}

impl CorrectionEngine {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        generator: Arc<AnswerGenerator>,
        model: impl Into<String>,
        broadened_top_k: usize,
    ) -> Self {
        Self {
            provider,
            generator,
            model: model.into(),
            broadened_top_k,
        }
    }

    async fn handle(
        &self,
        action: CorrectiveAction,
        query: &str,
        answer: &RagAnswer,
    ) -> MeridianResult<RagAnswer> {
        match action {
            CorrectiveAction::RetrieveMore => self.retrieve_more(query, answer).await,
            CorrectiveAction::RefineQuery => self.refine_query(query).await,
            CorrectiveAction::ValidateSources => self.validate_sources(query, answer).await,
            CorrectiveAction::CrossReference => self.cross_reference(query, answer).await,
            CorrectiveAction::FactCheck => {
                self.rewrite(
                    "Fact-check the answer against the sources. Remove claims the sources do not support and mark uncertain claims with a short caveat.",
                    query,
                    answer,
                )
                .await
            }
            CorrectiveAction::SynthesizeBetter => {
                self.rewrite(
                    "Rewrite the answer for clear structure and flow. Do not add, remove or change any fact.",
                    query,
                    answer,
                )
                .await
            }
            CorrectiveAction::TemporalUpdate => {
                let today = Utc::now().format("%Y-%m-%d");
                let instruction = format!(
                    "Today is {today}. Revise time-sensitive claims so they are correct as of today, and say when a source may be out of date."
                );
                self.rewrite(&instruction, query, answer).await
            }
        }
    }

    /// Broaden retrieval, merge new chunks without duplicates and re-synthesize.
    async fn retrieve_more(&self, query: &str, answer: &RagAnswer) -> MeridianResult<RagAnswer> {
        let context = RetrievalContext {
            top_k: self.broadened_top_k,
            exclude_ids: answer.sources.iter().map(|s| s.id.clone()).collect(),
        };
        let extra = self.generator.retriever().retrieve(query, &context).await?;
        let extra = self.generator.filter_chunks(query, extra).await;
        let before = answer.sources.len();
        let merged = dedup_sources(answer.sources.iter().cloned().chain(extra));
        info!(before, after = merged.len(), "Broadened retrieval");

        let mut improved = self.generator.synthesize(query, merged).await?;
        improved.confidence = clamp_unit(
            improved
                .confidence
                .min(answer.confidence + RETRIEVE_MORE_CONFIDENCE_CAP),
        );
        Ok(improved)
    }

    /// Rewrite the query and answer it again from scratch.
    async fn refine_query(&self, query: &str) -> MeridianResult<RagAnswer> {
        let prompt = format!(
            "Rewrite this search query so it is specific and unambiguous. Reply with the query only.\n\nQuery: {query}"
        );
        let rewritten = self.invoke(&prompt).await?;
        let rewritten = rewritten.trim().trim_matches('"');
        info!(original = %query, refined = %rewritten, "Refined query");
        let mut answer = self.generator.generate(rewritten).await?;
        answer.query = query.to_string();
        Ok(answer)
    }

    /// Keep only reliable sources, falling back to all of them when none qualify.
    async fn validate_sources(&self, query: &str, answer: &RagAnswer) -> MeridianResult<RagAnswer> {
        let reliable: Vec<SourceChunk> = answer
            .sources
            .iter()
            .filter(|s| chunk_reliability(s) >= RELIABILITY_FLOOR)
            .cloned()
            .collect();
        let kept = if reliable.is_empty() {
            answer.sources.clone()
        } else {
            reliable
        };
        info!(before = answer.sources.len(), after = kept.len(), "Validated sources");
        self.generator.synthesize(query, kept).await
    }

    async fn cross_reference(&self, query: &str, answer: &RagAnswer) -> MeridianResult<RagAnswer> {
        if answer.sources.len() < 2 {
            return Ok(answer.clone());
        }
        self.rewrite(
            "Compare the sources with each other. Where they conflict, reconcile them into one consistent answer and say which source each disputed claim rests on.",
            query,
            answer,
        )
        .await
    }

    /// Ask for a revised answer text; sources and confidence are kept.
    async fn rewrite(
        &self,
        instruction: &str,
        query: &str,
        answer: &RagAnswer,
    ) -> MeridianResult<RagAnswer> {
        let prompt = format!(
            "{instruction}\n\nQuestion: {query}\n\nCurrent answer:\n{}\n\nSources:\n{}\n\nReply with the revised answer only.",
            answer.answer,
            answer.render_sources()
        );
        let text = self.invoke(&prompt).await?;
        let mut revised = answer.clone();
        revised.answer = text.trim().to_string();
        Ok(revised)
    }

    async fn invoke(&self, prompt: &str) -> MeridianResult<String> {
        let reply = self
            .provider
            .invoke(&self.model, prompt, &InvokeParams::new(1024, 0.3))
            .await?;
        if reply.trim().is_empty() {
            return Err(MeridianError::Generation("empty reply".into()));
        }
        Ok(reply)
    }
}

#[async_trait]
impl Corrector for CorrectionEngine {
    async fn apply(&self, context: &mut CorrectionContext) -> CorrectionAttempt {
        let pending = context.pending_actions();
        if pending.is_empty() {
            info!(iteration = context.iteration, "No new corrective action to apply");
            return CorrectionAttempt::unchanged(context.original_result.clone());
        }

        let mut attempt = CorrectionAttempt::unchanged(context.original_result.clone());
        for action in pending {
            let outcome = self
                .handle(action, &context.original_query, &attempt.answer)
                .await;
            match outcome {
                Ok(answer) => {
                    info!(
                        action = %action,
                        iteration = context.iteration,
                        confidence = answer.confidence,
                        "Applied corrective action"
                    );
                    attempt.answer = answer;
                    attempt.applied.push(action);
                    context.correction_history.push(action);
                }
                Err(e) => {
                    let failure = MeridianError::CorrectionHandler {
                        action: action.to_string(),
                        message: e.to_string(),
                    };
                    error!(action = %action, error = %failure, "Corrective action failed");
                    attempt.failure = Some(failure.to_string());
                    break;
                }
            }
        }
        attempt
    }
}

/// Hex SHA-256 of a chunk's trimmed content.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.trim().as_bytes()))
}

/// Drop chunks whose content repeats an earlier one, keeping first occurrences.
pub fn dedup_sources(sources: impl IntoIterator<Item = SourceChunk>) -> Vec<SourceChunk> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(content_hash(&s.content)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_sources_by_content() {
        let sources = vec![
            SourceChunk::new("1", "a", "same text"),
            SourceChunk::new("2", "b", "other"),
            SourceChunk::new("3", "c", "  same text\n"),
        ];
        let kept = dedup_sources(sources);
        let ids: Vec<&str> = kept.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(content_hash("x").len(), 64);
        assert_eq!(content_hash("x"), content_hash(" x "));
    }
}
