use crate::config::CorrectionConfig;
use async_trait::async_trait;
use meridian_core::{
    clamp_unit, extract_score, render_sources, AdmissionLimiter, InferenceProvider, InvokeParams,
    MeridianError, MeridianResult, RagAnswer, RetrievalContext, RetrievalProvider, SourceChunk,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the initial answer that enters the self-correction loop.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn answer(&self, query: &str) -> MeridianResult<RagAnswer>;
}

/// Retrieve, grade and synthesize.
///
/// Retrieved chunks are graded for relevance by the inference provider, at
/// most `grading_concurrency` at a time. Chunks under `min_chunk_relevance`
/// are dropped, keeping the best one when all fall short. The synthesized
/// answer's confidence is the mean grade of the chunks it was built from.
pub struct AnswerGenerator {
    provider: Arc<dyn InferenceProvider>,
    retriever: Arc<dyn RetrievalProvider>,
    model: String,
    limiter: AdmissionLimiter,
    top_k: usize,
    min_chunk_relevance: f64,
}

impl AnswerGenerator {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        retriever: Arc<dyn RetrievalProvider>,
        model: impl Into<String>,
        config: &CorrectionConfig,
    ) -> Self {
        Self {
            provider,
            retriever,
            model: model.into(),
            limiter: AdmissionLimiter::new(config.grading_concurrency),
            top_k: config.retrieval_top_k,
            min_chunk_relevance: config.min_chunk_relevance,
        }
    }

    pub fn retriever(&self) -> &Arc<dyn RetrievalProvider> {
        &self.retriever
    }

    /// Full pipeline for `query`.
    pub async fn generate(&self, query: &str) -> MeridianResult<RagAnswer> {
        let chunks = self
            .retriever
            .retrieve(query, &RetrievalContext::top_k(self.top_k))
            .await?;
        info!(query = %query, retrieved = chunks.len(), "Retrieved chunks");
        let kept = self.filter_chunks(query, chunks).await;
        self.synthesize(query, kept).await
    }

    /// Grade every chunk against `query`, replacing its score with the grade.
    ///
    /// A grading call that fails or returns no number keeps the retrieval score.
    pub async fn grade_chunks(&self, query: &str, chunks: Vec<SourceChunk>) -> Vec<SourceChunk> {
        let params = InvokeParams::new(64, 0.0);
        let graded = chunks.into_iter().map(|chunk| {
            let params = &params;
            self.limiter.run(async move {
                let prompt = format!(
                    "Rate how relevant this passage is to the question.\n\nQuestion: {query}\n\nPassage ({}):\n{}\n\nReply with a single number between 0 and 1.",
                    chunk.title, chunk.content
                );
                match self.provider.invoke(&self.model, &prompt, params).await {
                    Ok(reply) => match extract_score(&reply) {
                        Some(grade) => chunk.with_score(grade),
                        None => {
                            debug!(chunk_id = %chunk.id, "Ungradable reply, keeping retrieval score");
                            chunk
                        }
                    },
                    Err(e) => {
                        warn!(chunk_id = %chunk.id, error = %e, "Chunk grading failed");
                        chunk
                    }
                }
            })
        });
        futures_util::future::join_all(graded).await
    }

    /// Grade `chunks` and keep the relevant ones, best first.
    pub async fn filter_chunks(&self, query: &str, chunks: Vec<SourceChunk>) -> Vec<SourceChunk> {
        if chunks.is_empty() {
            return chunks;
        }
        let mut graded = self.grade_chunks(query, chunks).await;
        graded.sort_by(|a, b| b.score.total_cmp(&a.score));

        let total = graded.len();
        let best = graded.first().cloned();
        let kept: Vec<SourceChunk> = graded
            .into_iter()
            .filter(|c| c.score >= self.min_chunk_relevance)
            .collect();
        info!(total, kept = kept.len(), "Graded chunks");
        match (kept.is_empty(), best) {
            (true, Some(best)) => vec![best],
            _ => kept,
        }
    }

    /// Write an answer to `query` from `sources`.
    pub async fn synthesize(&self, query: &str, sources: Vec<SourceChunk>) -> MeridianResult<RagAnswer> {
        let context = if sources.is_empty() {
            "(no sources found)".to_string()
        } else {
            render_sources(&sources)
        };
        let prompt = format!(
            "Answer the question using only the sources below. Cite sources as [n].\n\nQuestion: {query}\n\nSources:\n{context}"
        );
        let text = self
            .provider
            .invoke(&self.model, &prompt, &InvokeParams::new(1024, 0.3))
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(MeridianError::Generation("empty synthesis reply".into()));
        }
        let confidence = mean_score(&sources);
        Ok(RagAnswer::new(query, text, sources, confidence))
    }
}

#[async_trait]
impl AnswerSource for AnswerGenerator {
    async fn answer(&self, query: &str) -> MeridianResult<RagAnswer> {
        self.generate(query).await
    }
}

/// Mean score of `sources`, 0 when there are none.
pub fn mean_score(sources: &[SourceChunk]) -> f64 {
    if sources.is_empty() {
        return 0.0;
    }
    clamp_unit(sources.iter().map(|s| s.score).sum::<f64>() / sources.len() as f64)
}
