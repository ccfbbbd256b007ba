//! Contracts of the collaborators the engine consumes but does not implement.

use crate::answer::SourceChunk;
use crate::error::MeridianResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generation parameters passed with every inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeParams {
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for InvokeParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            system_prompt: None,
        }
    }
}

impl InvokeParams {
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// A text-in, text-out language model endpoint.
///
/// Implementations hide every provider-specific response shape; callers
/// never branch on which model produced a reply. Timeouts are enforced here
/// and reported as errors.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn invoke(&self, model: &str, prompt: &str, params: &InvokeParams)
        -> MeridianResult<String>;
}

/// Extra retrieval inputs beyond the query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    /// Maximum number of chunks to return.
    pub top_k: usize,
    /// Chunk ids the caller already holds.
    #[serde(default)]
    pub exclude_ids: Vec<String>,
}

impl RetrievalContext {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            exclude_ids: Vec::new(),
        }
    }
}

/// Source of scored chunks for a query.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    async fn retrieve(
        &self,
        sub_query: &str,
        context: &RetrievalContext,
    ) -> MeridianResult<Vec<SourceChunk>>;
}

/// Summary of a completed run, reported to the experience store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExperienceEvent {
    TaskGraphCompleted {
        run_id: String,
        task_count: usize,
        succeeded: usize,
        failed: usize,
        overall_success: bool,
        average_confidence: f64,
        duration_ms: u64,
        recorded_at: DateTime<Utc>,
    },
    CorrectionLoopCompleted {
        query: String,
        iterations: u32,
        corrections_applied: Vec<String>,
        final_score: f64,
        improvement_score: f64,
        duration_ms: u64,
        recorded_at: DateTime<Utc>,
    },
}

/// Sink for run summaries. Callers ignore its failures beyond logging them.
#[async_trait]
pub trait ExperienceStore: Send + Sync {
    async fn record(&self, event: ExperienceEvent) -> MeridianResult<()>;
}
