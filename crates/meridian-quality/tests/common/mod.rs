//! Scripted collaborators shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use meridian_core::{
    InferenceProvider, InvokeParams, MeridianError, MeridianResult, RetrievalContext,
    RetrievalProvider, SourceChunk,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Replies by the first keyword found in the prompt.
#[derive(Default)]
pub struct KeywordProvider {
    rules: Vec<(String, Option<String>)>,
    default_reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
    pub delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl KeywordProvider {
    pub fn new(default_reply: &str) -> Self {
        Self {
            default_reply: Some(default_reply.to_string()),
            ..Default::default()
        }
    }

    pub fn reply(mut self, keyword: &str, reply: &str) -> Self {
        self.rules.push((keyword.to_string(), Some(reply.to_string())));
        self
    }

    pub fn fail(mut self, keyword: &str) -> Self {
        self.rules.push((keyword.to_string(), None));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls_matching(&self, keyword: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(keyword))
            .count()
    }
}

#[async_trait]
impl InferenceProvider for KeywordProvider {
    async fn invoke(&self, _model: &str, prompt: &str, _params: &InvokeParams) -> MeridianResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let rule = self
            .rules
            .iter()
            .find(|(keyword, _)| prompt.contains(keyword.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone());
        rule.ok_or_else(|| MeridianError::InferenceProvider("scripted outage".into()))
    }
}

/// Returns a fixed chunk list, honoring `exclude_ids` and `top_k`.
pub struct StaticRetriever {
    pub chunks: Vec<SourceChunk>,
    pub requests: Mutex<Vec<RetrievalContext>>,
    pub queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<SourceChunk>) -> Self {
        Self {
            chunks,
            requests: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RetrievalProvider for StaticRetriever {
    async fn retrieve(
        &self,
        sub_query: &str,
        context: &RetrievalContext,
    ) -> MeridianResult<Vec<SourceChunk>> {
        self.queries.lock().unwrap().push(sub_query.to_string());
        self.requests.lock().unwrap().push(context.clone());
        Ok(self
            .chunks
            .iter()
            .filter(|c| !context.exclude_ids.contains(&c.id))
            .take(context.top_k)
            .cloned()
            .collect())
    }
}
