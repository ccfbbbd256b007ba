pub mod claude;
pub mod openai;

use crate::config::{LlmProvider, ModelConfig};
use crate::failover::{FailoverProvider, Route};
use meridian_core::{InferenceProvider, MeridianError};
use std::sync::Arc;
use std::time::Duration;

pub use claude::ClaudeBackend;
pub use openai::OpenAiBackend;

/// The HTTP backend serving `config.provider`.
///
/// OpenRouter and Groq speak the OpenAI chat completions API.
pub fn backend_for(config: &ModelConfig) -> Arc<dyn InferenceProvider> {
    match config.provider {
        LlmProvider::Claude => Arc::new(ClaudeBackend::new(config.clone())),
        LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
            Arc::new(OpenAiBackend::new(config.clone()))
        }
    }
}

/// Wire a model config to its provider stack.
///
/// A config with fallback models or an explicit retry policy is wrapped in a
/// [`FailoverProvider`]; otherwise the bare backend is returned.
pub fn build_provider(config: &ModelConfig) -> Arc<dyn InferenceProvider> {
    let primary = backend_for(config);
    if config.fallback_models.is_empty() && config.retry_policy.is_none() {
        return primary;
    }
    let mut routes = vec![Route::primary(primary)];
    for fallback in &config.fallback_models {
        routes.push(Route::fallback(
            backend_for(fallback),
            fallback.model_id.clone(),
        ));
    }
    Arc::new(FailoverProvider::new(
        routes,
        config.retry_policy.clone().unwrap_or_default(),
    ))
}

pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    // Builder failure only happens when the TLS backend cannot initialize.
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .unwrap_or_default()
}

pub(crate) fn transport_error(e: reqwest::Error) -> MeridianError {
    if e.is_timeout() {
        MeridianError::InferenceProvider(format!("request timeout: {e}"))
    } else {
        MeridianError::http_transport(e.to_string())
    }
}
