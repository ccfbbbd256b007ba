use super::{http_client, transport_error};
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use meridian_core::{InferenceProvider, InvokeParams, MeridianError, MeridianResult};
use serde::Deserialize;

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig) -> Self {
        let http = http_client(config.timeout_secs);
        Self { config, http }
    }

    fn build_messages(&self, prompt: &str, params: &InvokeParams) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = &params.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": sys }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));
        messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "Meridian")
        } else {
            request
        }
    }
}

#[async_trait]
impl InferenceProvider for OpenAiBackend {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &InvokeParams,
    ) -> MeridianResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let model = if model.is_empty() {
            self.config.model_id.as_str()
        } else {
            model
        };

        let body = serde_json::json!({
            "model": model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": self.build_messages(prompt, params),
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(MeridianError::http_status(
                status.as_u16(),
                format!("OpenAI API error {status}: {text}"),
            ));
        }

        parse_openai_response(&text)
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's message text.
pub fn parse_openai_response(body: &str) -> MeridianResult<String> {
    let completion: ChatCompletion = serde_json::from_str(body)?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| {
            MeridianError::InferenceProvider("OpenAI response has no message content".into())
        })
}
