use super::{http_client, transport_error};
use crate::config::ModelConfig;
use async_trait::async_trait;
use meridian_core::{InferenceProvider, InvokeParams, MeridianError, MeridianResult};
use serde::{Deserialize, Serialize};

/// Claude (Anthropic) API backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(config: ModelConfig) -> Self {
        let http = http_client(config.timeout_secs);
        Self { config, http }
    }
}

#[async_trait]
impl InferenceProvider for ClaudeBackend {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &InvokeParams,
    ) -> MeridianResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let model = if model.is_empty() {
            self.config.model_id.as_str()
        } else {
            model
        };

        let messages = [ClaudeMessage {
            role: "user",
            content: prompt,
        }];
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": messages,
        });
        if let Some(sys) = &params.system_prompt {
            body["system"] = serde_json::json!(sys);
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(MeridianError::http_status(
                status.as_u16(),
                format!("Claude API error {status}: {text}"),
            ));
        }

        parse_claude_response(&text)
    }
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Concatenate the text blocks of a Messages API response.
pub fn parse_claude_response(body: &str) -> MeridianResult<String> {
    let response: MessagesResponse = serde_json::from_str(body)?;
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    if text.is_empty() {
        return Err(MeridianError::InferenceProvider(
            "Claude response has no text content".into(),
        ));
    }
    Ok(text.join("\n"))
}
