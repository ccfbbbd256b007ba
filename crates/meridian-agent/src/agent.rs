use crate::profiles::AgentProfile;
use meridian_core::{
    AgentResult, AgentRole, AgentTask, InferenceProvider, InvokeParams, MeridianError,
    MeridianResult, ParseOutcome,
};
use meridian_reasoning::{ReasoningConfig, ReasoningEngine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Confidence of a reply that parsed as JSON but carried no confidence field.
pub const PARSED_REPLY_CONFIDENCE: f64 = 0.7;
/// Confidence of a reply that did not parse and was kept as plain text.
pub const FALLBACK_REPLY_CONFIDENCE: f64 = 0.5;

/// Executes one task per call on behalf of its role.
///
/// With reasoning attached, the task runs through the role's reasoning
/// pattern; otherwise the agent makes a single inference call and normalizes
/// the reply.
pub struct Agent {
    provider: Arc<dyn InferenceProvider>,
    profiles: HashMap<AgentRole, AgentProfile>,
    reasoning: Option<(ReasoningEngine, ReasoningConfig)>,
}

impl Agent {
    pub fn new(provider: Arc<dyn InferenceProvider>, profiles: Vec<AgentProfile>) -> Self {
        let profiles = profiles.into_iter().map(|p| (p.role, p)).collect();
        Self {
            provider,
            profiles,
            reasoning: None,
        }
    }

    /// Route every task through the reasoning engine.
    pub fn with_reasoning(mut self, config: ReasoningConfig) -> Self {
        let engine = ReasoningEngine::new(self.provider.clone());
        self.reasoning = Some((engine, config));
        self
    }

    pub fn profile(&self, role: AgentRole) -> Option<&AgentProfile> {
        self.profiles.get(&role)
    }

    pub fn reasoning_enabled(&self) -> bool {
        self.reasoning.is_some()
    }

    /// Execute `task` and return its single result. Never fails: any error is
    /// captured in a `success = false` result.
    pub async fn execute(&self, task: &AgentTask) -> AgentResult {
        let start = Instant::now();
        info!(task_id = %task.id, role = %task.role, "Agent executing task");

        match self.try_execute(task).await {
            Ok((payload, confidence)) => {
                let result = AgentResult::success(
                    task.id.clone(),
                    task.role,
                    payload,
                    confidence,
                    start.elapsed(),
                );
                info!(
                    task_id = %task.id,
                    role = %task.role,
                    confidence = result.confidence,
                    duration_ms = result.execution_time.as_millis() as u64,
                    "Task completed"
                );
                result
            }
            Err(e) => {
                error!(task_id = %task.id, role = %task.role, error = %e, "Task failed");
                AgentResult::failure(
                    task.id.clone(),
                    task.role,
                    MeridianError::TaskExecution(e.to_string()).to_string(),
                    start.elapsed(),
                )
            }
        }
    }

    async fn try_execute(&self, task: &AgentTask) -> MeridianResult<(serde_json::Value, f64)> {
        let profile = self.profiles.get(&task.role).ok_or_else(|| {
            MeridianError::TaskExecution(format!("no profile for role '{}'", task.role))
        })?;

        match &self.reasoning {
            Some((engine, base)) => self.reason(engine, base, profile, task).await,
            None => self.invoke_direct(profile, task).await,
        }
    }

    async fn invoke_direct(
        &self,
        profile: &AgentProfile,
        task: &AgentTask,
    ) -> MeridianResult<(serde_json::Value, f64)> {
        let params = InvokeParams::new(profile.model.max_tokens, profile.model.temperature)
            .with_system_prompt(profile.system_prompt.clone());
        let prompt = build_prompt(task)?;
        let reply = self
            .provider
            .invoke(&profile.model.model_id, &prompt, &params)
            .await?;
        normalize_reply(&reply)
    }

    async fn reason(
        &self,
        engine: &ReasoningEngine,
        base: &ReasoningConfig,
        profile: &AgentProfile,
        task: &AgentTask,
    ) -> MeridianResult<(serde_json::Value, f64)> {
        let mut config = base
            .clone()
            .with_primary_model(profile.model.model_id.clone())
            .with_system_prompt(profile.system_prompt.clone());
        config.temperature = profile.model.temperature;

        let context = render_context(&task.input)?;
        let chain = engine.reason(task, &context, profile.pattern, &config).await;

        let Some(decision) = chain.final_decision() else {
            let last_error = chain
                .thoughts()
                .iter()
                .rev()
                .find(|t| t.is_error)
                .map(|t| t.content.clone())
                .unwrap_or_else(|| "no thoughts generated".to_string());
            return Err(MeridianError::Generation(format!(
                "reasoning produced no decision: {last_error}"
            )));
        };

        let payload = serde_json::json!({
            "decision": decision,
            "pattern": chain.pattern(),
            "chain_id": chain.id(),
            "thoughts": serde_json::to_value(chain.thoughts())?,
            "confidence": chain.confidence_score(),
        });
        Ok((payload, chain.confidence_score()))
    }
}

/// Role-independent user prompt for a direct call.
fn build_prompt(task: &AgentTask) -> MeridianResult<String> {
    let mut prompt = format!("Task ({}): {}\n", task.role, task.instruction());
    let context = render_context(&task.input)?;
    if !context.is_empty() {
        prompt.push_str(&format!("\nInput:\n{context}\n"));
    }
    prompt.push_str(
        "\nRespond with a JSON object holding your result. \
         Include a \"confidence\" field between 0 and 1.",
    );
    Ok(prompt)
}

/// The task input as pretty JSON; a bare string input is already the instruction.
fn render_context(input: &serde_json::Value) -> MeridianResult<String> {
    match input {
        serde_json::Value::Null | serde_json::Value::String(_) => Ok(String::new()),
        other => Ok(serde_json::to_string_pretty(other)?),
    }
}

/// Normalize a raw reply into a payload and confidence.
///
/// A JSON object reply becomes the payload; anything else is wrapped as
/// `{"text": ...}`. An explicit `confidence` field wins over the defaults.
pub fn normalize_reply(raw: &str) -> MeridianResult<(serde_json::Value, f64)> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(MeridianError::InferenceProvider("empty reply".into()));
    }
    let outcome = ParseOutcome::json_object(text, serde_json::json!({ "text": text }));
    let default = if outcome.ok {
        PARSED_REPLY_CONFIDENCE
    } else {
        FALLBACK_REPLY_CONFIDENCE
    };
    let confidence = outcome.unit_field("confidence").unwrap_or(default);
    Ok((outcome.value, confidence))
}
