use meridian_core::InvokeParams;
use serde::{Deserialize, Serialize};

/// Maximum number of distinct perspectives a multi-perspective chain uses.
pub const MAX_PERSPECTIVES: usize = 3;

/// Tuning knobs of the reasoning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Model used for every sequential step.
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    /// Models queried by the multi-perspective pattern. Empty means the
    /// primary model answers alone.
    #[serde(default)]
    pub perspective_models: Vec<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Insert a Critique step before the chain-of-thought synthesis.
    #[serde(default)]
    pub include_critique: bool,
    #[serde(default = "default_tree_branches")]
    pub tree_branches: usize,
    #[serde(default = "default_max_refinements")]
    pub max_refinements: u32,
    /// Critique-and-refine stops once a refined analysis scores above this.
    #[serde(default = "default_refine_threshold")]
    pub refine_threshold: f64,
    /// Confidence given to a thought whose reply carried none.
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
    /// Role framing sent with every step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_primary_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_tree_branches() -> usize {
    3
}

fn default_max_refinements() -> u32 {
    3
}

fn default_refine_threshold() -> f64 {
    0.8
}

fn default_fallback_confidence() -> f64 {
    0.5
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            primary_model: default_primary_model(),
            perspective_models: Vec::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            include_critique: false,
            tree_branches: default_tree_branches(),
            max_refinements: default_max_refinements(),
            refine_threshold: default_refine_threshold(),
            fallback_confidence: default_fallback_confidence(),
            system_prompt: None,
        }
    }
}

impl ReasoningConfig {
    pub fn with_primary_model(mut self, model: impl Into<String>) -> Self {
        self.primary_model = model.into();
        self
    }

    pub fn with_perspectives<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.perspective_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Distinct perspective models, at most [`MAX_PERSPECTIVES`], falling back
    /// to the primary model.
    pub fn perspectives(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for model in &self.perspective_models {
            if !model.is_empty() && !models.contains(model) {
                models.push(model.clone());
            }
            if models.len() == MAX_PERSPECTIVES {
                break;
            }
        }
        if models.is_empty() {
            models.push(self.primary_model.clone());
        }
        models
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub(crate) fn params(&self) -> InvokeParams {
        let params = InvokeParams::new(self.max_tokens, self.temperature);
        match &self.system_prompt {
            Some(prompt) => params.with_system_prompt(prompt.clone()),
            None => params,
        }
    }
}
