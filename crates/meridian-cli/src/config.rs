use anyhow::Context;
use meridian_agent::ModelConfig;
use meridian_core::CapabilityRegistry;
use meridian_orchestrator::OrchestratorConfig;
use meridian_quality::CorrectionConfig;
use meridian_reasoning::ReasoningConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when the config leaves `api_key` empty.
pub const API_KEY_ENV: &str = "MERIDIAN_API_KEY";

/// Contents of `meridian.toml`.
#[derive(Debug, Deserialize)]
pub struct MeridianConfig {
    pub model: ModelConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub capabilities: CapabilityRegistry,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl MeridianConfig {
    /// Parse a config document, filling an empty API key from `api_key`.
    pub fn parse(text: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let mut config: MeridianConfig = toml::from_str(text)?;
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            config.model.fill_api_key(key);
        }
        Ok(config)
    }

    /// Read and parse the config file at `path`.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let api_key = std::env::var(API_KEY_ENV).ok();
        Self::parse(&text, api_key.as_deref())
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Reasoning settings with the configured model as primary.
    pub fn reasoning(&self) -> ReasoningConfig {
        self.reasoning
            .clone()
            .with_primary_model(self.model.model_id.clone())
    }

    pub fn experience_path(&self) -> PathBuf {
        self.data_dir.join("experience.jsonl")
    }
}
