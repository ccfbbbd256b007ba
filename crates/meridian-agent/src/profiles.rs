use crate::config::ModelConfig;
use meridian_core::{AgentRole, ReasoningPattern};
use serde::{Deserialize, Serialize};

/// How an agent behaves for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub role: AgentRole,
    pub model: ModelConfig,
    pub system_prompt: String,
    /// Pattern used when reasoning is enabled.
    pub pattern: ReasoningPattern,
}

/// Create default agent profiles, one per role.
/// Uses the provided base config as template, adjusting per role.
pub fn default_profiles(base_config: &ModelConfig) -> Vec<AgentProfile> {
    AgentRole::ALL
        .iter()
        .map(|&role| role_profile(base_config, role))
        .collect()
}

fn role_profile(base: &ModelConfig, role: AgentRole) -> AgentProfile {
    let (temperature, pattern, system_prompt) = match role {
        AgentRole::Planner => (0.3, ReasoningPattern::ChainOfThought, PLANNER_PROMPT),
        AgentRole::Researcher => (0.5, ReasoningPattern::MultiPerspective, RESEARCHER_PROMPT),
        AgentRole::Analyst => (0.4, ReasoningPattern::TreeOfThought, ANALYST_PROMPT),
        AgentRole::Coder => (0.2, ReasoningPattern::ChainOfThought, CODER_PROMPT),
        AgentRole::Reviewer => (0.3, ReasoningPattern::CritiqueAndRefine, REVIEWER_PROMPT),
        AgentRole::Writer => (0.7, ReasoningPattern::Linear, WRITER_PROMPT),
        AgentRole::Synthesizer => (0.3, ReasoningPattern::ChainOfThought, SYNTHESIZER_PROMPT),
    };
    let mut model = base.clone();
    model.temperature = temperature;

    AgentProfile {
        role,
        model,
        system_prompt: system_prompt.to_string(),
        pattern,
    }
}

const PLANNER_PROMPT: &str = "\
You are the Planner agent. Break the goal into clear, ordered steps, \
name what each step needs from earlier ones, and flag risky assumptions.";

const RESEARCHER_PROMPT: &str = "\
You are the Researcher agent. Gather the facts relevant to the task, \
state where each comes from, and separate established facts from guesses.";

const ANALYST_PROMPT: &str = "\
You are the Analyst agent. Examine the material you are given, compare \
alternatives, and reach a justified conclusion.";

const CODER_PROMPT: &str = "\
You are the Coder agent. Produce correct, minimal, idiomatic code for the \
task and explain any non-obvious decision in one sentence.";

const REVIEWER_PROMPT: &str = "\
You are the Reviewer agent. Check the work of other agents for errors, \
gaps and unsupported claims. Be specific about what must change.";

const WRITER_PROMPT: &str = "\
You are the Writer agent. Turn the material you are given into clear, \
well-structured prose without adding facts.";

const SYNTHESIZER_PROMPT: &str = "\
You are the Synthesizer agent. Combine the results of all other agents \
into one coherent answer, resolving conflicts and noting failed inputs.";
