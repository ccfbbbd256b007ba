use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Identifier of a task within one submitted batch.
pub type TaskId = String;

/// Role an agent plays when executing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Breaks a goal into steps.
    Planner,
    /// Gathers facts and sources.
    Researcher,
    /// Analyzes gathered material.
    Analyst,
    /// Produces code.
    Coder,
    /// Critiques the work of other roles.
    Reviewer,
    /// Drafts prose for the end result.
    Writer,
    /// Aggregates all other results into one answer.
    Synthesizer,
}

impl AgentRole {
    /// Every role, in declaration order.
    pub const ALL: [AgentRole; 7] = [
        AgentRole::Planner,
        AgentRole::Researcher,
        AgentRole::Analyst,
        AgentRole::Coder,
        AgentRole::Reviewer,
        AgentRole::Writer,
        AgentRole::Synthesizer,
    ];
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Planner => write!(f, "planner"),
            AgentRole::Researcher => write!(f, "researcher"),
            AgentRole::Analyst => write!(f, "analyst"),
            AgentRole::Coder => write!(f, "coder"),
            AgentRole::Reviewer => write!(f, "reviewer"),
            AgentRole::Writer => write!(f, "writer"),
            AgentRole::Synthesizer => write!(f, "synthesizer"),
        }
    }
}

/// A unit of work submitted to the task graph executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: TaskId,
    pub role: AgentRole,
    /// Free-form JSON input. Dependency payloads are merged in before dispatch.
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AgentTask {
    pub fn new(id: impl Into<TaskId>, role: AgentRole, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            role,
            input,
            dependencies: BTreeSet::new(),
            priority: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// True when every dependency id is contained in `recorded`.
    pub fn is_ready<F>(&self, recorded: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        self.dependencies.iter().all(|dep| recorded(dep))
    }

    /// The task's textual instruction: `input.description`, `input.prompt`,
    /// a bare string input, or the serialized input as a last resort.
    pub fn instruction(&self) -> String {
        if let Some(s) = self.input.as_str() {
            return s.to_string();
        }
        for key in ["description", "prompt", "query"] {
            if let Some(s) = self.input.get(key).and_then(|v| v.as_str()) {
                return s.to_string();
            }
        }
        self.input.to_string()
    }
}

/// The single outcome of executing one [`AgentTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_id: TaskId,
    pub role: AgentRole,
    pub success: bool,
    pub payload: serde_json::Value,
    #[serde(with = "crate::serde_millis")]
    pub execution_time: Duration,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    /// A successful result; confidence is clamped into `[0, 1]`.
    pub fn success(
        task_id: impl Into<TaskId>,
        role: AgentRole,
        payload: serde_json::Value,
        confidence: f64,
        execution_time: Duration,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            role,
            success: true,
            payload,
            execution_time,
            confidence: crate::clamp_unit(confidence),
            error: None,
        }
    }

    /// A failed result with zero confidence and the captured error text.
    pub fn failure(
        task_id: impl Into<TaskId>,
        role: AgentRole,
        error: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            role,
            success: false,
            payload: serde_json::Value::Null,
            execution_time,
            confidence: 0.0,
            error: Some(error.into()),
        }
    }
}
