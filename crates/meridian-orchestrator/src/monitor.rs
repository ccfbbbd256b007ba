use meridian_core::{AgentResult, AgentRole, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-role execution counters.
///
/// `tasks_succeeded + errors` never exceeds `tasks_started`; tasks failed
/// before dispatch are counted in `unscheduled` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleMetrics {
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub errors: u64,
    /// Tasks failed without running, for a missing dependency or a cycle.
    #[serde(default)]
    pub unscheduled: u64,
    pub duration_ms: u64,
}

/// Live state of one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleState {
    pub role: AgentRole,
    /// Tasks of this role currently in flight.
    pub active_tasks: Vec<TaskId>,
    pub metrics: RoleMetrics,
}

/// Tracks state and metrics for every agent role.
pub struct AgentMonitor {
    states: Arc<RwLock<HashMap<AgentRole, RoleState>>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        let states = AgentRole::ALL
            .iter()
            .map(|&role| {
                (
                    role,
                    RoleState {
                        role,
                        active_tasks: Vec::new(),
                        metrics: RoleMetrics::default(),
                    },
                )
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Mark a task of `role` as in flight.
    pub async fn start_task(&self, role: AgentRole, task_id: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.active_tasks.push(task_id.to_string());
            state.metrics.tasks_started += 1;
        }
    }

    /// Count a task that was failed without ever being started.
    pub async fn record_unscheduled(&self, result: &AgentResult) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&result.role) {
            state.metrics.unscheduled += 1;
        }
    }

    /// Record the single result of a task.
    pub async fn finish_task(&self, result: &AgentResult) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&result.role) {
            state.active_tasks.retain(|id| id != &result.task_id);
            state.metrics.duration_ms += result.execution_time.as_millis() as u64;
            if result.success {
                state.metrics.tasks_succeeded += 1;
            } else {
                state.metrics.errors += 1;
            }
        }
    }

    /// Snapshot of all roles, in role order.
    pub async fn snapshot(&self) -> Vec<RoleState> {
        let states = self.states.read().await;
        AgentRole::ALL
            .iter()
            .filter_map(|role| states.get(role).cloned())
            .collect()
    }

    pub async fn get_state(&self, role: AgentRole) -> Option<RoleState> {
        let states = self.states.read().await;
        states.get(&role).cloned()
    }

    /// Sum of all role metrics.
    pub async fn aggregate_metrics(&self) -> RoleMetrics {
        let states = self.states.read().await;
        let mut total = RoleMetrics::default();
        for state in states.values() {
            total.tasks_started += state.metrics.tasks_started;
            total.tasks_succeeded += state.metrics.tasks_succeeded;
            total.errors += state.metrics.errors;
            total.unscheduled += state.metrics.unscheduled;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "roles": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}
