use crate::monitor::AgentMonitor;
use crate::runner::TaskRunner;
use crate::task_graph::TaskGraph;
use futures_util::future::join_all;
use meridian_core::{AdmissionLimiter, AgentResult, AgentRole, AgentTask, MeridianError, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Key under which dependency payloads are merged into a task's input.
pub const DEPENDENCY_RESULTS_KEY: &str = "dependency_results";
/// Key under which failed dependencies' error texts are merged.
pub const DEPENDENCY_ERRORS_KEY: &str = "dependency_errors";

/// Results of one graph execution plus the layers that produced them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub results: HashMap<TaskId, AgentResult>,
    /// Task ids dispatched together, in dispatch order.
    pub layers: Vec<Vec<TaskId>>,
}

/// Runs a task set layer by layer.
///
/// Every ready task of a layer is dispatched concurrently, each on its own
/// tokio task, so a failing or panicking task never takes its siblings down.
pub struct TaskGraphExecutor {
    runner: Arc<dyn TaskRunner>,
    limiter: AdmissionLimiter,
    monitor: Arc<AgentMonitor>,
}

impl TaskGraphExecutor {
    pub fn new(runner: Arc<dyn TaskRunner>, limiter: AdmissionLimiter) -> Self {
        Self {
            runner,
            limiter,
            monitor: Arc::new(AgentMonitor::new()),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<AgentMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Execute `tasks`, producing exactly one result per distinct task id.
    pub async fn execute(&self, tasks: Vec<AgentTask>) -> HashMap<TaskId, AgentResult> {
        self.execute_with(tasks, &HashMap::new()).await.results
    }

    /// Execute `tasks`, letting results from an earlier run satisfy
    /// dependencies. Only this batch's results are returned.
    pub async fn execute_with(
        &self,
        tasks: Vec<AgentTask>,
        prior: &HashMap<TaskId, AgentResult>,
    ) -> ExecutionOutcome {
        let start = Instant::now();
        let mut graph = TaskGraph::new(tasks, prior.keys().cloned());
        let mut outcome = ExecutionOutcome::default();

        info!(tasks = graph.len(), "Executing task graph");

        while !graph.is_done() {
            let frontier: Vec<AgentTask> = graph.ready_frontier().into_iter().cloned().collect();

            if frontier.is_empty() {
                warn!(
                    pending = graph.pending_count(),
                    "Dependency deadlock, failing unreachable tasks"
                );
                let stuck: Vec<(TaskId, MeridianError, AgentRole)> = graph
                    .pending()
                    .into_iter()
                    .map(|t| (t.id.clone(), graph.diagnose(&t.id), t.role))
                    .collect();
                for (id, diagnostic, role) in stuck {
                    error!(task_id = %id, error = %diagnostic, "Task cannot be scheduled");
                    let result =
                        AgentResult::failure(id.clone(), role, diagnostic.to_string(), Duration::ZERO);
                    self.monitor.record_unscheduled(&result).await;
                    graph.record(&id);
                    outcome.results.insert(id, result);
                }
                break;
            }

            let layer: Vec<TaskId> = frontier.iter().map(|t| t.id.clone()).collect();
            info!(
                layer = outcome.layers.len(),
                tasks = ?layer,
                "Dispatching layer"
            );

            let mut handles = Vec::with_capacity(frontier.len());
            let mut dispatched = Vec::with_capacity(frontier.len());
            for task in frontier {
                let prepared = with_dependency_inputs(task, |dep| {
                    outcome.results.get(dep).or_else(|| prior.get(dep))
                });
                self.monitor.start_task(prepared.role, &prepared.id).await;
                dispatched.push((prepared.id.clone(), prepared.role));

                let runner = self.runner.clone();
                let limiter = self.limiter.clone();
                handles.push(tokio::spawn(async move {
                    let started = Instant::now();
                    let _permit = limiter.acquire().await;
                    let mut result = runner.run(&prepared).await;
                    if result.execution_time.is_zero() {
                        result.execution_time = started.elapsed();
                    }
                    result
                }));
            }

            for ((id, role), joined) in dispatched.into_iter().zip(join_all(handles).await) {
                let mut result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        error!(task_id = %id, error = %e, "Task aborted");
                        AgentResult::failure(
                            id.clone(),
                            role,
                            MeridianError::TaskExecution(format!("task aborted: {e}")).to_string(),
                            Duration::ZERO,
                        )
                    }
                };
                // A runner must not rename the task it was given.
                result.task_id = id.clone();
                self.monitor.finish_task(&result).await;
                graph.record(&id);
                outcome.results.insert(id, result);
            }
            outcome.layers.push(layer);
        }

        let failed = outcome.results.values().filter(|r| !r.success).count();
        info!(
            tasks = outcome.results.len(),
            failed,
            layers = outcome.layers.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Task graph complete"
        );
        outcome
    }
}

/// Copy `task` with its dependencies' payloads merged into the input.
///
/// Object inputs gain `dependency_results` (and `dependency_errors` when a
/// dependency failed). Other inputs are wrapped as `{"description": ...}`
/// for strings or `{"input": ...}` otherwise.
pub fn with_dependency_inputs<'a, F>(mut task: AgentTask, lookup: F) -> AgentTask
where
    F: Fn(&str) -> Option<&'a AgentResult>,
{
    if task.dependencies.is_empty() {
        return task;
    }

    let mut payloads = serde_json::Map::new();
    let mut errors = serde_json::Map::new();
    for dep in &task.dependencies {
        if let Some(result) = lookup(dep) {
            payloads.insert(dep.clone(), result.payload.clone());
            if !result.success {
                let text = result.error.clone().unwrap_or_else(|| "failed".to_string());
                errors.insert(dep.clone(), serde_json::Value::String(text));
            }
        }
    }

    let mut input = into_object(std::mem::take(&mut task.input));
    input.insert(DEPENDENCY_RESULTS_KEY.into(), serde_json::Value::Object(payloads));
    if !errors.is_empty() {
        input.insert(DEPENDENCY_ERRORS_KEY.into(), serde_json::Value::Object(errors));
    }
    task.input = serde_json::Value::Object(input);
    task
}

/// View any task input as a JSON object, wrapping non-object inputs.
pub(crate) fn into_object(input: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match input {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        serde_json::Value::String(s) => {
            let mut map = serde_json::Map::new();
            map.insert("description".into(), serde_json::Value::String(s));
            map
        }
        other => {
            let mut map = serde_json::Map::new();
            map.insert("input".into(), other);
            map
        }
    }
}
