use crate::executor::{into_object, TaskGraphExecutor};
use crate::monitor::AgentMonitor;
use crate::runner::TaskRunner;
use chrono::Utc;
use futures_util::future::join_all;
use meridian_agent::{Agent, AgentProfile};
use meridian_core::{
    AdmissionLimiter, AgentResult, AgentRole, AgentTask, CapabilityRegistry, ExperienceEvent,
    ExperienceStore, InferenceProvider, ReasoningPattern, RetrievalContext, RetrievalProvider,
    TaskId, DEFAULT_ADMISSION_LIMIT,
};
use meridian_reasoning::ReasoningConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Id of the synthesis step that aggregates every other result.
pub const SYNTHESIS_TASK_ID: &str = "__synthesis__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Tasks of one layer running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Overrides every profile's reasoning pattern when set.
    #[serde(default)]
    pub default_pattern: Option<ReasoningPattern>,
    /// Run the synthesis step after the graph.
    #[serde(default = "default_synthesize")]
    pub synthesize: bool,
    /// Chunks recalled per root task when memory is enabled.
    #[serde(default = "default_memory_top_k")]
    pub memory_top_k: usize,
}

fn default_max_concurrency() -> usize {
    DEFAULT_ADMISSION_LIMIT
}

fn default_synthesize() -> bool {
    true
}

fn default_memory_top_k() -> usize {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_pattern: None,
            synthesize: default_synthesize(),
            memory_top_k: default_memory_top_k(),
        }
    }
}

/// Everything a supervised run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorReport {
    pub run_id: String,
    pub results: BTreeMap<TaskId, AgentResult>,
    pub synthesis: Option<AgentResult>,
    pub layers: Vec<Vec<TaskId>>,
    /// Synthesis and every task succeeded.
    pub overall_success: bool,
    /// Mean confidence of the task results, synthesis excluded.
    pub average_confidence: f64,
    #[serde(with = "meridian_core::serde_millis")]
    pub total_time: Duration,
}

/// Runs a task graph end to end: optional memory recall, layered
/// execution, synthesis and experience recording.
pub struct Supervisor {
    executor: TaskGraphExecutor,
    runner: Arc<dyn TaskRunner>,
    /// Shared with the executor; also bounds memory recall.
    limiter: AdmissionLimiter,
    capabilities: CapabilityRegistry,
    config: OrchestratorConfig,
    retriever: Option<Arc<dyn RetrievalProvider>>,
    experience: Option<Arc<dyn ExperienceStore>>,
}

impl Supervisor {
    /// Build a supervisor around an [`Agent`] wired to `provider`.
    ///
    /// Reasoning is attached only when the capability registry enables it.
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        mut profiles: Vec<AgentProfile>,
        reasoning: ReasoningConfig,
        capabilities: CapabilityRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        if let Some(pattern) = config.default_pattern {
            for profile in &mut profiles {
                profile.pattern = pattern;
            }
        }
        let mut agent = Agent::new(provider, profiles);
        if capabilities.reasoning_enabled {
            agent = agent.with_reasoning(reasoning);
        }
        Self::with_runner(Arc::new(agent), capabilities, config)
    }

    /// Build a supervisor around any task runner.
    pub fn with_runner(
        runner: Arc<dyn TaskRunner>,
        capabilities: CapabilityRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let limiter = AdmissionLimiter::new(config.max_concurrency);
        let executor = TaskGraphExecutor::new(runner.clone(), limiter.clone());
        Self {
            executor,
            runner,
            limiter,
            capabilities,
            config,
            retriever: None,
            experience: None,
        }
    }

    /// Source for memory recall, used when `memory_enabled`.
    pub fn with_retriever(mut self, retriever: Arc<dyn RetrievalProvider>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Sink for run summaries, used when `experience_enabled`.
    pub fn with_experience_store(mut self, store: Arc<dyn ExperienceStore>) -> Self {
        self.experience = Some(store);
        self
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        self.executor.monitor()
    }

    /// Run a task set to completion. Never fails: every task, including
    /// unschedulable ones, ends up in the report.
    pub async fn run(&self, tasks: Vec<AgentTask>) -> SupervisorReport {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, tasks = tasks.len(), "Supervisor: starting run");

        let tasks = self.recall(tasks).await;
        let outcome = self.executor.execute_with(tasks, &HashMap::new()).await;

        let synthesis = if self.config.synthesize && !outcome.results.is_empty() {
            Some(self.synthesize(&outcome.results).await)
        } else {
            None
        };

        let overall_success = !outcome.results.is_empty()
            && outcome.results.values().all(|r| r.success)
            && synthesis.as_ref().map_or(true, |s| s.success);
        let average_confidence = mean_confidence(outcome.results.values());

        let report = SupervisorReport {
            run_id,
            results: outcome.results.into_iter().collect(),
            synthesis,
            layers: outcome.layers,
            overall_success,
            average_confidence,
            total_time: start.elapsed(),
        };

        info!(
            run_id = %report.run_id,
            overall_success = report.overall_success,
            average_confidence = report.average_confidence,
            duration_ms = report.total_time.as_millis() as u64,
            "Supervisor: run complete"
        );

        self.record_experience(&report).await;
        report
    }

    /// Attach recalled chunks to root tasks when memory is enabled.
    async fn recall(&self, tasks: Vec<AgentTask>) -> Vec<AgentTask> {
        let Some(retriever) = self.retriever.as_ref().filter(|_| self.capabilities.memory_enabled)
        else {
            return tasks;
        };
        let context = RetrievalContext::top_k(self.config.memory_top_k);

        join_all(tasks.into_iter().map(|mut task| {
            let context = &context;
            async move {
                if !task.dependencies.is_empty() {
                    return task;
                }
                let recalled = self
                    .limiter
                    .run(retriever.retrieve(&task.instruction(), context))
                    .await;
                match recalled {
                    Ok(chunks) if !chunks.is_empty() => {
                        let memory: Vec<serde_json::Value> = chunks
                            .iter()
                            .map(|c| {
                                serde_json::json!({
                                    "title": c.title,
                                    "content": c.content,
                                    "score": c.score,
                                })
                            })
                            .collect();
                        let mut input = into_object(std::mem::take(&mut task.input));
                        input.insert("memory".into(), serde_json::Value::Array(memory));
                        task.input = serde_json::Value::Object(input);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "Memory recall failed, continuing without it");
                    }
                }
                task
            }
        }))
        .await
    }

    async fn synthesize(&self, results: &HashMap<TaskId, AgentResult>) -> AgentResult {
        let mut task_results = serde_json::Map::new();
        let mut task_errors = serde_json::Map::new();
        let ordered: BTreeMap<&TaskId, &AgentResult> = results.iter().collect();
        for (id, result) in ordered {
            if result.success {
                task_results.insert(id.clone(), result.payload.clone());
            } else {
                let text = result.error.clone().unwrap_or_else(|| "failed".to_string());
                task_errors.insert(id.clone(), serde_json::Value::String(text));
            }
        }

        let task = AgentTask::new(
            SYNTHESIS_TASK_ID,
            AgentRole::Synthesizer,
            serde_json::json!({
                "description": "Combine the results of all tasks into one final answer.",
                "task_results": task_results,
                "task_errors": task_errors,
            }),
        );

        info!(inputs = results.len(), "Supervisor: synthesizing");
        let monitor = self.executor.monitor();
        monitor.start_task(task.role, &task.id).await;
        let result = self.runner.run(&task).await;
        monitor.finish_task(&result).await;
        result
    }

    async fn record_experience(&self, report: &SupervisorReport) {
        if !self.capabilities.experience_enabled {
            return;
        }
        let Some(store) = &self.experience else {
            return;
        };
        let succeeded = report.results.values().filter(|r| r.success).count();
        let event = ExperienceEvent::TaskGraphCompleted {
            run_id: report.run_id.clone(),
            task_count: report.results.len(),
            succeeded,
            failed: report.results.len() - succeeded,
            overall_success: report.overall_success,
            average_confidence: report.average_confidence,
            duration_ms: report.total_time.as_millis() as u64,
            recorded_at: Utc::now(),
        };
        if let Err(e) = store.record(event).await {
            warn!(run_id = %report.run_id, error = %e, "Failed to record experience");
        }
    }
}

/// Mean confidence, 0 for an empty set.
fn mean_confidence<'a>(results: impl Iterator<Item = &'a AgentResult>) -> f64 {
    let (sum, count) = results.fold((0.0, 0usize), |(sum, n), r| (sum + r.confidence, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
