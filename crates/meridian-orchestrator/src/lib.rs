//! Dependency-aware task orchestration for Meridian.
//!
//! A [`Supervisor`] takes a batch of [`AgentTask`](meridian_core::AgentTask)s,
//! runs them layer by layer through the [`TaskGraphExecutor`] and finishes
//! with a synthesis step that aggregates every result.
//!
//! # Main types
//!
//! - [`TaskGraph`] — Readiness tracking and dependency diagnostics.
//! - [`TaskGraphExecutor`] — Concurrent, bulkheaded layer dispatch.
//! - [`Supervisor`] — Execution plus synthesis, memory recall and experience recording.
//! - [`AgentMonitor`] — Per-role execution metrics.
//! - [`TaskRunner`] — Seam between the executor and the agent.

/// Layered task graph execution.
pub mod executor;
/// Per-role metrics.
pub mod monitor;
/// Task execution seam.
pub mod runner;
/// End-to-end supervised runs.
pub mod supervisor;
/// Task readiness and dependency diagnostics.
pub mod task_graph;

pub use executor::{
    with_dependency_inputs, ExecutionOutcome, TaskGraphExecutor, DEPENDENCY_ERRORS_KEY,
    DEPENDENCY_RESULTS_KEY,
};
pub use monitor::{AgentMonitor, RoleMetrics, RoleState};
pub use runner::TaskRunner;
pub use supervisor::{OrchestratorConfig, Supervisor, SupervisorReport, SYNTHESIS_TASK_ID};
pub use task_graph::TaskGraph;
