//! Reasoning engine for the Meridian orchestrator.
//!
//! Builds auditable [`ReasoningChain`](meridian_core::ReasoningChain)s out of
//! individually generated thoughts. Six fixed topologies are supported:
//! linear, chain-of-thought, tree-of-thought, multi-perspective,
//! critique-and-refine and ensemble. Independent steps (tree branches,
//! perspectives, ensemble sub-chains) run concurrently and are joined before
//! the step that consumes them.

/// Engine configuration.
pub mod config;
/// Pattern drivers and thought generation.
pub mod engine;
mod prompts;

pub use config::{ReasoningConfig, MAX_PERSPECTIVES};
pub use engine::ReasoningEngine;
