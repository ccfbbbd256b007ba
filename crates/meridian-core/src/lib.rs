//! Core types and error definitions for the Meridian engine.
//!
//! This crate provides the foundational types shared across all Meridian crates:
//! the error taxonomy, the task/result data model, the thought arena used by
//! reasoning chains, and the contracts of the external collaborators the engine
//! consumes (inference, retrieval, experience recording).
//!
//! # Main types
//!
//! - [`MeridianError`] — Unified error enum for all Meridian subsystems.
//! - [`MeridianResult`] — Convenience alias for `Result<T, MeridianError>`.
//! - [`AgentTask`] / [`AgentResult`] — Unit of work and its single outcome.
//! - [`Thought`] / [`ThoughtArena`] / [`ReasoningChain`] — Auditable reasoning artifacts.
//! - [`ParseOutcome`] — Explicit result of parsing a model reply.
//! - [`CapabilityRegistry`] — Optional subsystems enabled for a supervisor.
//! - [`AdmissionLimiter`] — Bounded concurrency for fan-out calls.
//! - [`InferenceProvider`], [`RetrievalProvider`], [`ExperienceStore`] — Collaborator traits.

/// Generated answers and the source chunks they cite.
pub mod answer;
/// Optional-subsystem flags.
pub mod capabilities;
/// Error taxonomy.
pub mod error;
/// Bounded admission for fan-out work.
pub mod limiter;
/// Parsing of free-form model replies.
pub mod parse;
/// Contracts of external collaborators.
pub mod provider;
/// Agent tasks and results.
pub mod task;
/// Thoughts, the thought arena and reasoning chains.
pub mod thought;

/// Serde adapter storing a [`std::time::Duration`] as integer milliseconds.
pub mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds.
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

pub use answer::{render_sources, RagAnswer, SourceChunk};
pub use capabilities::CapabilityRegistry;
pub use error::{MeridianError, MeridianResult};
pub use limiter::{AdmissionLimiter, DEFAULT_ADMISSION_LIMIT};
pub use parse::{extract_score, ParseOutcome};
pub use provider::{
    ExperienceEvent, ExperienceStore, InferenceProvider, InvokeParams, RetrievalContext,
    RetrievalProvider,
};
pub use task::{AgentResult, AgentRole, AgentTask, TaskId};
pub use thought::{
    chain_confidence, ReasoningChain, ReasoningPattern, Thought, ThoughtArena, ThoughtType,
};

/// Clamp a score into the unit interval, mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
