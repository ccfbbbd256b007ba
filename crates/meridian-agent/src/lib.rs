//! Agents, role profiles and inference backends for Meridian.
//!
//! An [`Agent`] executes one [`AgentTask`](meridian_core::AgentTask) per call:
//! it frames the task with its role's [`AgentProfile`], asks the configured
//! [`InferenceProvider`](meridian_core::InferenceProvider) (directly or through
//! the reasoning engine) and normalizes the reply into an
//! [`AgentResult`](meridian_core::AgentResult).
//!
//! The HTTP backends speak the OpenAI chat completions and Anthropic Messages
//! APIs. [`FailoverProvider`] adds retries with exponential backoff and
//! fallback models on top of them.

/// Task execution and reply normalization.
pub mod agent;
/// HTTP inference backends.
pub mod backends;
/// Model configuration.
pub mod config;
/// Retry and failover across providers.
pub mod failover;
/// Per-role agent profiles.
pub mod profiles;

pub use agent::{normalize_reply, Agent};
pub use backends::{backend_for, build_provider, ClaudeBackend, OpenAiBackend};
pub use config::{LlmProvider, ModelConfig};
pub use failover::{compute_backoff, is_retryable, FailoverProvider, RetryPolicy, Route};
pub use profiles::{default_profiles, AgentProfile};
