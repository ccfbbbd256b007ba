use serde::{Deserialize, Serialize};

/// Optional subsystems available to a supervisor.
///
/// Detected once at startup and passed in explicitly; components never query
/// for optional features at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRegistry {
    /// Agents reason through multi-step thought chains instead of a single call.
    #[serde(default = "default_true")]
    pub reasoning_enabled: bool,
    /// Agents receive retrieved context for their instruction.
    #[serde(default)]
    pub memory_enabled: bool,
    /// Completed runs are reported to the experience store.
    #[serde(default = "default_true")]
    pub experience_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self {
            reasoning_enabled: true,
            memory_enabled: false,
            experience_enabled: true,
        }
    }
}

impl CapabilityRegistry {
    /// Every optional subsystem switched off.
    pub fn minimal() -> Self {
        Self {
            reasoning_enabled: false,
            memory_enabled: false,
            experience_enabled: false,
        }
    }
}
