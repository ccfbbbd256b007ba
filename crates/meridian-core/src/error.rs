use thiserror::Error;

/// A convenience `Result` alias using [`MeridianError`].
pub type MeridianResult<T> = Result<T, MeridianError>;

/// Top-level error type for the Meridian engine.
///
/// The first five variants are the engine's failure taxonomy. Public entry
/// points turn them into data (`success = false` results, error thoughts,
/// zero scores) instead of returning them to callers.
#[derive(Error, Debug)]
pub enum MeridianError {
    /// A single task failed; isolated to that task's result.
    #[error("Task execution error: {0}")]
    TaskExecution(String),

    /// A task references a missing id or sits on a dependency cycle.
    #[error("Dependency resolution error: {0}")]
    DependencyResolution(String),

    /// A single thought or metric-scoring call failed.
    #[error("Generation error: {0}")]
    Generation(String),

    /// A corrective action handler failed during one correction attempt.
    #[error("Correction handler error ({action}): {message}")]
    CorrectionHandler {
        /// Name of the corrective action whose handler failed.
        action: String,
        /// Failure description.
        message: String,
    },

    /// The inference provider failed to produce a reply.
    #[error("Inference provider error: {0}")]
    InferenceProvider(String),

    /// The retrieval provider failed.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// An outbound HTTP request failed or returned a non-success status.
    #[error("HTTP error: {message}")]
    Http {
        /// Response status; `None` when no response arrived.
        status: Option<u16>,
        /// Failure description.
        message: String,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeridianError {
    /// An HTTP error for a response with a non-success `status`.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        MeridianError::Http {
            status: Some(status),
            message: message.into(),
        }
    }

    /// An HTTP error raised before any response arrived.
    pub fn http_transport(message: impl Into<String>) -> Self {
        MeridianError::Http {
            status: None,
            message: message.into(),
        }
    }

    /// Short, stable label of the variant, used in diagnostics and payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            MeridianError::TaskExecution(_) => "TaskExecutionError",
            MeridianError::DependencyResolution(_) => "DependencyResolutionError",
            MeridianError::Generation(_) => "GenerationError",
            MeridianError::CorrectionHandler { .. } => "CorrectionHandlerError",
            MeridianError::InferenceProvider(_) => "InferenceProviderError",
            MeridianError::Retrieval(_) => "RetrievalError",
            MeridianError::Http { .. } => "HttpError",
            MeridianError::Config(_) => "ConfigError",
            MeridianError::Json(_) => "JsonError",
            MeridianError::Io(_) => "IoError",
        }
    }
}
