//! Errors that reach the front-end.
//!
//! Everything else that can go wrong inside a turn (tool failures, timeouts,
//! unparseable actions, the iteration cap) is turned into an observation or
//! a stop reason and never leaves the execution loop.

use slothtop_config::ConfigError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// Settings could not be read or a new value was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The model backend could not be reached or cannot serve the model
    #[error("Backend unavailable ({backend}): {reason}")]
    BackendUnavailable { backend: String, reason: String },
}

impl AgentError {
    pub(crate) fn backend(backend: &str, err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable {
            backend: backend.to_string(),
            reason: err.to_string(),
        }
    }
}
