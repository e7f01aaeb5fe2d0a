//! Error types for the Loadgate controller
//!
//! Provides a unified error type and domain-specific error variants.
//! Nothing in this subsystem is fatal to the host process: signal failures
//! are contained by the read path, and reconfiguration errors are rejected
//! synchronously without partial state changes.

use thiserror::Error;

/// Result type alias using LoadgateError
pub type Result<T> = std::result::Result<T, LoadgateError>;

/// Unified error type for Loadgate operations
#[derive(Debug, Error)]
pub enum LoadgateError {
    // Signal errors
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    // Reconfiguration errors
    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    // Metrics/state store errors
    #[error("Store error: {0}")]
    Store(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Signal read-path errors
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal_disabled")]
    Disabled,

    #[error("metrics backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("malformed sample in window: {0}")]
    MalformedSample(String),
}

/// Hot-reconfiguration errors. Every variant carries the set of valid
/// names so a rejection payload can tell the operator what exists.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown_policy: {requested} (available: {available:?})")]
    UnknownPolicy {
        requested: String,
        available: Vec<String>,
    },

    #[error("unknown_signal: {requested} (available: {available:?})")]
    UnknownSignal {
        requested: String,
        available: Vec<String>,
    },

    #[error("unknown_actuator: {requested} (available: {available:?})")]
    UnknownActuator {
        requested: String,
        available: Vec<String>,
    },
}

// Implement From for common external error types
impl From<serde_json::Error> for LoadgateError {
    fn from(err: serde_json::Error) -> Self {
        LoadgateError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for LoadgateError {
    fn from(err: anyhow::Error) -> Self {
        LoadgateError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadgateError::Signal(SignalError::BackendUnreachable(
            "redis://localhost:6379".to_string(),
        ));
        assert!(err.to_string().contains("redis://localhost:6379"));
    }

    #[test]
    fn test_unknown_policy_lists_available() {
        let err = ControlError::UnknownPolicy {
            requested: "bandit".to_string(),
            available: vec!["aimd".to_string(), "pid".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("unknown_policy"));
        assert!(msg.contains("aimd"));
        assert!(msg.contains("pid"));
    }
}
