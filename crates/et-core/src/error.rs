//! Core error types for ecs-tunnel

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for tunnel orchestration
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Configuration error (including a missing session executable)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The control plane reported a failure for the requested task
    #[error("Task failure for {task}. Reason: {reason}")]
    TaskFailure { task: String, reason: String },

    /// The container could not be uniquely identified
    #[error("Task runtime id could not be resolved: {0}")]
    Resolution(String),

    /// The session process never printed its ready marker
    #[error("Session manager did not reach \"Waiting for connections\" within {timeout:?}. Output: {output}")]
    HandshakeTimeout { timeout: Duration, output: String },

    /// The session process exited before printing its ready marker
    #[error("Session manager exited before it was ready. Output: {output}")]
    SessionExited { output: String },

    /// The session process could not be spawned
    #[error("Failed to spawn session manager: {0}")]
    Spawn(#[source] std::io::Error),

    /// Probing a local port failed for a reason other than "in use"
    #[error("Port allocation failed: {0}")]
    Allocation(#[source] std::io::Error),

    /// Every drawn port candidate was already in use
    #[error("No free local port found after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    /// A control-plane request failed
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// Closing could not release every tracked resource
    #[error("Failed to release {} tracked resource(s): {}", failures.len(), failures.join("; "))]
    Close { failures: Vec<String> },
}

/// Error returned by a control-plane request
#[derive(Error, Debug, Clone)]
#[error("{operation} failed: {message}")]
pub struct ControlPlaneError {
    /// API operation name (e.g. `DescribeTasks`)
    pub operation: &'static str,
    /// Rendered error from the underlying client
    pub message: String,
}

impl ControlPlaneError {
    /// Create a new control-plane error
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Session executable not found on PATH
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_mentions_reason() {
        let err = TunnelError::TaskFailure {
            task: "abc123".to_string(),
            reason: "MISSING".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("MISSING"));
    }

    #[test]
    fn test_handshake_timeout_carries_output() {
        let err = TunnelError::HandshakeTimeout {
            timeout: Duration::from_secs(2),
            output: "Starting session with SessionId: x".to_string(),
        };
        assert!(err.to_string().contains("Starting session"));
    }

    #[test]
    fn test_close_lists_failures() {
        let err = TunnelError::Close {
            failures: vec!["session s-1".to_string(), "process 42".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Failed to release 2 tracked resource(s): session s-1; process 42"
        );
    }

    #[test]
    fn test_control_plane_error_converts() {
        let err: TunnelError = ControlPlaneError::new("TerminateSession", "denied").into();
        assert_eq!(err.to_string(), "TerminateSession failed: denied");
    }
}
