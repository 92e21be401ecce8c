//! Error types for Drover
//!
//! All modules use `DroverResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Drover operations
pub type DroverResult<T> = Result<T, DroverError>;

/// All errors that can occur in Drover
#[derive(Error, Debug)]
pub enum DroverError {
    // Configuration errors
    #[error("Cluster config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid cluster config: {0}")]
    ConfigInvalid(String),

    #[error("Unsupported provider type: {0}")]
    UnsupportedProvider(String),

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(String),

    // Node errors
    #[error("Head node not found for cluster: {0}")]
    HeadNodeNotFound(String),

    #[error("No worker nodes found for cluster: {0}")]
    NoWorkersFound(String),

    #[error("Head node failed to become ready within {timeout_secs}s")]
    HeadNodeTimeout { timeout_secs: u64 },

    // Update errors
    #[error("Updating node {node} failed with exit code {code}")]
    UpdateFailed { node: String, code: i32 },

    // Signal channel errors
    #[error("Signal channel error: {0}")]
    Signal(String),

    // User interaction
    #[error("Operation aborted by user")]
    Aborted,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, exit code: {code}, stderr: {stderr}")]
    CommandExecution {
        command: String,
        code: i32,
        stderr: String,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl DroverError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Whether the operation may succeed on a later attempt. The
    /// teardown convergence loop swallows these and re-queries; anything
    /// else aborts the loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Signal(_) | Self::HeadNodeTimeout { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound(_) => Some("Check the cluster config path"),
            Self::UnsupportedProvider(_) => {
                Some("Register the provider backend, or use type: mock for local testing")
            }
            Self::HeadNodeTimeout { .. } => {
                Some("Check the provider console for stuck instances, then re-run drover up")
            }
            Self::HeadNodeNotFound(_) => Some("Run: drover up <cluster config>"),
            Self::Signal(_) => Some("Check DROVER_REDIS_URL points at a reachable instance"),
            _ => None,
        }
    }
}
