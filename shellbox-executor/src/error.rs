//! Error types for the executor crate.

use std::path::PathBuf;
use std::time::Duration;

use shellbox_core::{CoreError, EnvironmentId, EnvironmentStatus};

/// Errors that can occur during environment lifecycle and exec operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The runtime's API socket does not exist.
    #[error("container runtime socket not found at {path}")]
    RuntimeUnavailable { path: PathBuf },

    /// The environment could not be created or started.
    #[error("environment provisioning failed: {0}")]
    Provision(String),

    /// The exec could not be started, or its output stream failed.
    #[error("command execution failed: {0}")]
    Execution(String),

    /// Stop or remove failed. Absorbed by the lifecycle manager.
    #[error("teardown of environment {environment_id} failed: {reason}")]
    Teardown {
        environment_id: EnvironmentId,
        reason: String,
    },

    /// The command did not finish before its deadline.
    #[error("command did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    /// An exec was attempted on an environment that is not running.
    #[error("environment {environment_id} is {status}, not running")]
    NotRunning {
        environment_id: EnvironmentId,
        status: EnvironmentStatus,
    },

    /// The runtime answered with an error status.
    #[error("HTTP {status} from {path}: {message}")]
    ApiStatus {
        status: u16,
        path: String,
        message: String,
    },

    /// Transport-level failure talking to the runtime API.
    #[error("API request failed: {0}")]
    ApiError(String),

    /// A lifecycle state transition was rejected.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Returns `true` if the runtime reported that the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiStatus { status: 404, .. })
    }
}
