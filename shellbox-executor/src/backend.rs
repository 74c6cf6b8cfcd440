//! Container runtime abstraction trait.
//!
//! Allows swapping the Docker Engine backend for another runtime (or the
//! in-memory fake used in tests) without changing lifecycle or exec logic.

use std::time::Duration;

use async_trait::async_trait;
use shellbox_core::{EnvironmentId, ExecId, ResourceLimits};
use tokio::sync::mpsc;

use crate::ExecutorError;

/// Raw output chunks of a running exec, in arrival order.
///
/// Chunks are not frame aligned. The channel closes when the exec's output
/// stream ends.
pub type OutputChunks = mpsc::Receiver<Result<Vec<u8>, ExecutorError>>;

/// Everything the runtime needs to create one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ContainerSpec {
    /// Unique container name.
    pub name: String,
    /// Image to create the container from.
    pub image: String,
    /// Memory and network limits.
    pub limits: ResourceLimits,
}

impl ContainerSpec {
    /// Create a spec.
    #[must_use]
    pub fn new(name: String, image: String, limits: ResourceLimits) -> Self {
        Self { name, image, limits }
    }
}

/// An exec attached to stdout and stderr.
#[derive(Debug)]
#[non_exhaustive]
pub struct ExecAttachment {
    /// Runtime id of the exec, used to fetch its exit code.
    pub exec_id: ExecId,
    /// Multiplexed output stream.
    pub output: OutputChunks,
}

impl ExecAttachment {
    /// Create an attachment.
    #[must_use]
    pub fn new(exec_id: ExecId, output: OutputChunks) -> Self {
        Self { exec_id, output }
    }
}

/// Container runtime abstraction.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait EnvironmentRuntime: Send + Sync {
    /// Create (but do not start) a container.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ApiStatus`] if the runtime rejects the spec,
    /// e.g. when the image is missing or the name is taken.
    async fn create(&self, spec: &ContainerSpec) -> Result<EnvironmentId, ExecutorError>;

    /// Start a created container.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ApiStatus`] if the runtime cannot start it.
    async fn start(&self, id: &EnvironmentId) -> Result<(), ExecutorError>;

    /// Run `argv` inside a running container with stdout and stderr attached.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ApiStatus`] or [`ExecutorError::ApiError`] if
    /// the exec cannot be created or started.
    async fn exec(&self, id: &EnvironmentId, argv: &[String]) -> Result<ExecAttachment, ExecutorError>;

    /// Exit code of an exec. Only meaningful once its output stream has ended.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ApiStatus`] if the exec is unknown.
    async fn exec_exit_code(&self, exec_id: &ExecId) -> Result<Option<i64>, ExecutorError>;

    /// Ask a container to stop, killing it after `grace`.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ApiStatus`] if the runtime refuses.
    async fn stop(&self, id: &EnvironmentId, grace: Duration) -> Result<(), ExecutorError>;

    /// Forcibly remove a container, running or not.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ApiStatus`] if the runtime refuses.
    async fn remove(&self, id: &EnvironmentId) -> Result<(), ExecutorError>;

    /// Check if the runtime is reachable.
    ///
    /// # Errors
    /// Returns [`ExecutorError::RuntimeUnavailable`] or [`ExecutorError::ApiError`]
    /// if the runtime is not ready.
    async fn health_check(&self) -> Result<(), ExecutorError>;
}
