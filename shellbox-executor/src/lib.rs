//! Container lifecycle management and command execution for shellbox.
//!
//! Provisions one isolated container per session, runs shell commands in it
//! over an attached exec stream, and tears it down best-effort.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod channel;
pub mod config;
pub mod docker;
pub mod error;
pub mod handle;
pub mod lifecycle;
mod unix_client;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use backend::{ContainerSpec, EnvironmentRuntime, ExecAttachment, OutputChunks};
pub use channel::{ExecChannel, DEFAULT_EXEC_TIMEOUT};
pub use config::{EnvironmentConfig, DEFAULT_IMAGE, DEFAULT_STOP_GRACE};
pub use docker::DockerBackend;
pub use error::ExecutorError;
pub use handle::EnvironmentHandle;
pub use lifecycle::{LifecycleManager, TeardownOutcome};

#[cfg(any(test, feature = "testing"))]
pub use fake::FakeRuntime;
