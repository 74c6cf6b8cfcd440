//! Environment configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellbox_core::ResourceLimits;

/// Base image used when none is configured.
pub const DEFAULT_IMAGE: &str = "ubuntu:latest";

/// Grace period given to a stopping environment before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// How every environment is provisioned and torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EnvironmentConfig {
    /// Image the environment is created from.
    pub image: String,

    /// Limits fixed at creation.
    pub limits: ResourceLimits,

    /// Shell binary commands are passed to as `<shell> -c <command>`.
    pub shell: String,

    /// Seconds to wait for a graceful stop before the runtime kills it.
    pub stop_grace_secs: u64,
}

impl EnvironmentConfig {
    /// Create a config for the given image with the default limits.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            limits: ResourceLimits::default(),
            shell: "sh".to_owned(),
            stop_grace_secs: DEFAULT_STOP_GRACE.as_secs(),
        }
    }

    /// Grace period as a [`Duration`].
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Builds the argv for running `command` through the shell.
    #[must_use]
    pub fn shell_argv(&self, command: &str) -> Vec<String> {
        vec![self.shell.clone(), "-c".to_owned(), command.to_owned()]
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE)
    }
}
