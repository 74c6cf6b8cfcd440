//! Environment lifecycle states, resource limits, and naming.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::SessionId;

/// Memory ceiling applied to every environment: 512 MiB.
pub const DEFAULT_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Prefix of every environment name.
pub const NAME_PREFIX: &str = "terminal-session";

const MAX_NAME_SESSION_LEN: usize = 64;

/// Lifecycle state of an execution environment.
///
/// `Starting -> Running -> Stopping -> Removed`. `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EnvironmentStatus {
    /// Created by the runtime but not yet started.
    Starting,
    /// Started and accepting exec requests.
    Running,
    /// A stop or remove request is in flight.
    Stopping,
    /// Gone from the runtime.
    Removed,
}

impl EnvironmentStatus {
    /// Returns `true` if `self -> next` is a legal transition.
    ///
    /// A failed start may skip straight from `Starting` to `Stopping`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running | Self::Stopping)
                | (Self::Running, Self::Stopping)
                | (Self::Stopping, Self::Removed)
        )
    }

    /// Returns the next state or an error if the move is illegal.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] if `next` is not reachable from `self`.
    pub fn transition(self, next: Self) -> Result<Self, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition { from: self, to: next })
        }
    }

    /// Returns `true` once the environment no longer exists.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Removed
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Network isolation applied to an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum NetworkMode {
    /// No network interfaces besides loopback.
    #[default]
    None,
}

impl NetworkMode {
    /// Returns the runtime's name for this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
        }
    }
}

/// Limits fixed when an environment is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ResourceLimits {
    /// Memory ceiling in bytes.
    pub memory_bytes: u64,
    /// Network isolation mode.
    pub network: NetworkMode,
}

impl ResourceLimits {
    /// Creates limits with the given memory ceiling and no network.
    #[must_use]
    pub const fn with_memory(memory_bytes: u64) -> Self {
        Self {
            memory_bytes,
            network: NetworkMode::None,
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::with_memory(DEFAULT_MEMORY_BYTES)
    }
}

/// Builds the runtime name for a session's environment.
///
/// Format: `terminal-session-<session>-<unix millis>`. Characters outside
/// `[A-Za-z0-9_.-]` are replaced by `-` and the session part is capped at
/// 64 characters, so any session id yields a name the runtime accepts.
#[must_use]
pub fn environment_name(session_id: &SessionId, created_at: DateTime<Utc>) -> String {
    let session: String = session_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(MAX_NAME_SESSION_LEN)
        .collect();
    format!("{NAME_PREFIX}-{session}-{}", created_at.timestamp_millis())
}
