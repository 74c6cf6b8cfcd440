//! Environment handle — represents one provisioned container.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use shellbox_core::{CoreError, EnvironmentId, EnvironmentStatus, ResourceLimits, SessionId};

/// A handle to an environment owned by exactly one session.
///
/// Dropping this handle does NOT remove the environment. Call
/// [`LifecycleManager::destroy`](crate::LifecycleManager::destroy) explicitly.
#[derive(Debug)]
#[non_exhaustive]
pub struct EnvironmentHandle {
    /// Identifier assigned by the runtime.
    pub id: EnvironmentId,

    /// Runtime name, `terminal-session-<session>-<millis>`.
    pub name: String,

    /// The session that owns this environment.
    pub session_id: SessionId,

    /// Limits the environment was created with.
    pub limits: ResourceLimits,

    /// Timestamp when the environment was created.
    pub created_at: DateTime<Utc>,

    status: Mutex<EnvironmentStatus>,
}

impl EnvironmentHandle {
    /// Create a handle for a freshly created environment in the `Starting` state.
    #[must_use]
    pub fn new(
        id: EnvironmentId,
        name: String,
        session_id: SessionId,
        limits: ResourceLimits,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            session_id,
            limits,
            created_at,
            status: Mutex::new(EnvironmentStatus::Starting),
        }
    }

    /// Current lifecycle state.
    ///
    /// # Panics
    /// Panics if the status lock is poisoned.
    #[must_use]
    pub fn status(&self) -> EnvironmentStatus {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let status = self.status.lock().expect("environment status lock poisoned");
        *status
    }

    /// Move to `next`, enforcing the lifecycle state machine.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] if `next` is unreachable.
    ///
    /// # Panics
    /// Panics if the status lock is poisoned.
    pub(crate) fn advance(&self, next: EnvironmentStatus) -> Result<EnvironmentStatus, CoreError> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut status = self.status.lock().expect("environment status lock poisoned");
        *status = status.transition(next)?;
        Ok(*status)
    }
}
