use crate::environment::EnvironmentStatus;

/// Errors produced by the `shellbox-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A session id was empty or too long.
    #[error("invalid session id: {reason}")]
    InvalidSessionId { reason: String },

    /// An environment was asked to move to a state it cannot reach.
    #[error("invalid environment transition from {from} to {to}")]
    InvalidTransition {
        from: EnvironmentStatus,
        to: EnvironmentStatus,
    },
}
