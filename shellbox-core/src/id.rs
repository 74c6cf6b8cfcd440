use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Longest session id accepted from callers, in bytes.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Caller-supplied identifier scoping a sequence of commands to one environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub struct SessionId(String);

impl SessionId {
    /// Validates and wraps a session id.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidSessionId`] if the id is empty, whitespace
    /// only, or longer than [`MAX_SESSION_ID_LEN`] bytes.
    pub fn parse(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidSessionId {
                reason: "must not be empty".to_owned(),
            });
        }
        if id.len() > MAX_SESSION_ID_LEN {
            return Err(CoreError::InvalidSessionId {
                reason: format!("must be at most {MAX_SESSION_ID_LEN} bytes, got {}", id.len()),
            });
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Identifier assigned to an environment by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EnvironmentId(pub String);

impl EnvironmentId {
    /// Creates an `EnvironmentId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 12 characters, the form container runtimes print.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one exec instance inside an environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ExecId(pub String);

impl ExecId {
    /// Creates an `ExecId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
