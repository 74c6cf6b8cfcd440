use serde::{Deserialize, Serialize};

/// Outcome of one command run inside an environment.
///
/// Transient: built once per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ExecutionResult {
    /// Captured standard output, trailing whitespace trimmed.
    pub stdout: String,
    /// Captured standard error, trailing whitespace trimmed.
    pub stderr: String,
    /// Exit code reported by the runtime, if it reported one.
    pub exit_code: Option<i64>,
}

impl ExecutionResult {
    /// Creates a result, trimming trailing whitespace from both streams.
    #[must_use]
    pub fn new(stdout: &str, stderr: &str, exit_code: Option<i64>) -> Self {
        Self {
            stdout: trim_output(stdout).to_owned(),
            stderr: trim_output(stderr).to_owned(),
            exit_code,
        }
    }

    /// Returns `true` if the command exited with status 0.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Strips trailing whitespace. Idempotent.
#[must_use]
pub fn trim_output(s: &str) -> &str {
    s.trim_end()
}
