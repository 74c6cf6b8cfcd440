//! Command execution channel — runs one command inside a running environment.
//!
//! The command is handed to the shell verbatim as `sh -c <command>`; no
//! validation is applied. Output is drained through a [`Demultiplexer`] and
//! the exit code is fetched only after the stream has ended.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shellbox_core::{DemuxOutput, Demultiplexer, EnvironmentStatus, StreamKind};

use crate::backend::{EnvironmentRuntime, ExecAttachment};
use crate::{EnvironmentConfig, EnvironmentHandle, ExecutorError};

/// Default deadline for one command: 60 seconds.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs commands in environments and collects their output.
///
/// # Cancel Safety
/// Dropping a [`run`](Self::run) future detaches from the exec's output; the
/// command itself keeps running inside the environment until it exits or
/// the environment is destroyed.
pub struct ExecChannel<B: EnvironmentRuntime> {
    runtime: Arc<B>,
    config: EnvironmentConfig,
    timeout: Duration,
}

impl<B: EnvironmentRuntime> ExecChannel<B> {
    /// Create a channel with the default deadline.
    #[must_use]
    pub fn new(runtime: Arc<B>, config: EnvironmentConfig) -> Self {
        Self::with_timeout(runtime, config, DEFAULT_EXEC_TIMEOUT)
    }

    /// Create a channel with a custom deadline per command.
    #[must_use]
    pub fn with_timeout(runtime: Arc<B>, config: EnvironmentConfig, timeout: Duration) -> Self {
        Self { runtime, config, timeout }
    }

    /// The deadline applied by [`run`](Self::run).
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start `command` in `environment` and return its raw output stream.
    ///
    /// The caller must drain [`ExecAttachment::output`] before asking the
    /// runtime for the exit code.
    ///
    /// # Errors
    /// Returns [`ExecutorError::NotRunning`] if the environment is not running,
    /// or [`ExecutorError::Execution`] if the exec cannot be started.
    pub async fn open(
        &self,
        environment: &EnvironmentHandle,
        command: &str,
    ) -> Result<ExecAttachment, ExecutorError> {
        let status = environment.status();
        if status != EnvironmentStatus::Running {
            return Err(ExecutorError::NotRunning {
                environment_id: environment.id.clone(),
                status,
            });
        }
        self.runtime
            .exec(&environment.id, &self.config.shell_argv(command))
            .await
            .map_err(|e| ExecutorError::Execution(e.to_string()))
    }

    /// Run `command` with the channel's default deadline.
    ///
    /// # Errors
    /// See [`run_with_deadline`](Self::run_with_deadline).
    pub async fn run(
        &self,
        environment: &EnvironmentHandle,
        command: &str,
    ) -> Result<DemuxOutput, ExecutorError> {
        self.run_with_deadline(environment, command, self.timeout).await
    }

    /// Run `command`, demultiplex its output, and fetch its exit code, all
    /// within `deadline`.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Timeout`] if the deadline passes,
    /// [`ExecutorError::NotRunning`] if the environment is not running, and
    /// [`ExecutorError::Execution`] for any exec or stream failure. Output
    /// captured before a failure is discarded.
    pub async fn run_with_deadline(
        &self,
        environment: &EnvironmentHandle,
        command: &str,
        deadline: Duration,
    ) -> Result<DemuxOutput, ExecutorError> {
        let started = Instant::now();
        let output = tokio::time::timeout(deadline, self.drain(environment, command))
            .await
            .map_err(|_| ExecutorError::Timeout(deadline))??;

        tracing::debug!(
            session_id = %environment.session_id,
            transcript = %output.transcript.trim_end(),
            "full terminal output"
        );
        if output.truncated > 0 {
            tracing::warn!(
                environment_id = %environment.id.short(),
                bytes = output.truncated,
                "output stream ended inside a frame; discarded the partial frame"
            );
        }
        if output.overflow > 0 {
            tracing::warn!(
                environment_id = %environment.id.short(),
                bytes = output.overflow,
                "command output exceeded the capture limit; excess discarded"
            );
        }
        tracing::info!(
            session_id = %environment.session_id,
            exit_code = ?output.result.exit_code,
            frames = output.frames,
            elapsed_ms = started.elapsed().as_millis(),
            "command finished"
        );

        Ok(output)
    }

    async fn drain(
        &self,
        environment: &EnvironmentHandle,
        command: &str,
    ) -> Result<DemuxOutput, ExecutorError> {
        let ExecAttachment { exec_id, mut output } = self.open(environment, command).await?;
        let mut demux = Demultiplexer::new();

        while let Some(chunk) = output.recv().await {
            let chunk = chunk.map_err(|e| ExecutorError::Execution(e.to_string()))?;
            for frame in demux.push(&chunk) {
                match frame.kind {
                    StreamKind::Stdout | StreamKind::Stderr => tracing::debug!(
                        session_id = %environment.session_id,
                        stream = ?frame.kind,
                        output = %String::from_utf8_lossy(&frame.payload).trim(),
                        "output frame"
                    ),
                    StreamKind::Unknown(tag) => tracing::debug!(
                        session_id = %environment.session_id,
                        tag,
                        len = frame.payload.len(),
                        "skipping frame with unknown stream tag"
                    ),
                }
            }
        }

        let exit_code = self
            .runtime
            .exec_exit_code(&exec_id)
            .await
            .map_err(|e| ExecutorError::Execution(e.to_string()))?;

        Ok(demux.finish(exit_code))
    }
}
