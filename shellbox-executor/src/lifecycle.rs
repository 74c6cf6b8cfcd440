//! Environment lifecycle manager wrapping an [`EnvironmentRuntime`].
//!
//! Provisions one container per call to [`LifecycleManager::create`] and
//! tears it down best-effort in [`LifecycleManager::destroy`].

use std::sync::Arc;

use chrono::Utc;
use shellbox_core::{environment_name, EnvironmentStatus, SessionId};

use crate::backend::{ContainerSpec, EnvironmentRuntime};
use crate::{EnvironmentConfig, EnvironmentHandle, ExecutorError};

/// Result of [`LifecycleManager::destroy`].
///
/// Teardown never fails the caller. A failed removal leaves a stale container
/// behind; it is logged and reported here so callers can count it.
#[derive(Debug)]
#[non_exhaustive]
pub enum TeardownOutcome {
    /// The environment is gone.
    Removed,
    /// Graceful stop failed but forced removal succeeded.
    RemovedAfterStopFailure {
        /// Why the stop failed.
        reason: String,
    },
    /// Forced removal failed; the environment may still exist.
    Failed {
        /// The [`ExecutorError::Teardown`] describing the failure.
        error: ExecutorError,
    },
}

impl TeardownOutcome {
    /// Returns `true` if the environment no longer exists.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Creates and destroys environments with a fixed configuration.
///
/// All operations are safe to call concurrently.
pub struct LifecycleManager<B: EnvironmentRuntime> {
    runtime: Arc<B>,
    config: EnvironmentConfig,
}

impl<B: EnvironmentRuntime> LifecycleManager<B> {
    /// Create a manager backed by the given runtime.
    #[must_use]
    pub fn new(runtime: Arc<B>, config: EnvironmentConfig) -> Self {
        Self { runtime, config }
    }

    /// The configuration every environment is created with.
    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Provision and start a fresh environment for `session_id`.
    ///
    /// A container that is created but fails to start is removed before the
    /// error is returned.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Provision`] if the runtime cannot create or
    /// start the environment. Not retried.
    pub async fn create(&self, session_id: &SessionId) -> Result<EnvironmentHandle, ExecutorError> {
        let created_at = Utc::now();
        let name = environment_name(session_id, created_at);
        let spec = ContainerSpec::new(name.clone(), self.config.image.clone(), self.config.limits);

        tracing::info!(session_id = %session_id, %name, "creating environment");

        let id = self
            .runtime
            .create(&spec)
            .await
            .map_err(|e| ExecutorError::Provision(format!("create {name}: {e}")))?;

        let handle = EnvironmentHandle::new(id, name, session_id.clone(), self.config.limits, created_at);

        if let Err(e) = self.runtime.start(&handle.id).await {
            tracing::error!(
                session_id = %session_id,
                environment_id = %handle.id.short(),
                error = %e,
                "environment failed to start"
            );
            let _ = self.destroy(&handle).await;
            return Err(ExecutorError::Provision(format!("start {}: {e}", handle.name)));
        }
        handle.advance(EnvironmentStatus::Running)?;

        tracing::info!(
            session_id = %session_id,
            environment_id = %handle.id.short(),
            "environment started"
        );

        Ok(handle)
    }

    /// Stop (with the configured grace period) and then force-remove an
    /// environment.
    ///
    /// Removal is attempted whether or not the stop succeeded. Failures are
    /// logged and returned in the outcome, never as an error.
    pub async fn destroy(&self, handle: &EnvironmentHandle) -> TeardownOutcome {
        let id = &handle.id;
        if handle.status().is_terminal() {
            return TeardownOutcome::Removed;
        }
        if let Err(e) = handle.advance(EnvironmentStatus::Stopping) {
            tracing::debug!(environment_id = %id.short(), error = %e, "environment already stopping");
        }

        let stop_failure = match self.runtime.stop(id, self.config.stop_grace()).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    environment_id = %id.short(),
                    error = %e,
                    "could not stop environment; forcing removal"
                );
                Some(e.to_string())
            }
        };

        if let Err(e) = self.runtime.remove(id).await {
            tracing::warn!(
                environment_id = %id.short(),
                error = %e,
                "could not remove environment; leaving it behind"
            );
            return TeardownOutcome::Failed {
                error: ExecutorError::Teardown {
                    environment_id: id.clone(),
                    reason: e.to_string(),
                },
            };
        }

        if let Err(e) = handle.advance(EnvironmentStatus::Removed) {
            tracing::debug!(environment_id = %id.short(), error = %e, "environment already removed");
        }
        tracing::info!(environment_id = %id.short(), "environment removed");

        match stop_failure {
            None => TeardownOutcome::Removed,
            Some(reason) => TeardownOutcome::RemovedAfterStopFailure { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use shellbox_core::{EnvironmentId, ExecId};

    use super::*;
    use crate::backend::ExecAttachment;

    struct AlwaysFailBackend;

    #[async_trait]
    impl EnvironmentRuntime for AlwaysFailBackend {
        async fn create(&self, _spec: &ContainerSpec) -> Result<EnvironmentId, ExecutorError> {
            Err(ExecutorError::ApiError("mock always fails".to_owned()))
        }

        async fn start(&self, _id: &EnvironmentId) -> Result<(), ExecutorError> {
            Err(ExecutorError::ApiError("mock".to_owned()))
        }

        async fn exec(&self, _id: &EnvironmentId, _argv: &[String]) -> Result<ExecAttachment, ExecutorError> {
            Err(ExecutorError::ApiError("mock".to_owned()))
        }

        async fn exec_exit_code(&self, _exec_id: &ExecId) -> Result<Option<i64>, ExecutorError> {
            Err(ExecutorError::ApiError("mock".to_owned()))
        }

        async fn stop(&self, _id: &EnvironmentId, _grace: Duration) -> Result<(), ExecutorError> {
            Err(ExecutorError::ApiError("mock".to_owned()))
        }

        async fn remove(&self, _id: &EnvironmentId) -> Result<(), ExecutorError> {
            Err(ExecutorError::ApiError("mock".to_owned()))
        }

        async fn health_check(&self) -> Result<(), ExecutorError> {
            Ok(())
        }
    }

    fn session() -> SessionId {
        match SessionId::parse("lifecycle-test") {
            Ok(s) => s,
            Err(e) => panic!("valid session id rejected: {e}"),
        }
    }

    #[tokio::test]
    async fn create_maps_runtime_failure_to_provision_error() {
        let manager = LifecycleManager::new(Arc::new(AlwaysFailBackend), EnvironmentConfig::default());
        let result = manager.create(&session()).await;
        assert!(
            matches!(result, Err(ExecutorError::Provision(_))),
            "create must map runtime errors to Provision"
        );
    }

    #[tokio::test]
    async fn destroy_never_errors_and_reports_teardown_failure() {
        let manager = LifecycleManager::new(Arc::new(AlwaysFailBackend), EnvironmentConfig::default());
        let handle = EnvironmentHandle::new(
            EnvironmentId::new("stale"),
            "terminal-session-x-0".to_owned(),
            session(),
            shellbox_core::ResourceLimits::default(),
            Utc::now(),
        );
        let outcome = manager.destroy(&handle).await;
        assert!(!outcome.is_removed());
        match outcome {
            TeardownOutcome::Failed { error } => {
                assert!(matches!(error, ExecutorError::Teardown { .. }));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(handle.status(), EnvironmentStatus::Stopping);
    }

    mod with_fake {
        use super::*;
        use crate::fake::FakeRuntime;

        #[tokio::test]
        async fn create_starts_environment_with_configured_limits() {
            let runtime = Arc::new(FakeRuntime::new());
            let manager = LifecycleManager::new(Arc::clone(&runtime), EnvironmentConfig::default());
            let handle = match manager.create(&session()).await {
                Ok(h) => h,
                Err(e) => panic!("create failed: {e}"),
            };
            assert_eq!(handle.status(), EnvironmentStatus::Running);
            assert!(handle.name.starts_with("terminal-session-lifecycle-test-"));
            assert_eq!(handle.limits.memory_bytes, 512 * 1024 * 1024);
            assert!(runtime.is_running(&handle.id));
        }

        #[tokio::test]
        async fn failed_start_removes_half_created_container() {
            let runtime = Arc::new(FakeRuntime::new());
            runtime.fail_start(true);
            let manager = LifecycleManager::new(Arc::clone(&runtime), EnvironmentConfig::default());
            let result = manager.create(&session()).await;
            assert!(matches!(result, Err(ExecutorError::Provision(_))));
            assert_eq!(runtime.created_count(), 1);
            assert_eq!(runtime.live_count(), 0, "half-created container must be removed");
        }

        #[tokio::test]
        async fn destroy_removes_even_when_stop_fails() {
            let runtime = Arc::new(FakeRuntime::new());
            let manager = LifecycleManager::new(Arc::clone(&runtime), EnvironmentConfig::default());
            let handle = match manager.create(&session()).await {
                Ok(h) => h,
                Err(e) => panic!("create failed: {e}"),
            };
            runtime.fail_stop(true);
            let outcome = manager.destroy(&handle).await;
            assert!(matches!(outcome, TeardownOutcome::RemovedAfterStopFailure { .. }));
            assert_eq!(handle.status(), EnvironmentStatus::Removed);
            assert!(runtime.is_removed(&handle.id));
        }

        #[tokio::test]
        async fn destroy_is_idempotent_once_removed() {
            let runtime = Arc::new(FakeRuntime::new());
            let manager = LifecycleManager::new(Arc::clone(&runtime), EnvironmentConfig::default());
            let handle = match manager.create(&session()).await {
                Ok(h) => h,
                Err(e) => panic!("create failed: {e}"),
            };
            assert!(matches!(manager.destroy(&handle).await, TeardownOutcome::Removed));
            assert!(matches!(manager.destroy(&handle).await, TeardownOutcome::Removed));
            assert_eq!(runtime.remove_calls(), 1);
        }
    }
}
