//! Session service — ties the registry, lifecycle manager, and exec channel
//! together behind the run/reset operations the HTTP routes expose.

use std::sync::Arc;
use std::time::Duration;

use shellbox_core::{DemuxOutput, SessionId};
use shellbox_executor::{
    EnvironmentConfig, EnvironmentHandle, EnvironmentRuntime, ExecChannel, LifecycleManager,
    TeardownOutcome,
};
use tracing::{error, info, warn};

use crate::error::GatewayError;
use crate::registry::SessionRegistry;

/// Runs commands in per-session environments.
pub struct SessionService<B: EnvironmentRuntime> {
    registry: SessionRegistry,
    lifecycle: LifecycleManager<B>,
    channel: ExecChannel<B>,
}

impl<B: EnvironmentRuntime> SessionService<B> {
    /// Create a service over `runtime`.
    ///
    /// # Arguments
    /// - `config`: how environments are provisioned
    /// - `exec_timeout`: deadline for each command
    /// - `max_environments`: how many sessions may hold an environment at once
    #[must_use]
    pub fn new(
        runtime: Arc<B>,
        config: EnvironmentConfig,
        exec_timeout: Duration,
        max_environments: usize,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(max_environments),
            lifecycle: LifecycleManager::new(Arc::clone(&runtime), config.clone()),
            channel: ExecChannel::with_timeout(runtime, config, exec_timeout),
        }
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run `command` in the session's environment, provisioning one first if
    /// the session has none.
    ///
    /// Concurrent first requests for the same session provision exactly one
    /// environment: the registry guard is held until it is bound, then
    /// released before the command runs.
    ///
    /// # Errors
    /// Returns [`GatewayError::CapacityExhausted`] if a new environment is
    /// needed and none is available, [`GatewayError::Provision`] if it cannot
    /// be created, and [`GatewayError::Execution`] if the command fails to run.
    pub async fn run(&self, session_id: &SessionId, command: &str) -> Result<DemuxOutput, GatewayError> {
        let environment = self.ensure_environment(session_id).await?;

        info!(
            session_id = %session_id,
            environment_id = %environment.id.short(),
            command,
            "running command"
        );

        self.channel
            .run(&environment, command)
            .await
            .map_err(|e| {
                error!(session_id = %session_id, error = %e, "execution failed");
                GatewayError::Execution(e)
            })
    }

    /// Tear down the session's environment, if any, and bind a fresh one.
    ///
    /// Teardown failures are logged and do not stop the replacement from
    /// being provisioned.
    ///
    /// # Errors
    /// Returns [`GatewayError::CapacityExhausted`] if the session had no
    /// environment and none is available, or [`GatewayError::Reset`] if the
    /// replacement cannot be provisioned.
    pub async fn reset(&self, session_id: &SessionId) -> Result<Arc<EnvironmentHandle>, GatewayError> {
        info!(session_id = %session_id, "resetting environment");

        let mut guard = self.registry.lock(session_id).await;
        let reservation = match guard.unbind() {
            Some((old, reservation)) => {
                self.retire(&old).await;
                reservation
            }
            None => guard.reserve()?,
        };

        let fresh = self.lifecycle.create(session_id).await.map_err(|e| {
            error!(session_id = %session_id, error = %e, "reset failed");
            GatewayError::Reset(e)
        })?;
        // The slot was emptied by `unbind` above, so nothing is superseded.
        let (fresh, _) = guard.bind(fresh, reservation);
        Ok(fresh)
    }

    /// Unbind every session and destroy its environment.
    pub async fn shutdown(&self) {
        let environments = self.registry.drain().await;
        info!(count = environments.len(), "tearing down environments");
        for environment in environments {
            self.retire(&environment).await;
        }
    }

    async fn ensure_environment(&self, session_id: &SessionId) -> Result<Arc<EnvironmentHandle>, GatewayError> {
        let mut guard = self.registry.lock(session_id).await;
        if let Some(environment) = guard.current() {
            return Ok(environment);
        }

        let reservation = guard.reserve().inspect_err(|e| {
            warn!(session_id = %session_id, error = %e, "refusing to provision");
        })?;
        let environment = self.lifecycle.create(session_id).await.map_err(|e| {
            error!(session_id = %session_id, error = %e, "environment creation failed");
            GatewayError::Provision(e)
        })?;
        // `current()` was empty under this guard, so nothing is superseded.
        let (environment, _) = guard.bind(environment, reservation);
        Ok(environment)
    }

    async fn retire(&self, environment: &EnvironmentHandle) {
        match self.lifecycle.destroy(environment).await {
            TeardownOutcome::Failed { error } => warn!(
                session_id = %environment.session_id,
                error = %error,
                "stale environment left behind"
            ),
            outcome => info!(
                session_id = %environment.session_id,
                environment_id = %environment.id.short(),
                ?outcome,
                "environment retired"
            ),
        }
    }
}
