//! Docker Engine backend implementation.
//!
//! Manages containers via the Docker Engine API (HTTP over Unix domain
//! socket).
//!
//! # API Reference
//! Docker Engine API: `https://docs.docker.com/engine/api/`

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::Method;
use serde::Deserialize;
use shellbox_core::{EnvironmentId, ExecId};
use tokio::sync::mpsc;

use crate::backend::{ContainerSpec, EnvironmentRuntime, ExecAttachment};
use crate::unix_client::{api_request, api_stream};
use crate::ExecutorError;

/// Default location of the Docker Engine socket.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Output chunks buffered between the socket reader and the consumer.
const OUTPUT_BUFFER: usize = 64;

/// Docker Engine backend.
///
/// Every call opens a fresh connection to the engine socket.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    /// Path to the engine's Unix socket.
    socket_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecInspect {
    exit_code: Option<i64>,
    #[serde(default)]
    running: bool,
}

impl DockerBackend {
    /// Create a backend talking to the engine at `socket_path`.
    #[must_use]
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Create a backend using the default socket path.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(PathBuf::from(DEFAULT_SOCKET))
    }

    /// Path of the engine socket.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn create_body(spec: &ContainerSpec) -> serde_json::Value {
        serde_json::json!({
            "Image": spec.image,
            "Tty": true,
            "OpenStdin": true,
            "AttachStdin": true,
            "AttachStdout": true,
            "AttachStderr": true,
            "HostConfig": {
                "Memory": spec.limits.memory_bytes,
                "NetworkMode": spec.limits.network.as_str(),
            },
        })
    }

    fn exec_body(argv: &[String]) -> serde_json::Value {
        // No TTY: the engine multiplexes stdout and stderr into frames.
        serde_json::json!({
            "Cmd": argv,
            "AttachStdin": false,
            "AttachStdout": true,
            "AttachStderr": true,
            "Tty": false,
        })
    }

    fn parse_id(body: &str, what: &str) -> Result<IdResponse, ExecutorError> {
        serde_json::from_str(body)
            .map_err(|e| ExecutorError::ApiError(format!("malformed {what} response: {e}")))
    }
}

#[async_trait]
impl EnvironmentRuntime for DockerBackend {
    async fn create(&self, spec: &ContainerSpec) -> Result<EnvironmentId, ExecutorError> {
        tracing::info!(name = %spec.name, image = %spec.image, "creating container");

        let body = api_request(
            &self.socket_path,
            Method::POST,
            &format!("/containers/create?name={}", spec.name),
            Some(Self::create_body(spec).to_string()),
        )
        .await?;

        let created = Self::parse_id(&body, "container create")?;
        for warning in created.warnings.iter().flatten() {
            tracing::warn!(name = %spec.name, %warning, "container create warning");
        }

        Ok(EnvironmentId::new(created.id))
    }

    async fn start(&self, id: &EnvironmentId) -> Result<(), ExecutorError> {
        api_request(
            &self.socket_path,
            Method::POST,
            &format!("/containers/{id}/start"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn exec(&self, id: &EnvironmentId, argv: &[String]) -> Result<ExecAttachment, ExecutorError> {
        let body = api_request(
            &self.socket_path,
            Method::POST,
            &format!("/containers/{id}/exec"),
            Some(Self::exec_body(argv).to_string()),
        )
        .await?;
        let exec_id = ExecId::new(Self::parse_id(&body, "exec create")?.id);

        let start_body = serde_json::json!({ "Detach": false, "Tty": false });
        let mut stream = api_stream(
            &self.socket_path,
            Method::POST,
            &format!("/exec/{exec_id}/start"),
            Some(start_body.to_string()),
        )
        .await?;

        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        let reader_exec_id = exec_id.clone();
        tokio::spawn(async move {
            loop {
                let item = match stream.frame().await {
                    None => break,
                    Some(Ok(frame)) => match frame.into_data() {
                        Ok(data) => Ok(data.to_vec()),
                        // Trailers carry no output.
                        Err(_) => continue,
                    },
                    Some(Err(e)) => Err(ExecutorError::ApiError(format!("read exec stream: {e}"))),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    tracing::debug!(exec_id = %reader_exec_id, "exec output receiver dropped");
                    break;
                }
                if failed {
                    break;
                }
            }
        });

        Ok(ExecAttachment::new(exec_id, rx))
    }

    async fn exec_exit_code(&self, exec_id: &ExecId) -> Result<Option<i64>, ExecutorError> {
        let body = api_request(
            &self.socket_path,
            Method::GET,
            &format!("/exec/{exec_id}/json"),
            None,
        )
        .await?;
        let inspect: ExecInspect = serde_json::from_str(&body)
            .map_err(|e| ExecutorError::ApiError(format!("malformed exec inspect response: {e}")))?;
        if inspect.running {
            tracing::warn!(%exec_id, "exec still running after its stream ended");
        }
        Ok(inspect.exit_code)
    }

    async fn stop(&self, id: &EnvironmentId, grace: Duration) -> Result<(), ExecutorError> {
        api_request(
            &self.socket_path,
            Method::POST,
            &format!("/containers/{id}/stop?t={}", grace.as_secs()),
            None,
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &EnvironmentId) -> Result<(), ExecutorError> {
        match api_request(
            &self.socket_path,
            Method::DELETE,
            &format!("/containers/{id}?force=true"),
            None,
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(environment_id = %id.short(), "container already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        if !tokio::fs::try_exists(&self.socket_path).await.unwrap_or(false) {
            return Err(ExecutorError::RuntimeUnavailable {
                path: self.socket_path.clone(),
            });
        }
        api_request(&self.socket_path, Method::GET, "/_ping", None).await?;
        Ok(())
    }
}
