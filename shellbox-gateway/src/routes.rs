//! Axum route handlers for the shellbox API.

use std::{path::Path, sync::Arc, time::Instant};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shellbox_core::SessionId;
use shellbox_executor::EnvironmentRuntime;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::{error::GatewayError, service::SessionService};

// ── Request / response types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBody {
    pub session_id: SessionId,
    pub command: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
    pub session_id: SessionId,
}

/// Result of `/api/run`: trimmed stdout, trimmed stderr, and the exit code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub output: String,
    pub error: String,
    pub exit_code: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub output: String,
    pub error: Option<String>,
}

const RESET_COMPLETE: &str = "Terminal environment reset complete. New session started.";

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router over `service`.
///
/// When `static_dir` is given, requests matching no API route are served
/// from it.
pub fn create_router<B>(service: Arc<SessionService<B>>, static_dir: Option<&Path>) -> Router
where
    B: EnvironmentRuntime + 'static,
{
    let router = Router::new()
        .route("/api/run", post(run_command::<B>))
        .route("/api/reset", post(reset_session::<B>))
        .route("/health", get(health::<B>))
        .with_state(service);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /health` — liveness probe with the number of bound environments.
pub async fn health<B: EnvironmentRuntime>(
    State(service): State<Arc<SessionService<B>>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "environments": service.registry().bound_count(),
        })),
    )
}

/// `POST /api/run` — run a shell command in the session's environment,
/// provisioning one on first use.
///
/// # Errors
/// Returns [`GatewayError::InvalidRequest`] for a malformed body or session
/// id, [`GatewayError::CapacityExhausted`] when no environment can be
/// provisioned, [`GatewayError::Provision`] if provisioning fails, and
/// [`GatewayError::Execution`] if the command cannot be run.
pub async fn run_command<B: EnvironmentRuntime>(
    State(service): State<Arc<SessionService<B>>>,
    body: Result<Json<RunBody>, JsonRejection>,
) -> Result<Json<RunResponse>, GatewayError> {
    let Json(body) = body.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let span = info_span!(
        "run",
        request_id = %Uuid::new_v4(),
        session_id = %body.session_id,
    );

    async move {
        let start = Instant::now();
        info!(command = %body.command, "command received");

        let output = service.run(&body.session_id, &body.command).await?;
        debug!(
            transcript = %output.transcript,
            frames = output.frames,
            skipped = output.skipped,
            "exec transcript"
        );

        let result = output.result;
        info!(
            exit_code = ?result.exit_code,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "command finished"
        );
        Ok(Json(RunResponse {
            output: result.stdout,
            error: result.stderr,
            exit_code: result.exit_code,
        }))
    }
    .instrument(span)
    .await
}

/// `POST /api/reset` — replace the session's environment with a fresh one.
///
/// # Errors
/// Returns [`GatewayError::InvalidRequest`] for a malformed body,
/// [`GatewayError::CapacityExhausted`] when the session has no environment
/// and none is available, or [`GatewayError::Reset`] if the replacement
/// cannot be provisioned.
pub async fn reset_session<B: EnvironmentRuntime>(
    State(service): State<Arc<SessionService<B>>>,
    body: Result<Json<ResetBody>, JsonRejection>,
) -> Result<Json<ResetResponse>, GatewayError> {
    let Json(body) = body.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let span = info_span!(
        "reset",
        request_id = %Uuid::new_v4(),
        session_id = %body.session_id,
    );

    async move {
        let environment = service.reset(&body.session_id).await?;
        info!(environment_id = %environment.id.short(), "reset complete");
        Ok(Json(ResetResponse {
            output: RESET_COMPLETE.to_owned(),
            error: None,
        }))
    }
    .instrument(span)
    .await
}
