//! Minimal HTTP client over a Unix domain socket.
//!
//! The Docker Engine exposes its API via a Unix socket, not TCP.
//! Standard HTTP clients (reqwest) don't support Unix sockets, so we
//! build a thin wrapper using hyper + tokio's `UnixStream`.

use std::path::Path;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;

use crate::ExecutorError;

/// Send an HTTP request to the runtime API socket and collect the body.
///
/// `304 Not Modified` counts as success: the engine uses it when a start or
/// stop finds the container already in the requested state.
///
/// # Errors
/// Returns [`ExecutorError::ApiError`] on connection errors and
/// [`ExecutorError::ApiStatus`] on any other non-2xx status.
pub(crate) async fn api_request(
    socket_path: &Path,
    method: Method,
    uri_path: &str,
    body: Option<String>,
) -> Result<String, ExecutorError> {
    let resp = send(socket_path, method, uri_path, body).await?;
    let status = resp.status();
    let body_str = collect_body(resp.into_body()).await?;

    if !status.is_success() && status != StatusCode::NOT_MODIFIED {
        return Err(status_error(status, uri_path, &body_str));
    }

    Ok(body_str)
}

/// Send an HTTP request and hand back the response body unread.
///
/// Used for endpoints that stream, such as exec start. The body ends when
/// the engine closes the connection.
///
/// # Errors
/// Same as [`api_request`].
pub(crate) async fn api_stream(
    socket_path: &Path,
    method: Method,
    uri_path: &str,
    body: Option<String>,
) -> Result<Incoming, ExecutorError> {
    let resp = send(socket_path, method, uri_path, body).await?;
    let status = resp.status();

    if !status.is_success() {
        let body_str = collect_body(resp.into_body()).await?;
        return Err(status_error(status, uri_path, &body_str));
    }

    Ok(resp.into_body())
}

async fn send(
    socket_path: &Path,
    method: Method,
    uri_path: &str,
    body: Option<String>,
) -> Result<Response<Incoming>, ExecutorError> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| ExecutorError::ApiError(format!("connect to {}: {e}", socket_path.display())))?;

    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ExecutorError::ApiError(format!("HTTP handshake: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("runtime API connection closed: {e}");
        }
    });

    let body_bytes = body.map(Bytes::from).unwrap_or_default();
    let content_len = body_bytes.len();

    let uri: Uri = uri_path
        .parse()
        .map_err(|e| ExecutorError::ApiError(format!("invalid URI path {uri_path}: {e}")))?;

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Host", "localhost");

    if content_len > 0 {
        builder = builder.header("Content-Type", "application/json");
        builder = builder.header("Content-Length", content_len.to_string());
    }

    let req = builder
        .body(Full::new(body_bytes))
        .map_err(|e| ExecutorError::ApiError(format!("build request: {e}")))?;

    sender
        .send_request(req)
        .await
        .map_err(|e| ExecutorError::ApiError(format!("send request: {e}")))
}

async fn collect_body(body: Incoming) -> Result<String, ExecutorError> {
    let bytes = body
        .collect()
        .await
        .map_err(|e| ExecutorError::ApiError(format!("read response body: {e}")))?
        .to_bytes();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn status_error(status: StatusCode, uri_path: &str, body: &str) -> ExecutorError {
    ExecutorError::ApiStatus {
        status: status.as_u16(),
        path: uri_path.to_owned(),
        message: error_message(body),
    }
}

/// Extract `message` from an engine error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}
