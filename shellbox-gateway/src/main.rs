//! Entry point for the `shellbox-gateway` HTTP server.

use std::sync::Arc;

use shellbox_executor::{DockerBackend, EnvironmentRuntime};
use shellbox_gateway::{create_router, GatewayConfig, SessionService};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match GatewayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let backend = Arc::new(DockerBackend::new(config.docker_socket.clone()));
    match backend.health_check().await {
        Ok(()) => info!(socket = %config.docker_socket.display(), "container runtime reachable"),
        Err(e) => warn!(
            socket = %config.docker_socket.display(),
            error = %e,
            "container runtime health check failed; environments cannot be provisioned until it recovers"
        ),
    }

    let service = Arc::new(SessionService::new(
        backend,
        config.environment_config(),
        config.exec_timeout,
        config.max_environments,
    ));
    let static_dir = config.static_dir.is_dir().then_some(config.static_dir.as_path());
    if static_dir.is_none() {
        warn!(dir = %config.static_dir.display(), "static directory not found; serving API only");
    }
    let app = create_router(Arc::clone(&service), static_dir);

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %config.listen_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(
        addr = %config.listen_addr,
        image = %config.image,
        max_environments = config.max_environments,
        exec_timeout_secs = config.exec_timeout.as_secs(),
        "shellbox-gateway listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.shutdown().await;

    if let Err(e) = served {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
