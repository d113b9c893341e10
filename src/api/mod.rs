pub mod notifications;
pub mod tasks;

use std::future::Future;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::models::health::{HealthCheckResponse, HealthStatus};

/// Binds `0.0.0.0:port` and serves `app` until `shutdown` resolves.
pub async fn run_api_server<F>(
    app: Router,
    port: u16,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "API server started");

    axum::serve(listener, app.layer(TraceLayer::new_for_http()))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed it never
/// resolves and the process runs until killed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn health_response(health: HealthCheckResponse) -> impl IntoResponse {
    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
