//! Healthcheck endpoints and probe.
//!
//! A small axum server exposes `/healthz` (liveness) and `/readyz`
//! (readiness) backed by atomic flags the service flips during startup and
//! shutdown. The `healthcheck` CLI subcommand probes those endpoints over
//! HTTP and turns the response into a process exit code, which is what
//! container orchestrators call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

use scene_tracker_core::TrackerError;

/// Shared liveness/readiness flags.
#[derive(Debug, Default)]
pub struct HealthState {
    /// Process is alive and able to make progress
    pub liveness: AtomicBool,
    /// Service is connected and willing to take traffic
    pub readiness: AtomicBool,
}

impl HealthState {
    /// Both flags down.
    pub fn new() -> Self {
        Self::default()
    }
}

async fn healthz(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<Value>) {
    if state.liveness.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({"status": "healthy"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy"})),
        )
    }
}

async fn readyz(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<Value>) {
    if state.readiness.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "notready"})),
        )
    }
}

/// Bind the healthcheck listener.
pub async fn bind_health(port: u16) -> Result<TcpListener, TrackerError> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| TrackerError::config(format!("failed to bind healthcheck port {port}: {e}")))
}

/// Serve the health endpoints until the shutdown signal fires.
pub async fn serve_health(
    listener: TcpListener,
    state: Arc<HealthState>,
    shutdown: oneshot::Receiver<()>,
) {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state);

    let addr = listener.local_addr().ok();
    info!(addr = ?addr, "Healthcheck server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
        })
        .await;

    if let Err(e) = result {
        error!(error = %e, "Healthcheck server error");
    }
}

/// Probe a running service's health endpoint.
///
/// Returns the process exit code: 0 when the endpoint answers 2xx, 1 on
/// connection failure or a non-success status.
pub async fn run_healthcheck_command(endpoint: &str, port: u16) -> i32 {
    let url = format!("http://127.0.0.1:{port}{endpoint}");
    match reqwest::get(&url).await {
        Ok(response) if response.status().is_success() => 0,
        Ok(response) => {
            eprintln!("healthcheck {url}: {}", response.status());
            1
        }
        Err(e) => {
            eprintln!("healthcheck {url}: {e}");
            1
        }
    }
}
