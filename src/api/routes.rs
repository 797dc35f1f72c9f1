/*
* Status API
* ----------
*
* Read-only window into the balancer, served next to the control loop when
* `status_api.enabled` is set:
*
* GET /api/v1/health  - liveness
* GET /api/v1/status  - latest cycle report (404 until the first cycle ends)
* GET /api/v1/cycles  - retained cycle history, newest first
* GET /api/v1/config  - effective balancer settings (no cluster credentials)
*
* Nothing here can trigger a migration.
*/

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::BalancerSettings;
use crate::monitoring::CycleHistory;
use crate::AsyncMutex;

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<AsyncMutex<CycleHistory>>,
    pub balancer: BalancerSettings,
}

#[derive(Debug)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error_code": self.status.as_u16(),
                "message": self.message
            })),
        )
            .into_response()
    }
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(latest_status))
        .route("/api/v1/cycles", get(list_cycles))
        .route("/api/v1/config", get(show_config))
        .fallback(fallback_handler)
        .with_state(app_state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Binds the status API socket up front so a taken port fails startup.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("Status API listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serves the status API until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    app_state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, create_router(app_state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn latest_status(State(state): State<Arc<AppState>>) -> Result<Response, ErrorResponse> {
    let history = state.history.lock().await;
    match history.latest() {
        Some(report) => Ok(Json(report.clone()).into_response()),
        None => Err(ErrorResponse::new(
            StatusCode::NOT_FOUND,
            "no cycle has completed yet",
        )),
    }
}

async fn list_cycles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let history = state.history.lock().await;
    Json(history.newest_first())
}

async fn show_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.balancer.clone())
}

async fn fallback_handler(uri: axum::http::Uri) -> ErrorResponse {
    error!("No route for {}", uri);
    ErrorResponse::new(StatusCode::NOT_FOUND, format!("no route for {}", uri))
}
