use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

use crate::discovery::{DiscoveryState, StateCell};
use crate::table::SensorTable;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub device: String,
    pub state: String,
    pub sensors: usize,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub device: String,
    pub state: Arc<StateCell>,
    pub last_notification_epoch_secs: Arc<AtomicU64>,
    pub stale_threshold_secs: u64,
    pub table: Arc<SensorTable>,
}

impl ServerState {
    pub fn new(
        device: impl Into<String>,
        state: Arc<StateCell>,
        last_notification_epoch_secs: Arc<AtomicU64>,
        stale_threshold_secs: u64,
        table: Arc<SensorTable>,
    ) -> Self {
        Self {
            device: device.into(),
            state,
            last_notification_epoch_secs,
            stale_threshold_secs,
            table,
        }
    }

    /// A notification arrived within the staleness threshold. False
    /// until the first notification is ingested.
    fn fresh(&self) -> bool {
        let last = self.last_notification_epoch_secs.load(Ordering::SeqCst);
        if last == 0 {
            return false;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now.saturating_sub(last) < self.stale_threshold_secs
    }
}

/// Health endpoint - always returns 200 if the server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        device: state.device.clone(),
        state: state.state.get().as_str().to_string(),
        sensors: state.table.len(),
    })
}

/// Ready endpoint - 200 only while subscribed and receiving
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let subscribed = state.state.get() == DiscoveryState::Subscribed;
    let ready = subscribed && state.fresh();

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            device: state.device.clone(),
            state: state.state.get().as_str().to_string(),
            sensors: state.table.len(),
        }),
    )
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Run the health server
pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
