//! # Status API
//!
//! Builds the axum router that exposes the consensus node's HTTP
//! interface. All endpoints share application state through axum's
//! `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path              | Description                         |
//! |--------|-------------------|-------------------------------------|
//! | GET    | `/health`         | Liveness probe                      |
//! | GET    | `/status`         | Node status summary                 |
//! | GET    | `/tip`            | The current tip block               |
//! | GET    | `/block/:height`  | Block by height                     |
//! | GET    | `/forks`          | Recently observed fork events       |

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use helios_core::chain::MemoryChain;
use helios_core::external::{BlockStore, ForkEvent, ForkEventSink};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Fork Event Log
// ---------------------------------------------------------------------------

/// Bounded in-memory log of observed fork events.
///
/// The consensus core pushes events through the [`ForkEventSink`] trait;
/// the API reads the most recent window back out. Older events fall off
/// the front, but the total observed count keeps climbing.
pub struct ForkLog {
    events: parking_lot::RwLock<VecDeque<ForkEvent>>,
    capacity: usize,
    observed: AtomicU64,
}

impl ForkLog {
    /// A log retaining the most recent `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: parking_lot::RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            observed: AtomicU64::new(0),
        }
    }

    /// The retained events, oldest first.
    pub fn recent(&self) -> Vec<ForkEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// Total events observed since startup, including evicted ones.
    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }
}

impl ForkEventSink for ForkLog {
    fn record(&self, event: ForkEvent) {
        let mut events = self.events.write();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        self.observed.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet", "testnet", "mainnet").
    pub network: String,
    /// The chain this node is building.
    pub chain: Arc<MemoryChain>,
    /// Fork events observed by the consensus core.
    pub forks: Arc<ForkLog>,
    /// Prometheus metrics, for in-handler recording.
    pub metrics: SharedMetrics,
    /// Unix timestamp of process start, for uptime reporting.
    pub started_at: i64,
}

/// Body of the `/status` response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub height: u64,
    pub tip_id: String,
    pub forks_observed: u64,
    pub uptime_seconds: i64,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/tip", get(tip_handler))
        .route("/block/:height", get(block_by_height_handler))
        .route("/forks", get(forks_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Liveness probe.
async fn health_handler() -> &'static str {
    "ok"
}

/// Node status summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let tip = state.chain.tip();
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        height: tip.height,
        tip_id: hex::encode(tip.id),
        forks_observed: state.forks.observed(),
        uptime_seconds: chrono::Utc::now().timestamp() - state.started_at,
    })
}

/// The current tip block, in full.
async fn tip_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.chain.tip())
}

/// Block lookup by height. 404 when the height is past the tip.
async fn block_by_height_handler(
    State(state): State<AppState>,
    Path(height): Path<u64>,
) -> impl IntoResponse {
    let block = state
        .chain
        .blocks()
        .into_iter()
        .find(|b| b.height == height);
    match block {
        Some(block) => Json(block).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no block at height {height}") })),
        )
            .into_response(),
    }
}

/// The retained fork-event window, oldest first.
async fn forks_handler(State(state): State<AppState>) -> Json<Vec<ForkEvent>> {
    Json(state.forks.recent())
}
