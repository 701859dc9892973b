//! # Prometheus Metrics
//!
//! Operational metrics for the consensus node, scraped at the `/metrics`
//! HTTP endpoint on the configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they never
//! collide with consumers of a global default registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are internally reference-counted),
/// so it can be shared across request handlers and the forge loop.
#[derive(Clone)]
pub struct ConsensusMetrics {
    /// Registry that owns all metrics below.
    registry: Registry,
    /// Blocks accepted through the full verification pipeline.
    pub blocks_applied_total: IntCounter,
    /// Fork events observed (all causes).
    pub forks_detected_total: IntCounter,
    /// Blocks unwound during fork resolution or sync.
    pub rollbacks_total: IntCounter,
    /// Height of the current chain tip.
    pub tip_height: IntGauge,
}

impl ConsensusMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("helios".into()), None)?;

        let blocks_applied_total = IntCounter::new(
            "blocks_applied_total",
            "Blocks accepted through the full verification pipeline",
        )?;
        registry.register(Box::new(blocks_applied_total.clone()))?;

        let forks_detected_total = IntCounter::new(
            "forks_detected_total",
            "Fork events observed, all causes combined",
        )?;
        registry.register(Box::new(forks_detected_total.clone()))?;

        let rollbacks_total = IntCounter::new(
            "rollbacks_total",
            "Blocks unwound during fork resolution or synchronization",
        )?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        let tip_height = IntGauge::new("tip_height", "Height of the current chain tip")?;
        registry.register(Box::new(tip_height.clone()))?;

        Ok(Self {
            registry,
            blocks_applied_total,
            forks_detected_total,
            rollbacks_total,
            tip_height,
        })
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not utf-8: {e}")))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<ConsensusMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
