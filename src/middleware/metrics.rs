//! Prometheus metrics for the Forge gateway.
//!
//! Metrics live in a registry owned by `ForgeMetrics` rather than the global
//! default one, so several app instances (tests) can coexist in one process.
//! Exposed on `GET /metrics`.

use prometheus::{opts, Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};

use crate::realtime::DeliveryReport;

pub struct ForgeMetrics {
    registry: Registry,
    broadcast_messages_total: IntCounter,
    broadcast_pruned_total: IntCounter,
    ws_connections: IntGauge,
    auth_failures_total: IntCounterVec,
}

impl ForgeMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let broadcast_messages_total = IntCounter::with_opts(opts!(
            "forge_broadcast_messages_total",
            "Frames delivered to realtime channels"
        ))?;
        let broadcast_pruned_total = IntCounter::with_opts(opts!(
            "forge_broadcast_pruned_total",
            "Realtime channels dropped after a failed send"
        ))?;
        let ws_connections = IntGauge::with_opts(opts!(
            "forge_ws_connections",
            "Currently open realtime connections"
        ))?;
        let auth_failures_total = IntCounterVec::new(
            opts!("forge_auth_failures_total", "Rejected credentials by reason"),
            &["reason"],
        )?;

        registry.register(Box::new(broadcast_messages_total.clone()))?;
        registry.register(Box::new(broadcast_pruned_total.clone()))?;
        registry.register(Box::new(ws_connections.clone()))?;
        registry.register(Box::new(auth_failures_total.clone()))?;

        Ok(Self {
            registry,
            broadcast_messages_total,
            broadcast_pruned_total,
            ws_connections,
            auth_failures_total,
        })
    }

    pub fn record_delivery(&self, report: &DeliveryReport) {
        self.broadcast_messages_total.inc_by(report.delivered as u64);
        self.broadcast_pruned_total.inc_by(report.pruned as u64);
    }

    pub fn ws_opened(&self) {
        self.ws_connections.inc();
    }

    pub fn ws_closed(&self) {
        self.ws_connections.dec();
    }

    pub fn auth_failure(&self, reason: &str) {
        self.auth_failures_total.with_label_values(&[reason]).inc();
    }

    /// Prometheus text exposition of every metric in this registry.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────
