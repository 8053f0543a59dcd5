//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain health and coverage
//! - Route computation counts and latency
//! - Verification outcomes
//! - Multi-sig signature flow

use crate::error::CoreResult;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_HEALTHY: GaugeVec = register_gauge_vec!(
        "trinity_chain_healthy",
        "Chain client health (1=healthy, 0=unreachable)",
        &["chain"]
    ).unwrap();

    // Graph metrics
    pub static ref GRAPH_POOLS: GaugeVec = register_gauge_vec!(
        "trinity_graph_pools",
        "Liquidity pools in the active graph snapshot",
        &[]
    ).unwrap();

    pub static ref GRAPH_BRIDGES: GaugeVec = register_gauge_vec!(
        "trinity_graph_bridges",
        "Bridge edges in the active graph snapshot",
        &[]
    ).unwrap();

    pub static ref FEED_FAILURES: CounterVec = register_counter_vec!(
        "trinity_feed_failures_total",
        "Total failed pool feed refreshes",
        &[]
    ).unwrap();

    // Routing metrics
    pub static ref ROUTES_COMPUTED: CounterVec = register_counter_vec!(
        "trinity_routes_computed_total",
        "Total routes computed by strategy",
        &["strategy"]
    ).unwrap();

    pub static ref ROUTE_LATENCY: HistogramVec = register_histogram_vec!(
        "trinity_route_latency_seconds",
        "Route computation latency",
        &[],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    ).unwrap();

    // Verification metrics
    pub static ref VERIFICATIONS: CounterVec = register_counter_vec!(
        "trinity_verifications_total",
        "Total verification requests resolved by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref VERIFICATION_LATENCY: HistogramVec = register_histogram_vec!(
        "trinity_verification_latency_seconds",
        "Verification poll cycle latency",
        &[],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Multi-sig metrics
    pub static ref SIGNATURES_SUBMITTED: CounterVec = register_counter_vec!(
        "trinity_signatures_submitted_total",
        "Total signatures submitted by chain and validity",
        &["chain", "valid"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "trinity_health_check_success_total",
        "Total successful health check sweeps",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "trinity_health_check_failure_total",
        "Total health check sweeps with unreachable chains",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> CoreResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::error::CoreError::Internal(e.to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::CoreError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_chain_health(chain: &str, healthy: bool) {
    CHAIN_HEALTHY
        .with_label_values(&[chain])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_graph_size(pools: usize, bridges: usize) {
    GRAPH_POOLS.with_label_values(&[]).set(pools as f64);
    GRAPH_BRIDGES.with_label_values(&[]).set(bridges as f64);
}

pub fn record_feed_failure() {
    FEED_FAILURES.with_label_values(&[]).inc();
}

pub fn record_route_computed(strategy: &str) {
    ROUTES_COMPUTED.with_label_values(&[strategy]).inc();
}

pub fn record_route_latency(latency_secs: f64) {
    ROUTE_LATENCY.with_label_values(&[]).observe(latency_secs);
}

pub fn record_verification_outcome(outcome: &str) {
    VERIFICATIONS.with_label_values(&[outcome]).inc();
}

pub fn record_verification_latency(latency_secs: f64) {
    VERIFICATION_LATENCY
        .with_label_values(&[])
        .observe(latency_secs);
}

pub fn record_signature_submitted(chain: &str, valid: bool) {
    SIGNATURES_SUBMITTED
        .with_label_values(&[chain, if valid { "true" } else { "false" }])
        .inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}
