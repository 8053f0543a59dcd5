//! Trinity Coordinator - cross-chain route optimization and consensus verification
//!
//! The coordinator maintains a liquidity pool graph for multi-strategy route
//! search, verifies transactions across chains with a 2-of-3 style consensus
//! threshold, and collects multi-sig approvals for cross-chain vault actions.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod consensus;
mod error;
mod metrics;
mod multisig;
mod routing;

use chain::ChainRegistry;
use chrono::Utc;
use config::Settings;
use consensus::{ConsensusCoordinator, VerificationStore};
use metrics::MetricsServer;
use multisig::{HexFormatVerifier, MultiSigCoordinator};
use routing::{FeedRefresher, FilePoolFeed, PoolGraph, RouteOptimizer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Trinity Coordinator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        Some(MetricsServer::new(settings.metrics.port))
    } else {
        None
    };

    // Initialize the pool graph and prime it from the feed if configured
    let graph = Arc::new(PoolGraph::new());
    let feed_refresher = if let Some(path) = &settings.feed.snapshot_path {
        let feed = Arc::new(FilePoolFeed::new(path.clone()));
        let refresher = Arc::new(FeedRefresher::new(
            feed,
            graph.clone(),
            settings.feed.refresh_interval_secs,
        ));
        refresher.refresh_once().await;
        Some(refresher)
    } else {
        warn!("No pool feed configured; route queries will fail until a snapshot is loaded");
        None
    };

    let optimizer = Arc::new(RouteOptimizer::new(graph.clone(), settings.routing.clone()));

    // Chain clients are injected at deploy time; the registry starts empty
    // and coverage gaps against the configured chains are logged here.
    let registry = Arc::new(ChainRegistry::new());
    registry.check_coverage(&settings);

    // Initialize verification store and consensus coordinator
    let store = Arc::new(VerificationStore::new());
    let default_confirmations = settings
        .enabled_chains()
        .into_iter()
        .map(|(name, chain)| (name.clone(), chain.required_confirmations))
        .collect();
    let consensus = Arc::new(ConsensusCoordinator::new(
        registry.clone(),
        store.clone(),
        settings.consensus.clone(),
        default_confirmations,
    ));

    // Initialize multi-sig coordinator with the format-checking verifier
    let multisig = Arc::new(MultiSigCoordinator::new(
        Arc::new(HexFormatVerifier),
        settings.multisig.clone(),
    ));

    // Start API server
    let api_state = api::AppState {
        graph: graph.clone(),
        optimizer,
        registry: registry.clone(),
        consensus,
        store: store.clone(),
        multisig: multisig.clone(),
        started_at: Utc::now(),
    };
    let api_handle = tokio::spawn({
        let api_config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(api_config, api_state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = metrics_server.map(|server| {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Start feed refresh loop
    let feed_handle = feed_refresher.as_ref().map(|refresher| {
        tokio::spawn({
            let refresher = refresher.clone();
            async move {
                refresher.run().await;
            }
        })
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let registry = registry.clone();
        let interval = settings.coordinator.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                let health = registry.health_check().await;
                let mut all_healthy = true;
                for (chain, healthy) in health {
                    if !healthy {
                        warn!("Chain {} health check failed", chain);
                        all_healthy = false;
                    }
                }

                if all_healthy {
                    metrics::record_health_check();
                } else {
                    metrics::record_health_check_failure();
                }
            }
        }
    });

    // Sweeper loop: expire overdue multi-sig requests and evict old records
    let sweep_handle = tokio::spawn({
        let multisig = multisig.clone();
        let store = store.clone();
        let interval = settings.coordinator.sweep_interval_secs;
        let retention = settings.coordinator.record_retention_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
                multisig.sweep_expired();
                let evicted = store.sweep(retention);
                if evicted > 0 {
                    info!("Evicted {} expired verification records", evicted);
                }
            }
        }
    });

    info!(
        "Trinity Coordinator is running (instance {})",
        settings.coordinator.instance_id
    );
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    if let Some(refresher) = &feed_refresher {
        refresher.stop().await;
    }

    // Abort background tasks
    api_handle.abort();
    health_handle.abort();
    sweep_handle.abort();
    if let Some(h) = feed_handle {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Trinity Coordinator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,trinity_coordinator=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
