//! Pool discovery feed and the background graph refresh loop
//!
//! The feed itself is an external collaborator; the coordinator only defines
//! the capability and ships a file-backed implementation so the service can
//! run against a locally published snapshot.

use super::graph::{BridgeEdge, LiquidityPool, PoolGraph};
use crate::error::{CoreError, CoreResult};

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

/// Periodic external source of pool and bridge snapshots
#[async_trait]
pub trait PoolFeed: Send + Sync {
    async fn snapshot(&self) -> CoreResult<(Vec<LiquidityPool>, Vec<BridgeEdge>)>;
}

#[derive(Debug, Deserialize)]
struct FeedFile {
    pools: Vec<LiquidityPool>,
    #[serde(default)]
    bridges: Vec<BridgeEdge>,
}

/// Feed backed by a JSON snapshot file published out-of-band
pub struct FilePoolFeed {
    path: PathBuf,
}

impl FilePoolFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PoolFeed for FilePoolFeed {
    async fn snapshot(&self) -> CoreResult<(Vec<LiquidityPool>, Vec<BridgeEdge>)> {
        let path = self.path.clone();
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::MalformedSnapshot(format!("cannot read {}: {}", path.display(), e))
        })?;

        let parsed: FeedFile = serde_json::from_str(&raw)
            .map_err(|e| CoreError::MalformedSnapshot(format!("invalid snapshot JSON: {e}")))?;

        Ok((parsed.pools, parsed.bridges))
    }
}

/// Background task polling the feed and refreshing the pool graph
pub struct FeedRefresher {
    feed: Arc<dyn PoolFeed>,
    graph: Arc<PoolGraph>,
    interval_secs: u64,
    shutdown: Arc<RwLock<bool>>,
}

impl FeedRefresher {
    pub fn new(feed: Arc<dyn PoolFeed>, graph: Arc<PoolGraph>, interval_secs: u64) -> Self {
        Self {
            feed,
            graph,
            interval_secs,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Refresh once, retaining the stale graph on any feed failure
    pub async fn refresh_once(&self) {
        match self.feed.snapshot().await {
            Ok((pools, bridges)) => {
                if let Err(e) = self.graph.refresh(pools, bridges) {
                    warn!("Pool feed returned malformed data, keeping stale graph: {}", e);
                    crate::metrics::record_feed_failure();
                }
            }
            Err(e) => {
                warn!("Pool feed unavailable, keeping stale graph: {}", e);
                crate::metrics::record_feed_failure();
            }
        }
    }

    /// Run the refresh loop until stopped
    pub async fn run(&self) {
        let mut tick = interval(Duration::from_secs(self.interval_secs.max(1)));
        info!(
            "Pool feed refresher started (every {}s)",
            self.interval_secs.max(1)
        );

        loop {
            tick.tick().await;
            if *self.shutdown.read().await {
                break;
            }
            self.refresh_once().await;
        }

        info!("Pool feed refresher stopped");
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }
}
