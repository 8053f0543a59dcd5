//! Liquidity pool graph with atomic copy-then-swap refresh
//!
//! Nodes are liquidity pools. Edges are same-chain hops between pools that
//! share a token, and bridge edges between a source-chain pool and a
//! target-chain pool that both trade the bridged asset. Readers always see a
//! fully built snapshot: refresh builds the new graph off to the side and
//! publishes it with a single pointer swap.

use crate::error::{CoreError, CoreResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Immutable snapshot of one liquidity pool at optimization time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiquidityPool {
    pub id: String,
    pub blockchain: String,
    pub protocol_name: String,
    /// The two tokens this pool trades, e.g. ("USDC", "WETH")
    pub token_pair: (String, String),
    pub tvl_usd: f64,
    pub reserve_a: f64,
    pub reserve_b: f64,
    /// Pool swap fee as a fraction, e.g. 0.003 for 30 bps
    pub fee_pct: f64,
    /// Dust floor - amounts below this exclude the pool from routing
    #[serde(default)]
    pub min_amount_usd: f64,
}

impl LiquidityPool {
    /// Whether this pool trades the given token on either side
    pub fn trades(&self, token: &str) -> bool {
        self.token_pair.0 == token || self.token_pair.1 == token
    }

    /// The opposite side of the pair, if `token` is one of the two sides
    pub fn other_side(&self, token: &str) -> Option<&str> {
        if self.token_pair.0 == token {
            Some(&self.token_pair.1)
        } else if self.token_pair.1 == token {
            Some(&self.token_pair.0)
        } else {
            None
        }
    }

    /// Reserve of the given token side
    pub fn reserve_for(&self, token: &str) -> Option<f64> {
        if self.token_pair.0 == token {
            Some(self.reserve_a)
        } else if self.token_pair.1 == token {
            Some(self.reserve_b)
        } else {
            None
        }
    }
}

/// Fee charged by a bridge protocol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "model", content = "value")]
pub enum FeeModel {
    /// Flat USD fee per transfer
    Fixed(f64),
    /// Fraction of the transferred amount, e.g. 0.003
    Percentage(f64),
}

/// Bridge connecting a pool on the source chain to a pool on the target chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeEdge {
    pub id: String,
    pub bridge_protocol: String,
    pub source_chain: String,
    pub target_chain: String,
    /// Token carried across the bridge
    pub asset: String,
    pub fee_model: FeeModel,
    pub avg_latency_secs: f64,
    /// Historical success rate in 0..=1
    pub reliability_score: f64,
}

impl BridgeEdge {
    /// USD fee for transferring `amount_usd` over this bridge
    pub fn fee_usd(&self, amount_usd: f64) -> f64 {
        match self.fee_model {
            FeeModel::Fixed(usd) => usd,
            FeeModel::Percentage(pct) => amount_usd * pct,
        }
    }
}

/// Directed edge between two pools in a built snapshot
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// Index of the target pool in the snapshot
    pub target: usize,
    /// Token the value travels through on this hop
    pub via_token: String,
    /// Bridge used for cross-chain hops, `None` for same-chain hops
    pub bridge: Option<Arc<BridgeEdge>>,
}

/// Fully built, immutable graph snapshot
pub struct GraphSnapshot {
    pools: Vec<Arc<LiquidityPool>>,
    adjacency: Vec<Vec<GraphEdge>>,
    bridge_count: usize,
    pub built_at: DateTime<Utc>,
    pub version: u64,
}

impl GraphSnapshot {
    /// An empty snapshot, published before the first refresh
    fn empty() -> Self {
        Self {
            pools: Vec::new(),
            adjacency: Vec::new(),
            bridge_count: 0,
            built_at: Utc::now(),
            version: 0,
        }
    }

    /// Build and validate a snapshot from feed data
    fn build(
        pools: Vec<LiquidityPool>,
        bridges: Vec<BridgeEdge>,
        version: u64,
    ) -> CoreResult<Self> {
        validate_feed(&pools, &bridges)?;

        let pools: Vec<Arc<LiquidityPool>> = pools.into_iter().map(Arc::new).collect();
        let bridges: Vec<Arc<BridgeEdge>> = bridges.into_iter().map(Arc::new).collect();
        let mut adjacency: Vec<Vec<GraphEdge>> = vec![Vec::new(); pools.len()];

        // Same-chain hops between pools sharing a token
        for (i, a) in pools.iter().enumerate() {
            for (j, b) in pools.iter().enumerate() {
                if i == j || a.blockchain != b.blockchain {
                    continue;
                }
                for token in [&a.token_pair.0, &a.token_pair.1] {
                    if b.trades(token) {
                        adjacency[i].push(GraphEdge {
                            target: j,
                            via_token: token.clone(),
                            bridge: None,
                        });
                    }
                }
            }
        }

        // Cross-chain hops through bridges carrying a shared asset
        let mut bridge_edges = 0usize;
        for bridge in &bridges {
            for (i, a) in pools.iter().enumerate() {
                if a.blockchain != bridge.source_chain || !a.trades(&bridge.asset) {
                    continue;
                }
                for (j, b) in pools.iter().enumerate() {
                    if b.blockchain != bridge.target_chain || !b.trades(&bridge.asset) {
                        continue;
                    }
                    adjacency[i].push(GraphEdge {
                        target: j,
                        via_token: bridge.asset.clone(),
                        bridge: Some(bridge.clone()),
                    });
                    bridge_edges += 1;
                }
            }
        }

        debug!(
            "Built graph snapshot v{}: {} pools, {} bridge edges",
            version,
            pools.len(),
            bridge_edges
        );

        Ok(Self {
            pools,
            adjacency,
            bridge_count: bridge_edges,
            built_at: Utc::now(),
            version,
        })
    }

    /// Outgoing edges of a pool
    pub fn neighbors(&self, pool_idx: usize) -> &[GraphEdge] {
        &self.adjacency[pool_idx]
    }

    /// Pool by snapshot index
    pub fn pool(&self, idx: usize) -> &Arc<LiquidityPool> {
        &self.pools[idx]
    }

    /// All pools in the snapshot
    pub fn pools(&self) -> &[Arc<LiquidityPool>] {
        &self.pools
    }

    /// Indices of pools on `chain` trading `token`
    pub fn pools_trading(&self, chain: &str, token: &str) -> Vec<usize> {
        self.pools
            .iter()
            .enumerate()
            .filter(|(_, p)| p.blockchain == chain && p.trades(token))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn bridge_edge_count(&self) -> usize {
        self.bridge_count
    }
}

/// Reject structurally malformed feed data before any swap happens
fn validate_feed(pools: &[LiquidityPool], bridges: &[BridgeEdge]) -> CoreResult<()> {
    let mut seen = HashSet::new();
    for pool in pools {
        if !seen.insert(&pool.id) {
            return Err(CoreError::MalformedSnapshot(format!(
                "duplicate pool id {}",
                pool.id
            )));
        }
        if pool.reserve_a <= 0.0 || pool.reserve_b <= 0.0 {
            return Err(CoreError::MalformedSnapshot(format!(
                "pool {} has non-positive reserves",
                pool.id
            )));
        }
        if !(0.0..1.0).contains(&pool.fee_pct) {
            return Err(CoreError::MalformedSnapshot(format!(
                "pool {} fee_pct {} outside [0, 1)",
                pool.id, pool.fee_pct
            )));
        }
        if pool.token_pair.0 == pool.token_pair.1 {
            return Err(CoreError::MalformedSnapshot(format!(
                "pool {} pairs a token with itself",
                pool.id
            )));
        }
    }

    let mut seen = HashSet::new();
    for bridge in bridges {
        if !seen.insert(&bridge.id) {
            return Err(CoreError::MalformedSnapshot(format!(
                "duplicate bridge id {}",
                bridge.id
            )));
        }
        if !(0.0..=1.0).contains(&bridge.reliability_score) {
            return Err(CoreError::MalformedSnapshot(format!(
                "bridge {} reliability {} outside [0, 1]",
                bridge.id, bridge.reliability_score
            )));
        }
        if bridge.avg_latency_secs < 0.0 {
            return Err(CoreError::MalformedSnapshot(format!(
                "bridge {} has negative latency",
                bridge.id
            )));
        }
        if bridge.source_chain == bridge.target_chain {
            return Err(CoreError::MalformedSnapshot(format!(
                "bridge {} connects a chain to itself",
                bridge.id
            )));
        }
        let has_source = pools
            .iter()
            .any(|p| p.blockchain == bridge.source_chain && p.trades(&bridge.asset));
        let has_target = pools
            .iter()
            .any(|p| p.blockchain == bridge.target_chain && p.trades(&bridge.asset));
        if !has_source || !has_target {
            return Err(CoreError::MalformedSnapshot(format!(
                "bridge {} endpoints reference no pool trading {}",
                bridge.id, bridge.asset
            )));
        }
    }

    Ok(())
}

/// Concurrently readable pool graph with single-writer refresh
///
/// Readers grab an `Arc` to the current snapshot and keep it for the whole
/// optimization call; the write lock is only held for the pointer swap.
pub struct PoolGraph {
    current: RwLock<Arc<GraphSnapshot>>,
    version: AtomicU64,
}

impl PoolGraph {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(GraphSnapshot::empty())),
            version: AtomicU64::new(0),
        }
    }

    /// Current snapshot. Never partially built.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Atomically replace the graph from fresh feed data.
    ///
    /// On malformed data the stale graph is retained and the error is
    /// returned for the caller to surface; existing readers are never
    /// affected either way.
    pub fn refresh(
        &self,
        pools: Vec<LiquidityPool>,
        bridges: Vec<BridgeEdge>,
    ) -> CoreResult<()> {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = GraphSnapshot::build(pools, bridges, version)?;

        let pool_count = snapshot.pool_count();
        let bridge_count = snapshot.bridge_edge_count();

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(snapshot);

        crate::metrics::record_graph_size(pool_count, bridge_count);
        info!(
            "Pool graph refreshed to v{}: {} pools, {} bridge edges",
            version, pool_count, bridge_count
        );
        Ok(())
    }
}

impl Default for PoolGraph {
    fn default() -> Self {
        Self::new()
    }
}
