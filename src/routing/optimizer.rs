//! Multi-objective route optimization over the pool graph
//!
//! Best-first (Dijkstra-style) search where the edge weight depends on the
//! requested strategy. The search state is (pool, held token) so that a swap
//! inside a pool is only charged when the hop actually changes tokens. All
//! strategies for one request run against the same graph snapshot, so the
//! three results are directly comparable.

use super::graph::{BridgeEdge, GraphEdge, GraphSnapshot, LiquidityPool, PoolGraph};
use crate::config::RoutingConfig;
use crate::error::{CoreError, CoreResult};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Objective function used to select among candidate routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Lowest total USD fee
    Fee,
    /// Fastest delivery
    Time,
    /// Highest expected output
    Output,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Fee, Strategy::Time, Strategy::Output];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Fee => "fee",
            Strategy::Time => "time",
            Strategy::Output => "output",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fee" => Ok(Strategy::Fee),
            "time" => Ok(Strategy::Time),
            "output" => Ok(Strategy::Output),
            other => Err(CoreError::InvalidRequest(format!(
                "unknown strategy {other:?}"
            ))),
        }
    }
}

/// One hop of a route: swap in `source_pool`, then move to `target_pool`,
/// across `bridge` when the hop changes chains
#[derive(Debug, Clone, Serialize)]
pub struct RouteSegment {
    pub source_pool: LiquidityPool,
    pub target_pool: LiquidityPool,
    pub bridge: Option<BridgeEdge>,
    pub fee_usd: f64,
    pub estimated_time_secs: f64,
}

/// A complete route under one strategy
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub segments: Vec<RouteSegment>,
    pub strategy: Strategy,
    pub total_fee_usd: f64,
    pub total_time_secs: f64,
    pub expected_output: f64,
    pub estimated_slippage: f64,
}

/// A route request
#[derive(Debug, Clone, Deserialize)]
pub struct RouteQuery {
    pub source_chain: String,
    pub target_chain: String,
    pub source_token: String,
    pub target_token: String,
    pub amount_usd: f64,
    pub max_hops: Option<usize>,
}

/// Search cost ordered by (weight, hops, bridge unreliability)
#[derive(Debug, Clone, Copy)]
struct Cost {
    weight: f64,
    hops: u32,
    /// Sum of -ln(reliability) over traversed bridges; lower is safer
    unreliability: f64,
}

impl Cost {
    const ZERO: Cost = Cost {
        weight: 0.0,
        hops: 0,
        unreliability: 0.0,
    };

    fn compare(&self, other: &Cost) -> Ordering {
        self.weight
            .partial_cmp(&other.weight)
            .unwrap_or(Ordering::Equal)
            .then(self.hops.cmp(&other.hops))
            .then(
                self.unreliability
                    .partial_cmp(&other.unreliability)
                    .unwrap_or(Ordering::Equal),
            )
    }
}

/// Heap entry; `Ord` is reversed so `BinaryHeap` pops the cheapest state
struct HeapEntry {
    cost: Cost,
    state: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost.compare(&other.cost) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.compare(&self.cost)
    }
}

/// USD fee and retained-value factor of a single swap
struct SwapTerms {
    fee_usd: f64,
    factor: f64,
}

/// Multi-objective route optimizer
pub struct RouteOptimizer {
    graph: Arc<PoolGraph>,
    config: RoutingConfig,
}

impl RouteOptimizer {
    pub fn new(graph: Arc<PoolGraph>, config: RoutingConfig) -> Self {
        Self { graph, config }
    }

    /// Find the best route for every strategy, all from one graph snapshot
    pub fn find_routes(&self, query: &RouteQuery) -> CoreResult<HashMap<Strategy, Route>> {
        let snapshot = self.graph.snapshot();
        let started = Instant::now();

        let mut routes = HashMap::new();
        for strategy in Strategy::ALL {
            let route = self.search(&snapshot, query, strategy)?;
            routes.insert(strategy, route);
        }

        crate::metrics::record_route_latency(started.elapsed().as_secs_f64());
        Ok(routes)
    }

    /// Find the best route under a single strategy
    pub fn find_optimal_route(&self, query: &RouteQuery, strategy: Strategy) -> CoreResult<Route> {
        let snapshot = self.graph.snapshot();
        let started = Instant::now();
        let route = self.search(&snapshot, query, strategy)?;
        crate::metrics::record_route_latency(started.elapsed().as_secs_f64());
        Ok(route)
    }

    fn search(
        &self,
        snapshot: &GraphSnapshot,
        query: &RouteQuery,
        strategy: Strategy,
    ) -> CoreResult<Route> {
        if snapshot.is_empty() {
            return Err(CoreError::EmptyGraph);
        }
        if query.amount_usd <= 0.0 {
            return Err(CoreError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }
        if query.amount_usd < self.config.default_min_amount_usd {
            return Err(CoreError::DustAmount {
                amount_usd: query.amount_usd,
                min_usd: self.config.default_min_amount_usd,
            });
        }

        let max_hops = query.max_hops.unwrap_or(self.config.max_hops);
        let amount = query.amount_usd;

        let entries = snapshot.pools_trading(&query.source_chain, &query.source_token);
        if entries.is_empty() {
            return Err(self.no_route(query, max_hops));
        }

        // State = (pool, held token side, hops used). Swaps inside a pool are
        // charged on the hop that changes tokens, so holding either side is a
        // distinct state; layering by hop count keeps the search exact under
        // the hop bound.
        let layers = max_hops + 1;
        let state_count = snapshot.pool_count() * 2 * layers;
        let state_of = |pool: usize, side: usize, hops: usize| (pool * 2 + side) * layers + hops;

        let mut dist: Vec<Option<Cost>> = vec![None; state_count];
        let mut prev: Vec<Option<(usize, GraphEdge)>> = vec![None; state_count];
        let mut settled = vec![false; state_count];
        let mut heap = BinaryHeap::new();
        let mut depth_excluded = false;

        for pool_idx in entries {
            let side = match token_side(snapshot.pool(pool_idx), &query.source_token) {
                Some(side) => side,
                None => continue,
            };
            let state = state_of(pool_idx, side, 0);
            dist[state] = Some(Cost::ZERO);
            heap.push(HeapEntry {
                cost: Cost::ZERO,
                state,
            });
        }

        while let Some(HeapEntry { cost, state }) = heap.pop() {
            if settled[state] {
                continue;
            }
            settled[state] = true;

            let hops = state % layers;
            if hops >= max_hops {
                continue;
            }

            let pool_idx = state / layers / 2;
            let pool = snapshot.pool(pool_idx);
            let held = side_token(pool, (state / layers) % 2);

            for edge in snapshot.neighbors(pool_idx) {
                let step = match self.edge_cost(pool, edge, held, amount, strategy) {
                    Some(step) => step,
                    None => {
                        depth_excluded = true;
                        continue;
                    }
                };

                let target_pool = snapshot.pool(edge.target);
                let side = match token_side(target_pool, &edge.via_token) {
                    Some(side) => side,
                    None => continue,
                };
                let next_state = state_of(edge.target, side, hops + 1);
                let next = Cost {
                    weight: cost.weight + step.weight,
                    hops: cost.hops + 1,
                    unreliability: cost.unreliability + step.unreliability,
                };

                let better = match dist[next_state] {
                    Some(existing) => next.compare(&existing) == Ordering::Less,
                    None => true,
                };
                if better {
                    dist[next_state] = Some(next);
                    prev[next_state] = Some((state, edge.clone()));
                    heap.push(HeapEntry {
                        cost: next,
                        state: next_state,
                    });
                }
            }
        }

        // Evaluate goal candidates: any reached state on the target chain in a
        // pool trading the target token, plus the exit swap when the held
        // token is not yet the target token.
        let mut best: Option<(usize, Cost, Option<SwapTerms>)> = None;
        for state in 0..state_count {
            let cost = match dist[state] {
                Some(cost) => cost,
                None => continue,
            };
            let pool = snapshot.pool(state / layers / 2);
            if pool.blockchain != query.target_chain || !pool.trades(&query.target_token) {
                continue;
            }

            let held = side_token(pool, (state / layers) % 2);
            let exit = if held == query.target_token {
                None
            } else {
                match self.swap_terms(pool, &query.target_token, amount) {
                    Some(terms) => Some(terms),
                    None => {
                        depth_excluded = true;
                        continue;
                    }
                }
            };

            let exit_weight = match (&exit, strategy) {
                (None, _) => 0.0,
                (Some(terms), Strategy::Fee) => terms.fee_usd,
                (Some(_), Strategy::Time) => self.config.pool_hop_latency_secs,
                (Some(terms), Strategy::Output) => -terms.factor.max(f64::MIN_POSITIVE).ln(),
            };
            let total = Cost {
                weight: cost.weight + exit_weight,
                hops: cost.hops,
                unreliability: cost.unreliability,
            };

            let better = match &best {
                Some((_, existing, _)) => total.compare(existing) == Ordering::Less,
                None => true,
            };
            if better {
                best = Some((state, total, exit));
            }
        }

        let (goal_state, _, exit) = match best {
            Some(found) => found,
            None if depth_excluded => {
                return Err(CoreError::InsufficientLiquidity {
                    amount_usd: amount,
                })
            }
            None => return Err(self.no_route(query, max_hops)),
        };

        // Reconstruct the edge path from the goal backwards
        let mut edges: Vec<(usize, GraphEdge)> = Vec::new();
        let mut state = goal_state;
        while let Some((parent, edge)) = &prev[state] {
            edges.push((*parent / layers / 2, edge.clone()));
            state = *parent;
        }
        edges.reverse();

        let goal_pool = goal_state / layers / 2;
        let route = self.materialize(snapshot, query, strategy, goal_pool, edges, exit);
        debug!(
            "Route {} -> {} via {} segments (strategy {})",
            query.source_chain,
            query.target_chain,
            route.segments.len(),
            strategy.as_str()
        );
        crate::metrics::record_route_computed(strategy.as_str());
        Ok(route)
    }

    /// Weight of traversing `edge` out of `pool` while holding `held`
    fn edge_cost(
        &self,
        pool: &LiquidityPool,
        edge: &GraphEdge,
        held: &str,
        amount: f64,
        strategy: Strategy,
    ) -> Option<EdgeStep> {
        let swap = if held == edge.via_token {
            None
        } else {
            Some(self.swap_terms(pool, &edge.via_token, amount)?)
        };

        let (bridge_fee, bridge_factor, latency, unreliability) = match &edge.bridge {
            Some(bridge) => {
                let fee = bridge.fee_usd(amount);
                let frac = (fee / amount).clamp(0.0, 0.999_999);
                (
                    fee,
                    1.0 - frac,
                    bridge.avg_latency_secs,
                    -bridge.reliability_score.max(1e-9).ln(),
                )
            }
            None => (0.0, 1.0, self.config.pool_hop_latency_secs, 0.0),
        };

        let swap_fee = swap.as_ref().map(|s| s.fee_usd).unwrap_or(0.0);
        let swap_factor = swap.as_ref().map(|s| s.factor).unwrap_or(1.0);

        let weight = match strategy {
            Strategy::Fee => swap_fee + bridge_fee,
            Strategy::Time => latency,
            Strategy::Output => -(swap_factor * bridge_factor).max(f64::MIN_POSITIVE).ln(),
        };

        Some(EdgeStep {
            weight,
            unreliability,
        })
    }

    /// Fee and retained-value factor for swapping `amount` into `out_token`
    /// inside `pool`. `None` when the pool excludes the amount (dust floor or
    /// constant-product depth).
    fn swap_terms(&self, pool: &LiquidityPool, out_token: &str, amount: f64) -> Option<SwapTerms> {
        if amount < pool.min_amount_usd {
            return None;
        }
        let reserve = pool.reserve_for(out_token)?;
        if amount >= reserve {
            return None;
        }
        // Constant-product approximation: slippage ~ amount / (amount + reserve)
        let slippage = amount / (amount + reserve);
        let fee_usd = amount * (pool.fee_pct + slippage);
        let factor = (1.0 - pool.fee_pct) * (1.0 - slippage);
        Some(SwapTerms { fee_usd, factor })
    }

    /// Re-walk the winning path and compute the literal route figures
    fn materialize(
        &self,
        snapshot: &GraphSnapshot,
        query: &RouteQuery,
        strategy: Strategy,
        goal_pool: usize,
        edges: Vec<(usize, GraphEdge)>,
        exit: Option<SwapTerms>,
    ) -> Route {
        let amount = query.amount_usd;
        let mut segments = Vec::new();
        let mut output_factor = 1.0_f64;
        let mut held = query.source_token.clone();

        for (source_idx, edge) in &edges {
            let source_pool = snapshot.pool(*source_idx);
            let target_pool = snapshot.pool(edge.target);

            let mut fee_usd = 0.0;
            let mut time_secs = 0.0;
            if held != edge.via_token {
                if let Some(terms) = self.swap_terms(source_pool, &edge.via_token, amount) {
                    fee_usd += terms.fee_usd;
                    output_factor *= terms.factor;
                }
            }
            match &edge.bridge {
                Some(bridge) => {
                    let bridge_fee = bridge.fee_usd(amount);
                    fee_usd += bridge_fee;
                    time_secs += bridge.avg_latency_secs;
                    output_factor *= 1.0 - (bridge_fee / amount).clamp(0.0, 0.999_999);
                }
                None => {
                    time_secs += self.config.pool_hop_latency_secs;
                }
            }

            held = edge.via_token.clone();
            segments.push(RouteSegment {
                source_pool: (**source_pool).clone(),
                target_pool: (**target_pool).clone(),
                bridge: edge.bridge.as_deref().cloned(),
                fee_usd,
                estimated_time_secs: time_secs,
            });
        }

        // Exit swap in the final pool, folded into the last segment; a route
        // that never leaves one pool becomes a single self-segment.
        if let Some(terms) = exit {
            output_factor *= terms.factor;
            match segments.last_mut() {
                Some(last) => {
                    last.fee_usd += terms.fee_usd;
                    last.estimated_time_secs += self.config.pool_hop_latency_secs;
                }
                None => {
                    let pool = (**snapshot.pool(goal_pool)).clone();
                    segments.push(RouteSegment {
                        source_pool: pool.clone(),
                        target_pool: pool,
                        bridge: None,
                        fee_usd: terms.fee_usd,
                        estimated_time_secs: self.config.pool_hop_latency_secs,
                    });
                }
            }
        }

        let total_fee_usd = segments.iter().map(|s| s.fee_usd).sum();
        let total_time_secs = segments.iter().map(|s| s.estimated_time_secs).sum();
        let expected_output = amount * output_factor;
        let estimated_slippage =
            (1.0 - expected_output / (amount * self.config.static_exchange_rate)).clamp(0.0, 1.0);

        Route {
            segments,
            strategy,
            total_fee_usd,
            total_time_secs,
            expected_output,
            estimated_slippage,
        }
    }

    fn no_route(&self, query: &RouteQuery, max_hops: usize) -> CoreError {
        CoreError::NoRouteFound {
            source_chain: query.source_chain.clone(),
            source_token: query.source_token.clone(),
            target_chain: query.target_chain.clone(),
            target_token: query.target_token.clone(),
            max_hops,
        }
    }
}

struct EdgeStep {
    weight: f64,
    unreliability: f64,
}

/// Which side of the pair `token` is, if any
fn token_side(pool: &LiquidityPool, token: &str) -> Option<usize> {
    if pool.token_pair.0 == token {
        Some(0)
    } else if pool.token_pair.1 == token {
        Some(1)
    } else {
        None
    }
}

fn side_token(pool: &LiquidityPool, side: usize) -> &str {
    if side == 0 {
        &pool.token_pair.0
    } else {
        &pool.token_pair.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::graph::tests::{bridge, pool};
    use crate::routing::graph::FeeModel;

    fn scenario_graph() -> Arc<PoolGraph> {
        // 1000 USDC from Ethereum to SOL on Solana. Two candidate paths:
        // direct bridge at 0.3% / 90s, or a TON hub at 0.05% + 0.05% / 240s.
        let graph = Arc::new(PoolGraph::new());
        graph
            .refresh(
                vec![
                    pool("eth-usdc-weth", "ethereum", "USDC", "WETH", 2_000_000.0),
                    pool("ton-usdc-ton", "ton", "USDC", "TON", 1_500_000.0),
                    pool("sol-usdc-sol", "solana", "USDC", "SOL", 800_000.0),
                ],
                vec![
                    bridge(
                        "direct-eth-sol",
                        "ethereum",
                        "solana",
                        "USDC",
                        FeeModel::Percentage(0.003),
                        90.0,
                    ),
                    bridge(
                        "hub-eth-ton",
                        "ethereum",
                        "ton",
                        "USDC",
                        FeeModel::Percentage(0.0005),
                        120.0,
                    ),
                    bridge(
                        "hub-ton-sol",
                        "ton",
                        "solana",
                        "USDC",
                        FeeModel::Percentage(0.0005),
                        120.0,
                    ),
                ],
            )
            .unwrap();
        graph
    }

    fn optimizer(graph: Arc<PoolGraph>) -> RouteOptimizer {
        RouteOptimizer::new(graph, RoutingConfig::default())
    }

    fn query() -> RouteQuery {
        RouteQuery {
            source_chain: "ethereum".to_string(),
            target_chain: "solana".to_string(),
            source_token: "USDC".to_string(),
            target_token: "SOL".to_string(),
            amount_usd: 1000.0,
            max_hops: None,
        }
    }

    fn assert_chained(route: &Route, source_chain: &str, target_chain: &str) {
        assert!(!route.segments.is_empty());
        assert_eq!(route.segments[0].source_pool.blockchain, source_chain);
        assert_eq!(
            route.segments.last().unwrap().target_pool.blockchain,
            target_chain
        );
        for pair in route.segments.windows(2) {
            assert_eq!(
                pair[0].target_pool.blockchain,
                pair[1].source_pool.blockchain
            );
        }
    }

    #[test]
    fn test_fee_strategy_prefers_hub_route() {
        let opt = optimizer(scenario_graph());
        let route = opt.find_optimal_route(&query(), Strategy::Fee).unwrap();

        // Hub route: two bridge segments through TON
        assert_eq!(route.segments.len(), 2);
        assert_eq!(route.segments[0].target_pool.blockchain, "ton");
        assert_chained(&route, "ethereum", "solana");
    }

    #[test]
    fn test_time_strategy_prefers_direct_route() {
        let opt = optimizer(scenario_graph());
        let route = opt.find_optimal_route(&query(), Strategy::Time).unwrap();

        assert_eq!(route.segments.len(), 1);
        assert_eq!(
            route.segments[0].bridge.as_ref().unwrap().id,
            "direct-eth-sol"
        );
        assert_chained(&route, "ethereum", "solana");
    }

    #[test]
    fn test_strategy_dominance_on_one_snapshot() {
        let opt = optimizer(scenario_graph());
        let routes = opt.find_routes(&query()).unwrap();

        let fee = &routes[&Strategy::Fee];
        let time = &routes[&Strategy::Time];
        let output = &routes[&Strategy::Output];

        assert!(fee.total_fee_usd <= time.total_fee_usd);
        assert!(fee.total_fee_usd <= output.total_fee_usd);
        assert!(time.total_time_secs <= fee.total_time_secs);
        assert!(time.total_time_secs <= output.total_time_secs);
        assert!(output.expected_output >= fee.expected_output - 1e-9);
        assert!(output.expected_output >= time.expected_output);

        for route in routes.values() {
            assert_chained(route, "ethereum", "solana");
            assert!(route.expected_output <= 1000.0);
        }
    }

    #[test]
    fn test_expected_output_consistent_with_slippage() {
        let opt = optimizer(scenario_graph());
        let route = opt.find_optimal_route(&query(), Strategy::Output).unwrap();

        assert!(route.expected_output > 0.0 && route.expected_output < 1000.0);
        let implied = 1.0 - route.expected_output / 1000.0;
        assert!((route.estimated_slippage - implied).abs() < 1e-9);
    }

    #[test]
    fn test_max_hops_bound_forces_direct_route() {
        let opt = optimizer(scenario_graph());
        let mut q = query();
        q.max_hops = Some(1);

        // Fee strategy would prefer the hub, but it needs two hops
        let route = opt.find_optimal_route(&q, Strategy::Fee).unwrap();
        assert_eq!(route.segments.len(), 1);
        assert_eq!(
            route.segments[0].bridge.as_ref().unwrap().id,
            "direct-eth-sol"
        );
    }

    #[test]
    fn test_no_route_found() {
        let opt = optimizer(scenario_graph());
        let mut q = query();
        q.target_token = "DOGE".to_string();

        let err = opt.find_optimal_route(&q, Strategy::Fee);
        assert!(matches!(err, Err(CoreError::NoRouteFound { .. })));
    }

    #[test]
    fn test_dust_amount_rejected() {
        let opt = optimizer(scenario_graph());
        let mut q = query();
        q.amount_usd = 0.25;

        let err = opt.find_optimal_route(&q, Strategy::Fee);
        assert!(matches!(err, Err(CoreError::DustAmount { .. })));
    }

    #[test]
    fn test_pool_minimum_excludes_edge() {
        let graph = Arc::new(PoolGraph::new());
        let mut gated = pool("sol-usdc-sol", "solana", "USDC", "SOL", 800_000.0);
        gated.min_amount_usd = 5_000.0;
        graph
            .refresh(
                vec![
                    pool("eth-usdc-weth", "ethereum", "USDC", "WETH", 2_000_000.0),
                    gated,
                ],
                vec![bridge(
                    "direct-eth-sol",
                    "ethereum",
                    "solana",
                    "USDC",
                    FeeModel::Percentage(0.003),
                    90.0,
                )],
            )
            .unwrap();

        // 1000 USDC is under the target pool's 5000 floor, so the only exit
        // swap is excluded.
        let err = optimizer(graph).find_optimal_route(&query(), Strategy::Fee);
        assert!(matches!(err, Err(CoreError::InsufficientLiquidity { .. })));
    }

    #[test]
    fn test_same_chain_single_pool_route() {
        let graph = Arc::new(PoolGraph::new());
        graph
            .refresh(
                vec![pool("eth-usdc-weth", "ethereum", "USDC", "WETH", 2_000_000.0)],
                vec![],
            )
            .unwrap();

        let q = RouteQuery {
            source_chain: "ethereum".to_string(),
            target_chain: "ethereum".to_string(),
            source_token: "USDC".to_string(),
            target_token: "WETH".to_string(),
            amount_usd: 1000.0,
            max_hops: None,
        };
        let route = optimizer(graph)
            .find_optimal_route(&q, Strategy::Fee)
            .unwrap();

        assert_eq!(route.segments.len(), 1);
        assert!(route.segments[0].bridge.is_none());
        assert_eq!(route.segments[0].source_pool.id, "eth-usdc-weth");
        assert_eq!(route.segments[0].target_pool.id, "eth-usdc-weth");
        // One swap at 30 bps plus slippage on a deep pool
        assert!(route.total_fee_usd > 3.0 && route.total_fee_usd < 4.0);
    }

    #[test]
    fn test_same_chain_two_pool_hop() {
        // USDC -> WETH has no direct pool; route through DAI
        let graph = Arc::new(PoolGraph::new());
        graph
            .refresh(
                vec![
                    pool("eth-usdc-dai", "ethereum", "USDC", "DAI", 2_000_000.0),
                    pool("eth-dai-weth", "ethereum", "DAI", "WETH", 2_000_000.0),
                ],
                vec![],
            )
            .unwrap();

        let q = RouteQuery {
            source_chain: "ethereum".to_string(),
            target_chain: "ethereum".to_string(),
            source_token: "USDC".to_string(),
            target_token: "WETH".to_string(),
            amount_usd: 1000.0,
            max_hops: None,
        };
        let route = optimizer(graph)
            .find_optimal_route(&q, Strategy::Fee)
            .unwrap();

        assert_eq!(route.segments.len(), 1);
        assert_eq!(route.segments[0].source_pool.id, "eth-usdc-dai");
        assert_eq!(route.segments[0].target_pool.id, "eth-dai-weth");
        assert!(route.segments[0].bridge.is_none());
    }

    #[test]
    fn test_empty_graph() {
        let opt = optimizer(Arc::new(PoolGraph::new()));
        let err = opt.find_optimal_route(&query(), Strategy::Fee);
        assert!(matches!(err, Err(CoreError::EmptyGraph)));
    }
}
