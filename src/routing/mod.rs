//! Routing module - liquidity pool graph and multi-objective route search

pub mod feed;
pub mod graph;
pub mod optimizer;

pub use feed::{FeedRefresher, FilePoolFeed, PoolFeed};
pub use graph::{BridgeEdge, FeeModel, GraphSnapshot, LiquidityPool, PoolGraph};
pub use optimizer::{Route, RouteOptimizer, RouteQuery, RouteSegment, Strategy};
