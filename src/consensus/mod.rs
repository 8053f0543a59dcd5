//! Consensus module - multi-chain verification fan-out and request lifecycle

pub mod coordinator;
pub mod store;

pub use coordinator::ConsensusCoordinator;
pub use store::{
    ChainCheckStatus, ChainResult, VerificationRequest, VerificationStatus, VerificationStats,
    VerificationStore,
};
