//! Chain module - capability traits and the per-chain client registry
//!
//! The coordinator never talks to a blockchain directly. Each supported chain
//! contributes a [`ChainClient`] implementation (RPC plumbing lives with the
//! integration, not here), and signature schemes contribute a
//! [`SignatureVerifier`]. Adding a chain means registering an implementation,
//! not branching on chain names inside the core.

use crate::config::Settings;
use crate::error::{CoreError, CoreResult};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// What a chain reported for a transaction when queried.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    /// Transaction found on chain with the given depth and observed data.
    Confirmed {
        confirmations: u64,
        transaction_hash: String,
        amount: u64,
    },
    /// Transaction not (yet) visible on this chain.
    NotFound,
    /// Transaction included but explicitly failed on chain.
    Failed { reason: String },
}

/// Per-chain capability for fetching transaction confirmations.
///
/// A transport-level problem (node down, rate limited) must surface as
/// `Err(CoreError::ChainUnreachable)`, never as `Failed` - the coordinator
/// treats the two very differently.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Name of the chain this client serves, e.g. "ethereum".
    fn chain(&self) -> &str;

    /// Fetch the confirmation state of a transaction on this chain.
    async fn get_confirmations(&self, transaction_id: &str) -> CoreResult<ConfirmationOutcome>;
}

/// Capability for validating a signature under a chain's scheme.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `payload` for the given chain.
    async fn verify(&self, chain: &str, signature: &str, payload: &str) -> CoreResult<bool>;
}

/// Registry of chain clients, injected at construction time.
///
/// Clients are registered by the embedding integration; the core holds no
/// process-wide singletons.
pub struct ChainRegistry {
    /// Clients indexed by chain name
    clients: DashMap<String, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
    /// Create an empty registry; clients are added via [`register`](Self::register)
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Create a registry pre-populated from an explicit client list
    pub fn with_clients(clients: Vec<Arc<dyn ChainClient>>) -> Self {
        let registry = Self::new();
        for client in clients {
            registry.register(client);
        }
        registry
    }

    /// Register (or replace) the client for a chain
    pub fn register(&self, client: Arc<dyn ChainClient>) {
        let chain = client.chain().to_string();
        info!("Registered chain client for {}", chain);
        self.clients.insert(chain, client);
    }

    /// Get the client for a chain
    pub fn get(&self, chain: &str) -> CoreResult<Arc<dyn ChainClient>> {
        self.clients
            .get(chain)
            .map(|c| c.clone())
            .ok_or_else(|| CoreError::ChainNotFound {
                chain: chain.to_string(),
            })
    }

    /// All registered chain names
    pub fn registered_chains(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    /// Check every configured chain has a registered client, warn otherwise
    pub fn check_coverage(&self, settings: &Settings) {
        for (name, _) in settings.enabled_chains() {
            if !self.clients.contains_key(name.as_str()) {
                warn!(
                    "Chain {} is enabled in configuration but has no registered client",
                    name
                );
            }
        }
    }

    /// Probe every registered client concurrently with a lightweight query
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        // Collect clients up front so no map shard is held across an await
        let clients: Vec<(String, Arc<dyn ChainClient>)> = self
            .clients
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let probes = clients.into_iter().map(|(chain, client)| async move {
            // A NotFound answer still proves the chain endpoint responds.
            let healthy = match client.get_confirmations("trinity-health-probe").await {
                Ok(_) => true,
                Err(e) => !matches!(e, CoreError::ChainUnreachable { .. }),
            };
            crate::metrics::record_chain_health(&chain, healthy);
            (chain, healthy)
        });

        join_all(probes).await
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient {
        chain: String,
    }

    #[async_trait]
    impl ChainClient for StubClient {
        fn chain(&self) -> &str {
            &self.chain
        }

        async fn get_confirmations(&self, _tx: &str) -> CoreResult<ConfirmationOutcome> {
            Ok(ConfirmationOutcome::NotFound)
        }
    }

    struct SlowClient {
        chain: String,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl ChainClient for SlowClient {
        fn chain(&self) -> &str {
            &self.chain
        }

        async fn get_confirmations(&self, _tx: &str) -> CoreResult<ConfirmationOutcome> {
            tokio::time::sleep(self.delay).await;
            Ok(ConfirmationOutcome::NotFound)
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ChainRegistry::new();
        registry.register(Arc::new(StubClient {
            chain: "ethereum".to_string(),
        }));

        assert!(registry.get("ethereum").is_ok());
        assert!(matches!(
            registry.get("solana"),
            Err(CoreError::ChainNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_check_probes_chains_concurrently() {
        let registry = ChainRegistry::new();
        for chain in ["ethereum", "solana", "ton"] {
            registry.register(Arc::new(SlowClient {
                chain: chain.to_string(),
                delay: std::time::Duration::from_millis(100),
            }));
        }

        let started = std::time::Instant::now();
        let health = registry.health_check().await;

        assert_eq!(health.len(), 3);
        assert!(health.iter().all(|(_, healthy)| *healthy));
        // One slow chain must not serialize the others: three 100ms probes
        // joined together finish in roughly one probe's time.
        assert!(started.elapsed() < std::time::Duration::from_millis(250));
    }
}
