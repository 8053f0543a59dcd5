//! Consensus coordinator - concurrent multi-chain verification fan-out
//!
//! One worker task per target chain, joined through an mpsc channel under a
//! single overall deadline. Each worker reports only its own chain's result;
//! the collector is the single merge point, so no chain result is ever
//! written concurrently. Finalisation errs toward collecting every available
//! result - short-circuiting only once the outcome is mathematically settled
//! (a matching quorum already reached).

use crate::chain::{ChainRegistry, ConfirmationOutcome};
use crate::config::ConsensusConfig;
use crate::consensus::store::{
    AttemptRecord, AttemptTrigger, ChainCheckStatus, VerificationRequest, VerificationStatus,
    VerificationStore,
};
use crate::error::{CoreError, CoreResult};

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Coordinates verification requests across chain clients
pub struct ConsensusCoordinator {
    registry: Arc<ChainRegistry>,
    store: Arc<VerificationStore>,
    config: ConsensusConfig,
    /// Fallback per-chain confirmation requirements from configuration
    default_confirmations: HashMap<String, u64>,
    /// Cancellation signals for in-flight polling cycles
    cancellations: DashMap<Uuid, watch::Sender<bool>>,
}

impl ConsensusCoordinator {
    pub fn new(
        registry: Arc<ChainRegistry>,
        store: Arc<VerificationStore>,
        config: ConsensusConfig,
        default_confirmations: HashMap<String, u64>,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            default_confirmations,
            cancellations: DashMap::new(),
        }
    }

    /// Verify a transaction across the target chains.
    ///
    /// Idempotent: while a non-terminal request exists for the transaction,
    /// the existing request is returned without a second fan-out.
    pub async fn verify(
        &self,
        transaction_id: &str,
        source_chain: &str,
        target_chains: Vec<String>,
        required_confirmations: Option<HashMap<String, u64>>,
        timeout: Option<Duration>,
    ) -> CoreResult<VerificationRequest> {
        if transaction_id.is_empty() {
            return Err(CoreError::InvalidRequest(
                "transaction id must not be empty".to_string(),
            ));
        }
        if target_chains.is_empty() {
            return Err(CoreError::InvalidRequest(
                "at least one target chain is required".to_string(),
            ));
        }

        let mut confirmations = HashMap::new();
        for chain in &target_chains {
            let required = required_confirmations
                .as_ref()
                .and_then(|m| m.get(chain).copied())
                .or_else(|| self.default_confirmations.get(chain).copied())
                .unwrap_or(1);
            confirmations.insert(chain.clone(), required);
        }

        let (id, created) = self.store.get_or_create(
            transaction_id,
            source_chain,
            target_chains.clone(),
            confirmations,
        );

        if !created {
            debug!(
                "Verification for {} already in flight, returning request {}",
                transaction_id, id
            );
            return self.store.get(id);
        }

        info!(
            "Verifying {} across {} chains (request {})",
            transaction_id,
            target_chains.len(),
            id
        );
        self.store.update(id, |r| {
            r.status = VerificationStatus::Confirming;
            r.attempts.push(AttemptRecord {
                at: Utc::now(),
                trigger: AttemptTrigger::Initial,
                chains: target_chains.clone(),
            });
        })?;

        self.poll_cycle(id, target_chains, timeout).await?;
        self.store.get(id)
    }

    /// Re-poll the non-terminal chains of an existing request
    pub async fn refresh(&self, request_id: Uuid) -> CoreResult<VerificationRequest> {
        let request = self.store.get(request_id)?;
        if request.status.is_terminal() {
            return Err(CoreError::TerminalRequest {
                request_id: request_id.to_string(),
                status: request.status.as_str().to_string(),
            });
        }

        let chains = request.retryable_chains();
        if chains.is_empty() {
            return Ok(request);
        }

        info!(
            "Refreshing request {} across {} non-terminal chains",
            request_id,
            chains.len()
        );
        self.store.update(request_id, |r| {
            r.status = VerificationStatus::Confirming;
            r.completed_at = None;
            r.attempts.push(AttemptRecord {
                at: Utc::now(),
                trigger: AttemptTrigger::Refresh,
                chains: chains.clone(),
            });
        })?;

        self.poll_cycle(request_id, chains, None).await?;
        self.store.get(request_id)
    }

    /// Cancel an in-flight verification. The request moves to FAILED with a
    /// cancelled reason rather than lingering forever.
    pub async fn cancel(&self, request_id: Uuid) -> CoreResult<VerificationRequest> {
        let request = self.store.get(request_id)?;
        if request.status.is_terminal() {
            return Err(CoreError::TerminalRequest {
                request_id: request_id.to_string(),
                status: request.status.as_str().to_string(),
            });
        }

        // Stop the in-flight workers first, then mark the record
        if let Some(signal) = self.cancellations.get(&request_id) {
            let _ = signal.send(true);
        }
        self.store.update(request_id, |r| {
            r.status = VerificationStatus::Failed;
            r.reason = Some("cancelled".to_string());
            r.completed_at = Some(Utc::now());
        })?;

        warn!("Verification request {} cancelled", request_id);
        crate::metrics::record_verification_outcome("cancelled");
        self.store.get(request_id)
    }

    /// Read-only projection of a request
    pub fn get(&self, request_id: Uuid) -> CoreResult<VerificationRequest> {
        self.store.get(request_id)
    }

    /// One polling round: fan out to `chains`, merge results until the
    /// outcome is settled, the channel drains, the deadline passes, or the
    /// request is cancelled.
    async fn poll_cycle(
        &self,
        id: Uuid,
        chains: Vec<String>,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        let started = Instant::now();
        let request = self.store.get(id)?;
        let transaction_id = request.transaction_id.clone();
        let total_targets = request.target_chains.len();
        let threshold = self.config.threshold.clamp(1, total_targets);

        let timeout = timeout.unwrap_or(Duration::from_millis(self.config.timeout_ms));
        let deadline = tokio::time::Instant::now() + timeout;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancellations.insert(id, cancel_tx);

        let (result_tx, mut result_rx) = mpsc::channel(chains.len().max(1));
        let mut workers = JoinSet::new();
        let mut outstanding = 0usize;

        for chain in chains {
            let client = match self.registry.get(&chain) {
                Ok(client) => client,
                Err(e) => {
                    // No client is a transport-level problem: record it and
                    // leave the chain pending for a later refresh.
                    self.store.update(id, |r| {
                        if let Some(cr) = r.chain_results.get_mut(&chain) {
                            cr.errors.push(e.to_string());
                        }
                    })?;
                    continue;
                }
            };

            let tx_id = transaction_id.clone();
            let sender = result_tx.clone();
            let mut cancelled = cancel_rx.clone();
            outstanding += 1;
            workers.spawn(async move {
                tokio::select! {
                    result = client.get_confirmations(&tx_id) => {
                        let _ = sender.send((chain, result)).await;
                    }
                    _ = cancelled.changed() => {}
                }
            });
        }
        drop(result_tx);

        let mut cancelled = cancel_rx.clone();
        let mut deadline_hit = false;
        let mut was_cancelled = false;

        while outstanding > 0 {
            tokio::select! {
                received = result_rx.recv() => {
                    match received {
                        Some((chain, result)) => {
                            outstanding -= 1;
                            self.merge_result(id, &chain, result)?;
                            if self.matching_quorum(id, threshold)? {
                                debug!("Request {} reached quorum early", id);
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = cancelled.changed() => {
                    was_cancelled = true;
                    break;
                }
                _ = sleep_until(deadline) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        workers.abort_all();
        self.cancellations.remove(&id);

        if was_cancelled {
            // cancel() already marked the record; just make sure nothing is
            // left non-terminal if the signal raced the marker.
            self.store.update(id, |r| {
                if !r.status.is_terminal() {
                    r.status = VerificationStatus::Failed;
                    r.reason = Some("cancelled".to_string());
                    r.completed_at = Some(Utc::now());
                }
            })?;
            return Ok(());
        }

        if deadline_hit {
            debug!("Request {} hit the {}ms deadline", id, timeout.as_millis());
        }

        let status = self.store.update(id, |r| {
            resolve(r, threshold);
            r.status
        })?;

        crate::metrics::record_verification_outcome(status.as_str());
        crate::metrics::record_verification_latency(started.elapsed().as_secs_f64());
        info!(
            "Request {} resolved as {} in {:?}",
            id,
            status.as_str(),
            started.elapsed()
        );
        Ok(())
    }

    /// Merge one chain's report into the request record
    fn merge_result(
        &self,
        id: Uuid,
        chain: &str,
        result: CoreResult<ConfirmationOutcome>,
    ) -> CoreResult<()> {
        self.store.update(id, |r| {
            let required = r.required_confirmations.get(chain).copied().unwrap_or(1);
            let Some(cr) = r.chain_results.get_mut(chain) else {
                return;
            };
            match result {
                Ok(ConfirmationOutcome::Confirmed {
                    confirmations,
                    transaction_hash,
                    amount,
                }) => {
                    cr.confirmations = confirmations;
                    cr.transaction_hash = Some(transaction_hash);
                    cr.observed_amount = Some(amount);
                    cr.status = if confirmations >= required {
                        ChainCheckStatus::Verified
                    } else {
                        ChainCheckStatus::Confirming
                    };
                }
                Ok(ConfirmationOutcome::NotFound) => {
                    // Not visible yet; stays pending for retry
                }
                Ok(ConfirmationOutcome::Failed { reason }) => {
                    cr.status = ChainCheckStatus::Failed;
                    cr.errors.push(reason);
                }
                Err(e) => {
                    // Transport failure is not an on-chain failure: record it
                    // and keep the chain eligible for retry.
                    cr.errors.push(e.to_string());
                }
            }
        })
    }

    /// Whether a matching quorum is already reached (outcome settled)
    fn matching_quorum(&self, id: Uuid, threshold: usize) -> CoreResult<bool> {
        let request = self.store.get(id)?;
        Ok(largest_matching_group(&request) >= threshold)
    }
}

/// Size of the largest group of verified chains agreeing on (hash, amount)
fn largest_matching_group(request: &VerificationRequest) -> usize {
    let mut groups: HashMap<(Option<&String>, Option<u64>), usize> = HashMap::new();
    for result in request.chain_results.values() {
        if result.status == ChainCheckStatus::Verified {
            *groups
                .entry((result.transaction_hash.as_ref(), result.observed_amount))
                .or_insert(0) += 1;
        }
    }
    groups.values().copied().max().unwrap_or(0)
}

/// Compute the aggregate outcome from the collected chain results.
///
/// Never guesses between conflicting reports: a quorum of verified chains
/// that disagree on the transaction data surfaces as INCONSISTENT.
fn resolve(request: &mut VerificationRequest, threshold: usize) {
    let total = request.target_chains.len().max(1);
    let matching = largest_matching_group(request);
    let verified_total = request
        .chain_results
        .values()
        .filter(|r| r.status == ChainCheckStatus::Verified)
        .count();

    request.consistency_score = ((100.0 * matching as f64 / total as f64).round() as u8).min(100);

    if matching >= threshold {
        request.status = VerificationStatus::Verified;
    } else if verified_total >= threshold {
        request.status = VerificationStatus::Inconsistent;
        request.reason = Some("conflicting transaction data across chains".to_string());
    } else {
        let mut unresolved = 0;
        for result in request.chain_results.values_mut() {
            if matches!(
                result.status,
                ChainCheckStatus::Pending | ChainCheckStatus::Confirming
            ) {
                result.status = ChainCheckStatus::Timeout;
                unresolved += 1;
            } else if result.status == ChainCheckStatus::Timeout {
                unresolved += 1;
            }
        }
        if unresolved > 0 {
            request.status = VerificationStatus::Timeout;
        } else {
            request.status = VerificationStatus::Failed;
            request.reason = Some("verification threshold not reached".to_string());
        }
    }

    request.completed_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted chain client for exercising the fan-out
    struct MockClient {
        chain: String,
        script: Script,
        calls: Arc<AtomicUsize>,
    }

    #[derive(Clone)]
    enum Script {
        Confirmed { hash: &'static str, amount: u64, confirmations: u64 },
        OnChainFailure,
        RpcError,
        Hang,
    }

    #[async_trait]
    impl ChainClient for MockClient {
        fn chain(&self) -> &str {
            &self.chain
        }

        async fn get_confirmations(&self, _tx: &str) -> CoreResult<ConfirmationOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Confirmed {
                    hash,
                    amount,
                    confirmations,
                } => Ok(ConfirmationOutcome::Confirmed {
                    confirmations: *confirmations,
                    transaction_hash: hash.to_string(),
                    amount: *amount,
                }),
                Script::OnChainFailure => Ok(ConfirmationOutcome::Failed {
                    reason: "reverted".to_string(),
                }),
                Script::RpcError => Err(CoreError::ChainUnreachable {
                    chain: self.chain.clone(),
                    message: "connection refused".to_string(),
                }),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(ConfirmationOutcome::NotFound)
                }
            }
        }
    }

    struct Harness {
        coordinator: ConsensusCoordinator,
        calls: HashMap<String, Arc<AtomicUsize>>,
    }

    fn harness(scripts: Vec<(&str, Script)>) -> Harness {
        let registry = Arc::new(ChainRegistry::new());
        let mut calls = HashMap::new();
        for (chain, script) in scripts {
            let counter = Arc::new(AtomicUsize::new(0));
            calls.insert(chain.to_string(), counter.clone());
            registry.register(Arc::new(MockClient {
                chain: chain.to_string(),
                script,
                calls: counter,
            }));
        }

        let coordinator = ConsensusCoordinator::new(
            registry,
            Arc::new(VerificationStore::new()),
            ConsensusConfig {
                threshold: 2,
                timeout_ms: 250,
            },
            HashMap::new(),
        );
        Harness { coordinator, calls }
    }

    fn chains() -> Vec<String> {
        vec![
            "ethereum".to_string(),
            "solana".to_string(),
            "ton".to_string(),
        ]
    }

    fn confirmed(hash: &'static str) -> Script {
        Script::Confirmed {
            hash,
            amount: 1000,
            confirmations: 12,
        }
    }

    #[tokio::test]
    async fn test_two_of_three_matching_verifies_without_slow_chain() {
        let h = harness(vec![
            ("ethereum", confirmed("0xdeadbeef")),
            ("solana", confirmed("0xdeadbeef")),
            ("ton", Script::Hang),
        ]);

        let started = Instant::now();
        let request = h
            .coordinator
            .verify("tx-1", "ethereum", chains(), None, None)
            .await
            .unwrap();

        assert_eq!(request.status, VerificationStatus::Verified);
        assert_eq!(request.consistency_score, 67);
        // Quorum short-circuit: well under the hanging chain's sleep
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_conflicting_data_is_inconsistent_never_verified() {
        let h = harness(vec![
            ("ethereum", confirmed("0xdeadbeef")),
            ("solana", confirmed("0xc0ffee")),
            ("ton", Script::OnChainFailure),
        ]);

        let request = h
            .coordinator
            .verify("tx-2", "ethereum", chains(), None, None)
            .await
            .unwrap();

        assert_eq!(request.status, VerificationStatus::Inconsistent);
        assert_eq!(request.consistency_score, 33);
        assert!(request.reason.is_some());
    }

    #[tokio::test]
    async fn test_timeout_then_refresh_repolls_only_non_terminal_chains() {
        let h = harness(vec![
            ("ethereum", confirmed("0xdeadbeef")),
            ("solana", Script::RpcError),
            ("ton", Script::Hang),
        ]);

        let request = h
            .coordinator
            .verify("tx-3", "ethereum", chains(), None, Some(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(request.status, VerificationStatus::Timeout);
        assert_eq!(
            request.chain_results["ethereum"].status,
            ChainCheckStatus::Verified
        );
        // RPC error chain keeps its error recorded and is still retryable
        assert!(!request.chain_results["solana"].errors.is_empty());
        assert_eq!(
            request.chain_results["ton"].status,
            ChainCheckStatus::Timeout
        );

        let eth_calls_before = h.calls["ethereum"].load(Ordering::SeqCst);
        let refreshed = h.coordinator.refresh(request.id).await.unwrap();

        // Verified chain is not re-polled
        assert_eq!(h.calls["ethereum"].load(Ordering::SeqCst), eth_calls_before);
        assert!(h.calls["solana"].load(Ordering::SeqCst) >= 2);
        assert_eq!(refreshed.attempts.len(), 2);
        assert_eq!(refreshed.attempts[1].trigger, AttemptTrigger::Refresh);
    }

    #[tokio::test]
    async fn test_verify_is_idempotent_while_in_flight() {
        let h = Arc::new(harness(vec![
            ("ethereum", Script::Hang),
            ("solana", Script::Hang),
            ("ton", Script::Hang),
        ]));

        let bg = {
            let h = h.clone();
            tokio::spawn(async move {
                h.coordinator
                    .verify(
                        "tx-4",
                        "ethereum",
                        chains(),
                        None,
                        Some(Duration::from_millis(400)),
                    )
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = h
            .coordinator
            .verify("tx-4", "ethereum", chains(), None, None)
            .await
            .unwrap();
        assert_eq!(second.status, VerificationStatus::Confirming);
        assert_eq!(second.attempts.len(), 1);

        let first = bg.await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_all_chains_failed_is_failed_not_timeout() {
        let h = harness(vec![
            ("ethereum", Script::OnChainFailure),
            ("solana", Script::OnChainFailure),
            ("ton", Script::OnChainFailure),
        ]);

        let request = h
            .coordinator
            .verify("tx-5", "ethereum", chains(), None, None)
            .await
            .unwrap();

        assert_eq!(request.status, VerificationStatus::Failed);
        assert_eq!(request.consistency_score, 0);
    }

    #[tokio::test]
    async fn test_insufficient_confirmations_counts_as_confirming() {
        let h = harness(vec![
            (
                "ethereum",
                Script::Confirmed {
                    hash: "0xdeadbeef",
                    amount: 1000,
                    confirmations: 2,
                },
            ),
            ("solana", confirmed("0xdeadbeef")),
            ("ton", confirmed("0xdeadbeef")),
        ]);

        let mut required = HashMap::new();
        required.insert("ethereum".to_string(), 12u64);

        let request = h
            .coordinator
            .verify("tx-6", "ethereum", chains(), Some(required), None)
            .await
            .unwrap();

        // solana + ton match, ethereum is still short of its 12 confirmations
        assert_eq!(request.status, VerificationStatus::Verified);
        assert_eq!(request.consistency_score, 67);
    }

    #[tokio::test]
    async fn test_cancel_moves_to_failed_with_reason() {
        let h = Arc::new(harness(vec![
            ("ethereum", Script::Hang),
            ("solana", Script::Hang),
            ("ton", Script::Hang),
        ]));

        let bg = {
            let h = h.clone();
            tokio::spawn(async move {
                h.coordinator
                    .verify(
                        "tx-7",
                        "ethereum",
                        chains(),
                        None,
                        Some(Duration::from_secs(30)),
                    )
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let pending = h
            .coordinator
            .verify("tx-7", "ethereum", chains(), None, None)
            .await
            .unwrap();
        let cancelled = h.coordinator.cancel(pending.id).await.unwrap();

        assert_eq!(cancelled.status, VerificationStatus::Failed);
        assert_eq!(cancelled.reason.as_deref(), Some("cancelled"));

        let first = bg.await.unwrap();
        assert_eq!(first.status, VerificationStatus::Failed);
    }
}
