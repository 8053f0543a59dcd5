//! Verification request store
//!
//! Tracks the lifecycle of verification requests, keyed both by request id
//! and by transaction id for idempotent re-query. Records are owned by the
//! coordinator; callers only ever see cloned projections.

use crate::error::{CoreError, CoreResult};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Overall verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Confirming,
    Verified,
    Failed,
    Inconsistent,
    Timeout,
}

impl VerificationStatus {
    /// Timeout is re-pollable via refresh; the other outcomes are final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified
                | VerificationStatus::Failed
                | VerificationStatus::Inconsistent
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Confirming => "confirming",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "failed",
            VerificationStatus::Inconsistent => "inconsistent",
            VerificationStatus::Timeout => "timeout",
        }
    }
}

/// Per-chain verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainCheckStatus {
    Pending,
    Confirming,
    Verified,
    Failed,
    Timeout,
}

impl ChainCheckStatus {
    /// Chains in these states are re-polled on refresh
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainCheckStatus::Pending | ChainCheckStatus::Confirming | ChainCheckStatus::Timeout
        )
    }
}

/// What one chain reported for the transaction
#[derive(Debug, Clone, Serialize)]
pub struct ChainResult {
    pub status: ChainCheckStatus,
    pub confirmations: u64,
    pub transaction_hash: Option<String>,
    pub observed_amount: Option<u64>,
    /// Transport-level errors, appended without replacing the status
    pub errors: Vec<String>,
}

impl ChainResult {
    pub fn pending() -> Self {
        Self {
            status: ChainCheckStatus::Pending,
            confirmations: 0,
            transaction_hash: None,
            observed_amount: None,
            errors: Vec::new(),
        }
    }
}

/// What triggered a polling attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptTrigger {
    Initial,
    Refresh,
}

/// Append-only record of one polling attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub at: DateTime<Utc>,
    pub trigger: AttemptTrigger,
    pub chains: Vec<String>,
}

/// One verification request and its progressive state
#[derive(Debug, Clone, Serialize)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub transaction_id: String,
    pub source_chain: String,
    pub target_chains: Vec<String>,
    pub required_confirmations: HashMap<String, u64>,
    pub status: VerificationStatus,
    /// Percentage of target chains agreeing on the transaction data
    pub consistency_score: u8,
    pub chain_results: HashMap<String, ChainResult>,
    /// Human-readable reason for a failed or inconsistent outcome
    pub reason: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl VerificationRequest {
    /// Chains still eligible for polling
    pub fn retryable_chains(&self) -> Vec<String> {
        self.target_chains
            .iter()
            .filter(|chain| {
                self.chain_results
                    .get(*chain)
                    .map(|r| r.status.is_retryable())
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }
}

/// Aggregate request counts by status
#[derive(Debug, Clone, Serialize, Default)]
pub struct VerificationStats {
    pub pending: u64,
    pub confirming: u64,
    pub verified: u64,
    pub failed: u64,
    pub inconsistent: u64,
    pub timeout: u64,
}

/// In-memory store for verification requests
pub struct VerificationStore {
    requests: DashMap<Uuid, VerificationRequest>,
    /// Latest request id per transaction, for idempotent verify calls
    by_transaction: DashMap<String, Uuid>,
}

impl VerificationStore {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            by_transaction: DashMap::new(),
        }
    }

    /// Return the existing non-terminal request for a transaction, or create
    /// a fresh one. The bool is true when a new request was created.
    pub fn get_or_create(
        &self,
        transaction_id: &str,
        source_chain: &str,
        target_chains: Vec<String>,
        required_confirmations: HashMap<String, u64>,
    ) -> (Uuid, bool) {
        if let Some(existing_id) = self.by_transaction.get(transaction_id).map(|e| *e) {
            if let Some(existing) = self.requests.get(&existing_id) {
                if !existing.status.is_terminal() {
                    return (existing_id, false);
                }
            }
        }

        let id = Uuid::new_v4();
        let chain_results = target_chains
            .iter()
            .map(|c| (c.clone(), ChainResult::pending()))
            .collect();

        let request = VerificationRequest {
            id,
            transaction_id: transaction_id.to_string(),
            source_chain: source_chain.to_string(),
            target_chains,
            required_confirmations,
            status: VerificationStatus::Pending,
            consistency_score: 0,
            chain_results,
            reason: None,
            attempts: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        };

        self.requests.insert(id, request);
        self.by_transaction.insert(transaction_id.to_string(), id);
        (id, true)
    }

    /// Read-only projection of a request
    pub fn get(&self, id: Uuid) -> CoreResult<VerificationRequest> {
        self.requests
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| CoreError::RequestNotFound {
                request_id: id.to_string(),
            })
    }

    /// Mutate a request under its per-entry exclusive section.
    ///
    /// The closure must not block; the coordinator gathers chain results
    /// first and applies them synchronously.
    pub fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut VerificationRequest) -> T,
    ) -> CoreResult<T> {
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| CoreError::RequestNotFound {
                request_id: id.to_string(),
            })?;
        Ok(f(entry.value_mut()))
    }

    /// Aggregate counts by status
    pub fn stats(&self) -> VerificationStats {
        let mut stats = VerificationStats::default();
        for entry in self.requests.iter() {
            match entry.status {
                VerificationStatus::Pending => stats.pending += 1,
                VerificationStatus::Confirming => stats.confirming += 1,
                VerificationStatus::Verified => stats.verified += 1,
                VerificationStatus::Failed => stats.failed += 1,
                VerificationStatus::Inconsistent => stats.inconsistent += 1,
                VerificationStatus::Timeout => stats.timeout += 1,
            }
        }
        stats
    }

    /// Evict terminal requests older than the retention window
    pub fn sweep(&self, retention_secs: u64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(retention_secs as i64);
        let stale: Vec<(Uuid, String)> = self
            .requests
            .iter()
            .filter(|r| {
                r.status.is_terminal()
                    && r.completed_at.map(|t| t < cutoff).unwrap_or(false)
            })
            .map(|r| (r.id, r.transaction_id.clone()))
            .collect();

        for (id, transaction_id) in &stale {
            self.requests.remove(id);
            // Only drop the index if it still points at the evicted request
            if let Some(entry) = self.by_transaction.get(transaction_id) {
                if *entry == *id {
                    drop(entry);
                    self.by_transaction.remove(transaction_id);
                }
            }
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for VerificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(store: &VerificationStore, tx: &str) -> (Uuid, bool) {
        store.get_or_create(
            tx,
            "ethereum",
            vec!["solana".to_string(), "ton".to_string()],
            HashMap::new(),
        )
    }

    #[test]
    fn test_idempotent_while_non_terminal() {
        let store = VerificationStore::new();
        let (first, created) = create(&store, "0xabc");
        assert!(created);

        let (second, created) = create(&store, "0xabc");
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn test_terminal_request_allows_new_verification() {
        let store = VerificationStore::new();
        let (first, _) = create(&store, "0xabc");
        store
            .update(first, |r| {
                r.status = VerificationStatus::Verified;
                r.completed_at = Some(Utc::now());
            })
            .unwrap();

        let (second, created) = create(&store, "0xabc");
        assert!(created);
        assert_ne!(first, second);
    }

    #[test]
    fn test_unknown_request() {
        let store = VerificationStore::new();
        assert!(matches!(
            store.get(Uuid::new_v4()),
            Err(CoreError::RequestNotFound { .. })
        ));
    }

    #[test]
    fn test_sweep_evicts_only_old_terminal_requests() {
        let store = VerificationStore::new();
        let (terminal, _) = create(&store, "0xold");
        store
            .update(terminal, |r| {
                r.status = VerificationStatus::Failed;
                r.completed_at = Some(Utc::now() - chrono::Duration::seconds(7200));
            })
            .unwrap();
        let (active, _) = create(&store, "0xnew");

        let evicted = store.sweep(3600);
        assert_eq!(evicted, 1);
        assert!(store.get(terminal).is_err());
        assert!(store.get(active).is_ok());
    }

    #[test]
    fn test_retryable_chains() {
        let store = VerificationStore::new();
        let (id, _) = create(&store, "0xabc");
        store
            .update(id, |r| {
                r.chain_results.get_mut("solana").unwrap().status = ChainCheckStatus::Verified;
                r.chain_results.get_mut("ton").unwrap().status = ChainCheckStatus::Timeout;
            })
            .unwrap();

        let retryable = store.get(id).unwrap().retryable_chains();
        assert_eq!(retryable, vec!["ton".to_string()]);
    }
}
