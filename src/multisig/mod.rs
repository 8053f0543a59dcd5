//! Multi-signature coordination for cross-chain actions
//!
//! Layers M-of-N per-chain signature collection on top of verification: each
//! secondary chain holds one approval slot, filled when that chain submits a
//! signature the `SignatureVerifier` accepts. Scheme-level validity is the
//! verifier's concern; this module owns the request lifecycle.

use crate::chain::SignatureVerifier;
use crate::config::MultiSigConfig;
use crate::error::{CoreError, CoreResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status of one chain's approval slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Verified,
    Rejected,
}

/// One chain's approval slot
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalSlot {
    pub chain: String,
    pub status: ApprovalStatus,
    pub updated_at: DateTime<Utc>,
}

/// Overall multi-sig request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiSigStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

impl MultiSigStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MultiSigStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MultiSigStatus::Pending => "pending",
            MultiSigStatus::Approved => "approved",
            MultiSigStatus::Rejected => "rejected",
            MultiSigStatus::Expired => "expired",
            MultiSigStatus::Cancelled => "cancelled",
        }
    }
}

/// A proposed cross-chain action collecting signatures toward a threshold
#[derive(Debug, Clone, Serialize)]
pub struct MultiSigRequest {
    pub id: Uuid,
    pub vault_id: String,
    pub source_chain: String,
    pub supported_chains: Vec<String>,
    pub approvals: Vec<ApprovalSlot>,
    /// Last accepted signature per chain
    pub signatures: HashMap<String, String>,
    pub required_signatures: usize,
    pub status: MultiSigStatus,
    /// 100 x verified approvals / required signatures, capped at 100
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MultiSigRequest {
    fn verified_approvals(&self) -> usize {
        self.approvals
            .iter()
            .filter(|a| a.status == ApprovalStatus::Verified)
            .count()
    }

    /// Payload a chain signs over for this request
    pub fn signing_payload(&self) -> String {
        format!("{}:{}:{}", self.vault_id, self.source_chain, self.id)
    }

    fn recompute(&mut self) {
        let verified = self.verified_approvals();
        self.progress =
            ((100.0 * verified as f64 / self.required_signatures.max(1) as f64) as u8).min(100);
        if self.status == MultiSigStatus::Pending && verified >= self.required_signatures {
            self.status = MultiSigStatus::Approved;
        }
    }
}

/// Coordinates signature collection for multi-sig requests
pub struct MultiSigCoordinator {
    requests: DashMap<Uuid, MultiSigRequest>,
    verifier: Arc<dyn SignatureVerifier>,
    config: MultiSigConfig,
}

impl MultiSigCoordinator {
    pub fn new(verifier: Arc<dyn SignatureVerifier>, config: MultiSigConfig) -> Self {
        Self {
            requests: DashMap::new(),
            verifier,
            config,
        }
    }

    /// Create a request with one approval slot per secondary chain
    pub fn create_request(
        &self,
        vault_id: &str,
        source_chain: &str,
        secondary_chains: Vec<String>,
        required_signatures: usize,
    ) -> CoreResult<MultiSigRequest> {
        if secondary_chains.is_empty() {
            return Err(CoreError::InvalidRequest(
                "at least one secondary chain is required".to_string(),
            ));
        }
        if required_signatures == 0 || required_signatures > secondary_chains.len() {
            return Err(CoreError::InvalidRequest(format!(
                "required signatures {} out of range for {} chains",
                required_signatures,
                secondary_chains.len()
            )));
        }

        let now = Utc::now();
        let request = MultiSigRequest {
            id: Uuid::new_v4(),
            vault_id: vault_id.to_string(),
            source_chain: source_chain.to_string(),
            approvals: secondary_chains
                .iter()
                .map(|chain| ApprovalSlot {
                    chain: chain.clone(),
                    status: ApprovalStatus::Pending,
                    updated_at: now,
                })
                .collect(),
            supported_chains: secondary_chains,
            signatures: HashMap::new(),
            required_signatures,
            status: MultiSigStatus::Pending,
            progress: 0,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(self.config.validity_window_secs as i64),
        };

        info!(
            "Created multi-sig request {} for vault {} ({}-of-{})",
            request.id,
            vault_id,
            required_signatures,
            request.supported_chains.len()
        );
        self.requests.insert(request.id, request.clone());
        Ok(request)
    }

    /// Submit a chain's signature. Idempotent per chain: the last valid
    /// signature wins and progress is never double-counted.
    pub async fn submit_signature(
        &self,
        request_id: Uuid,
        chain: &str,
        signature: &str,
    ) -> CoreResult<MultiSigRequest> {
        // Snapshot what the verifier needs, then validate outside the lock
        let (payload, status) = {
            let request = self.get(request_id)?;
            if !request.supported_chains.iter().any(|c| c == chain) {
                return Err(CoreError::InvalidRequest(format!(
                    "chain {} is not part of request {}",
                    chain, request_id
                )));
            }
            (request.signing_payload(), request.status)
        };

        if status.is_terminal() {
            return Err(CoreError::TerminalRequest {
                request_id: request_id.to_string(),
                status: status.as_str().to_string(),
            });
        }

        let valid = self.verifier.verify(chain, signature, &payload).await?;
        if !valid {
            crate::metrics::record_signature_submitted(chain, false);
            return Err(CoreError::InvalidSignature {
                chain: chain.to_string(),
                reason: "rejected by signature verifier".to_string(),
            });
        }

        let mut entry =
            self.requests
                .get_mut(&request_id)
                .ok_or_else(|| CoreError::RequestNotFound {
                    request_id: request_id.to_string(),
                })?;
        let request = entry.value_mut();

        // Re-check under the lock: the request may have expired or been
        // cancelled while the verifier ran.
        expire_if_due(request);
        if request.status.is_terminal() {
            return Err(CoreError::TerminalRequest {
                request_id: request_id.to_string(),
                status: request.status.as_str().to_string(),
            });
        }

        if let Some(slot) = request.approvals.iter_mut().find(|a| a.chain == chain) {
            slot.status = ApprovalStatus::Verified;
            slot.updated_at = Utc::now();
        }
        request
            .signatures
            .insert(chain.to_string(), signature.to_string());
        request.recompute();

        crate::metrics::record_signature_submitted(chain, true);
        debug!(
            "Signature accepted for request {} from {} ({}% complete)",
            request_id, chain, request.progress
        );
        if request.status == MultiSigStatus::Approved {
            info!("Multi-sig request {} approved", request_id);
        }
        Ok(request.clone())
    }

    /// Record an explicit rejection from a chain (not a missing signature)
    pub fn record_rejection(&self, request_id: Uuid, chain: &str) -> CoreResult<MultiSigRequest> {
        let mut entry =
            self.requests
                .get_mut(&request_id)
                .ok_or_else(|| CoreError::RequestNotFound {
                    request_id: request_id.to_string(),
                })?;
        let request = entry.value_mut();

        expire_if_due(request);
        if request.status.is_terminal() {
            return Err(CoreError::TerminalRequest {
                request_id: request_id.to_string(),
                status: request.status.as_str().to_string(),
            });
        }

        if let Some(slot) = request.approvals.iter_mut().find(|a| a.chain == chain) {
            slot.status = ApprovalStatus::Rejected;
            slot.updated_at = Utc::now();
        } else {
            return Err(CoreError::InvalidRequest(format!(
                "chain {} is not part of request {}",
                chain, request_id
            )));
        }

        request.status = MultiSigStatus::Rejected;
        warn!("Multi-sig request {} rejected by {}", request_id, chain);
        Ok(request.clone())
    }

    /// Cancel a request - explicit proposer action, never inferred
    pub fn cancel(&self, request_id: Uuid) -> CoreResult<MultiSigRequest> {
        let mut entry =
            self.requests
                .get_mut(&request_id)
                .ok_or_else(|| CoreError::RequestNotFound {
                    request_id: request_id.to_string(),
                })?;
        let request = entry.value_mut();

        if request.status.is_terminal() {
            return Err(CoreError::TerminalRequest {
                request_id: request_id.to_string(),
                status: request.status.as_str().to_string(),
            });
        }

        request.status = MultiSigStatus::Cancelled;
        info!("Multi-sig request {} cancelled by proposer", request_id);
        Ok(request.clone())
    }

    /// Read-only projection, applying lazy expiry
    pub fn get(&self, request_id: Uuid) -> CoreResult<MultiSigRequest> {
        let mut entry =
            self.requests
                .get_mut(&request_id)
                .ok_or_else(|| CoreError::RequestNotFound {
                    request_id: request_id.to_string(),
                })?;
        expire_if_due(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Expire overdue pending requests; returns how many flipped
    pub fn sweep_expired(&self) -> usize {
        let mut expired = 0;
        for mut entry in self.requests.iter_mut() {
            let before = entry.status;
            expire_if_due(entry.value_mut());
            if before == MultiSigStatus::Pending && entry.status == MultiSigStatus::Expired {
                expired += 1;
            }
        }
        if expired > 0 {
            info!("Expired {} overdue multi-sig requests", expired);
        }
        expired
    }

    /// Aggregate counts by status
    pub fn stats(&self) -> HashMap<&'static str, u64> {
        let mut stats = HashMap::new();
        for entry in self.requests.iter() {
            *stats.entry(entry.status.as_str()).or_insert(0) += 1;
        }
        stats
    }
}

fn expire_if_due(request: &mut MultiSigRequest) {
    if request.status == MultiSigStatus::Pending && Utc::now() >= request.expires_at {
        request.status = MultiSigStatus::Expired;
    }
}

/// Default verifier: checks the signature is well-formed hex of the length
/// the chain's scheme produces. Deployments inject a cryptographic verifier;
/// this keeps the standalone service honest about obviously bad input.
pub struct HexFormatVerifier;

impl HexFormatVerifier {
    fn expected_len(chain: &str) -> usize {
        match chain {
            // 65-byte recoverable ECDSA
            "ethereum" | "polygon" | "arbitrum" => 130,
            // 64-byte ed25519
            "solana" | "ton" => 128,
            _ => 128,
        }
    }
}

#[async_trait]
impl SignatureVerifier for HexFormatVerifier {
    async fn verify(&self, chain: &str, signature: &str, _payload: &str) -> CoreResult<bool> {
        let expected = Self::expected_len(chain);
        Ok(signature.len() == expected && signature.chars().all(|c| c.is_ascii_hexdigit()))
    }
}
