//! Error types for the Trinity Coordinator

use thiserror::Error;

/// Main error type for the coordinator core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("No route found from {source_chain}/{source_token} to {target_chain}/{target_token} within {max_hops} hops")]
    NoRouteFound {
        source_chain: String,
        source_token: String,
        target_chain: String,
        target_token: String,
        max_hops: usize,
    },

    #[error("Insufficient liquidity: amount {amount_usd} exceeds safe depth of all candidate pools")]
    InsufficientLiquidity { amount_usd: f64 },

    #[error("Amount {amount_usd} is below the minimum swap amount {min_usd}")]
    DustAmount { amount_usd: f64, min_usd: f64 },

    #[error("Pool graph is empty - no liquidity snapshot has been published")]
    EmptyGraph,

    #[error("Malformed pool feed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Chain {chain} unreachable: {message}")]
    ChainUnreachable { chain: String, message: String },

    #[error("Chain {chain} is not registered with the coordinator")]
    ChainNotFound { chain: String },

    #[error("Request {request_id} not found")]
    RequestNotFound { request_id: String },

    #[error("Invalid signature for chain {chain}: {reason}")]
    InvalidSignature { chain: String, reason: String },

    #[error("Request {request_id} is already terminal ({status})")]
    TerminalRequest { request_id: String, status: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ChainUnreachable { .. } | CoreError::Timeout { .. }
        )
    }

    /// Check if error is a hard caller failure (bad input, unknown id)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidRequest(_)
                | CoreError::RequestNotFound { .. }
                | CoreError::ChainNotFound { .. }
                | CoreError::DustAmount { .. }
        )
    }
}

/// Result type for coordinator operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transport = CoreError::ChainUnreachable {
            chain: "ethereum".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(transport.is_retryable());
        assert!(!transport.is_caller_error());

        let bad_input = CoreError::InvalidRequest("empty transaction id".to_string());
        assert!(bad_input.is_caller_error());
        assert!(!bad_input.is_retryable());

        let timeout = CoreError::Timeout {
            operation: "verification".to_string(),
        };
        assert!(timeout.is_retryable());
    }
}
