use crate::retry::{Cancelled, Retryable};
use thiserror::Error;

/// Errors returned by the JSON-RPC layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Transport-level errors (network, connection, HTTP status)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// JSON-RPC error object returned by the node
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code})")]
    Rpc {
        endpoint: String,
        code: i64,
        message: String,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimited { endpoint: String },

    /// Node rejected the transaction nonce
    #[error("Nonce rejected: {0}")]
    NonceRejected(String),

    /// Response could not be decoded
    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ChainError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Transport { .. } => true,
            ChainError::Timeout { .. } => true,
            ChainError::RateLimited { .. } => true,

            ChainError::Rpc { .. } => false,
            ChainError::NonceRejected(_) => false,
            ChainError::Decode(_) => false,
            ChainError::Cancelled => false,
        }
    }

    /// True for failures of the connection rather than of the request
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChainError::Transport { .. } | ChainError::Timeout { .. } | ChainError::RateLimited { .. }
        )
    }

    /// Short label for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            ChainError::Transport { .. } => "transport",
            ChainError::Timeout { .. } => "timeout",
            ChainError::Rpc { .. } => "rpc",
            ChainError::RateLimited { .. } => "rate_limit",
            ChainError::NonceRejected(_) => "nonce",
            ChainError::Decode(_) => "decode",
            ChainError::Cancelled => "cancelled",
        }
    }

    /// Classify a JSON-RPC error object by its message
    pub fn from_response(endpoint: &str, code: i64, message: &str) -> Self {
        let lowered = message.to_lowercase();

        if lowered.contains("nonce too low")
            || lowered.contains("nonce too high")
            || lowered.contains("invalid nonce")
            || lowered.contains("replacement transaction underpriced")
        {
            ChainError::NonceRejected(message.to_string())
        } else if lowered.contains("rate limit") || lowered.contains("too many requests") {
            ChainError::RateLimited {
                endpoint: endpoint.to_string(),
            }
        } else {
            ChainError::Rpc {
                endpoint: endpoint.to_string(),
                code,
                message: message.to_string(),
            }
        }
    }

    /// The node refused because the sender cannot pay for value and gas
    pub fn is_insufficient_funds(&self) -> bool {
        match self {
            ChainError::Rpc { message, .. } => message.to_lowercase().contains("insufficient funds"),
            _ => false,
        }
    }

    /// `already known` means an identical transaction is in the mempool
    pub fn is_already_known(&self) -> bool {
        match self {
            ChainError::Rpc { message, .. } => {
                let lowered = message.to_lowercase();
                lowered.contains("already known") || lowered.contains("known transaction")
            }
            _ => false,
        }
    }
}

impl Retryable for ChainError {
    fn is_retryable(&self) -> bool {
        ChainError::is_retryable(self)
    }
}

impl From<Cancelled> for ChainError {
    fn from(_: Cancelled) -> Self {
        ChainError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transport = ChainError::Transport {
            endpoint: "http://node".into(),
            message: "connection reset".into(),
        };
        assert!(transport.is_retryable());
        assert!(transport.is_transport());

        let rpc = ChainError::from_response("http://node", -32000, "execution reverted");
        assert!(!rpc.is_retryable());
        assert_eq!(rpc.category(), "rpc");
    }

    #[test]
    fn test_nonce_messages_classified() {
        let err = ChainError::from_response("http://node", -32000, "nonce too low: next nonce 5");
        assert!(matches!(err, ChainError::NonceRejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_limit_classified() {
        let err = ChainError::from_response("http://node", -32005, "Too Many Requests");
        assert!(matches!(err, ChainError::RateLimited { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_already_known() {
        let err = ChainError::from_response("http://node", -32000, "already known");
        assert!(err.is_already_known());
    }

    #[test]
    fn test_insufficient_funds() {
        let err = ChainError::from_response(
            "http://node",
            -32000,
            "Insufficient funds for gas * price + value: have 0 want 21000",
        );
        assert!(err.is_insufficient_funds());
        assert!(!ChainError::Decode("insufficient funds".into()).is_insufficient_funds());
    }
}
