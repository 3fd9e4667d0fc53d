//! Error types for the Transaction Builder supercomponent
//!
//! Covers the build half of the transaction lifecycle: fee discovery, gas
//! estimation and signing. Node failures are carried as [`ChainError`] so
//! callers can still tell transport problems from protocol rejections.

use crate::rpc_manager::ChainError;
use thiserror::Error;

/// Error type for fee estimation, building and signing
#[derive(Error, Debug, Clone)]
pub enum TransactionBuilderError {
    /// Node could not provide a usable fee
    ///
    /// Raised when an EIP-1559 network reports no base fee, or a fee query fails
    #[error("Fee unavailable: {0}")]
    FeeUnavailable(String),

    /// `eth_estimateGas` failed. The transaction is never signed.
    ///
    /// Usually a revert of the would-be transaction
    #[error("Gas estimation failed: {cause}")]
    GasEstimationFailed { cause: ChainError },

    /// Failed to sign the transaction or message
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Invalid intent or builder settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// RPC failure while collecting build inputs
    #[error("RPC error: {0}")]
    Chain(#[from] ChainError),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Chain(err) => err.is_retryable(),
            Self::FeeUnavailable(_) => false,
            Self::GasEstimationFailed { cause } => cause.is_transport(),
            Self::Signing(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::FeeUnavailable(_) => "fee",
            Self::GasEstimationFailed { .. } => "gas_estimation",
            Self::Signing(_) => "signing",
            Self::Configuration(_) => "configuration",
            Self::Chain(_) => "rpc",
        }
    }

    /// True when the failure came from the connection, not the node's verdict
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Chain(err) => err.is_transport(),
            Self::GasEstimationFailed { cause } => cause.is_transport(),
            _ => false,
        }
    }

    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = TransactionBuilderError::FeeUnavailable("no base fee".into());
        assert_eq!(err.category(), "fee");
        assert!(!err.is_retryable());

        let err = TransactionBuilderError::GasEstimationFailed {
            cause: ChainError::from_response("node", 3, "execution reverted"),
        };
        assert_eq!(err.category(), "gas_estimation");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_chain_error_conversion() {
        let err: TransactionBuilderError = ChainError::Transport {
            endpoint: "node".into(),
            message: "reset".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(err.is_transport());
        assert!(err.to_string().contains("RPC error"));
    }
}
