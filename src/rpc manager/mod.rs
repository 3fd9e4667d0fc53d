//! RPC Manager Module
//!
//! JSON-RPC access to the target EVM network for a single account:
//! - `EvmRpc`: the raw node surface, one implementation per transport
//! - `ChainClient`: per-account wrapper adding retries, rate limiting and
//!   ERC-20 helpers
//! - `NonceLease`: exclusive, ordered nonce allocation

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

// Submodules
pub mod nonce_lease;
pub mod rpc_alloy;
pub mod rpc_client;
pub mod rpc_errors;

// Re-exports for convenience
pub use nonce_lease::NonceLease;
pub use rpc_alloy::AlloyRpc;
pub use rpc_client::{ChainClient, IERC20};
pub use rpc_errors::ChainError;

/// Subset of a transaction receipt the bot acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptInfo {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Raw node operations. Each call is a single attempt; retries live in
/// [`ChainClient`].
#[async_trait]
pub trait EvmRpc: Send + Sync + std::fmt::Debug {
    /// Endpoint label used in errors and logs
    fn endpoint(&self) -> &str;

    /// Pending transaction count
    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError>;

    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    async fn gas_price(&self) -> Result<u128, ChainError>;

    async fn max_priority_fee(&self) -> Result<u128, ChainError>;

    /// Base fee of the latest block, `None` on pre-London chains
    async fn latest_base_fee(&self) -> Result<Option<u128>, ChainError>;

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError>;

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, ChainError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError>;

    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptInfo>, ChainError>;

    /// Replay a mined transaction as a call to recover its revert message
    async fn revert_reason(
        &self,
        tx_hash: B256,
        block_number: Option<u64>,
    ) -> Result<Option<String>, ChainError>;
}
