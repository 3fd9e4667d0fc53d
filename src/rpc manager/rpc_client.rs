use super::nonce_lease::{NonceCursor, NonceLease};
use super::{ChainError, EvmRpc, ReceiptInfo};
use crate::metrics::metrics;
use crate::retry::{retry_with_backoff, CancelSignal, RetryPolicy};
use crate::tx_builder::SignedTransaction;
use crate::types::{Network, TokenAmount};
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use governor::DefaultDirectRateLimiter;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

sol! {
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

/// Node access scoped to one account.
///
/// Read calls retry transient failures with bounded backoff and, when a
/// limiter is attached, wait for the account's request budget first.
#[derive(Clone)]
pub struct ChainClient {
    rpc: Arc<dyn EvmRpc>,
    network: Arc<Network>,
    address: Address,
    retry: RetryPolicy,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    cursor: Arc<Mutex<NonceCursor>>,
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("endpoint", &self.rpc.endpoint())
            .field("network", &self.network.name)
            .field("address", &self.address)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl ChainClient {
    pub fn new(rpc: Arc<dyn EvmRpc>, network: Arc<Network>, address: Address) -> Self {
        Self {
            rpc,
            network,
            address,
            retry: RetryPolicy::default(),
            limiter: None,
            cursor: Arc::new(Mutex::new(NonceCursor::default())),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<DefaultDirectRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Run one node operation with rate limiting and retries
    async fn rpc_call<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, ChainError>
    where
        F: FnMut(Arc<dyn EvmRpc>) -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let start = Instant::now();
        // RPC retries stay bounded, so they are not interrupted by shutdown
        let never = CancelSignal::never();

        let result = retry_with_backoff(operation, &self.retry, &never, || {
            let limiter = self.limiter.clone();
            let call = f(self.rpc.clone());
            async move {
                if let Some(limiter) = limiter {
                    limiter.until_ready().await;
                }
                call.await
            }
        })
        .await;

        let m = metrics();
        m.rpc_latency.observe(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            m.rpc_errors.with_label_values(&[err.category()]).inc();
        }
        result
    }

    /// Pending transaction count of the account
    pub async fn nonce(&self) -> Result<u64, ChainError> {
        let address = self.address;
        self.rpc_call("get_transaction_count", move |rpc| async move {
            rpc.transaction_count(address).await
        })
        .await
    }

    /// Lock the account's nonce cursor and allocate the next nonce.
    ///
    /// The returned lease must be committed after a successful broadcast.
    pub async fn lease_nonce(&self) -> Result<NonceLease, ChainError> {
        let guard = self.cursor.clone().lock_owned().await;
        let pending = self.nonce().await?;
        let nonce = guard.resolve(pending);
        if nonce != pending {
            debug!(account = %self.address, nonce, pending, "Local nonce cursor ahead of node");
        }
        Ok(NonceLease::new(guard, nonce))
    }

    pub async fn native_balance(&self) -> Result<TokenAmount, ChainError> {
        let address = self.address;
        let wei = self
            .rpc_call("get_balance", move |rpc| async move { rpc.balance(address).await })
            .await?;
        to_amount(wei, self.network.decimals)
    }

    pub async fn token_balance(&self, token: Address) -> Result<TokenAmount, ChainError> {
        let decimals = self.decimals(token).await?;
        let data = IERC20::balanceOfCall {
            owner: self.address,
        }
        .abi_encode();
        let raw = self.call(token, data.into()).await?;
        to_amount(decode_u256(&raw)?, decimals)
    }

    /// ERC-20 decimals. A token that does not answer is treated as 0 decimals.
    pub async fn decimals(&self, token: Address) -> Result<u8, ChainError> {
        let data = IERC20::decimalsCall {}.abi_encode();
        match self.call(token, data.into()).await {
            Ok(raw) => match <alloy::sol_types::sol_data::Uint<8> as alloy::sol_types::SolType>::abi_decode(&raw) {
                Ok(decimals) => Ok(decimals),
                Err(e) => {
                    warn!(token = %token, error = %e, "Undecodable decimals(), assuming 0");
                    Ok(0)
                }
            },
            Err(err @ (ChainError::Rpc { .. } | ChainError::Decode(_))) => {
                warn!(token = %token, error = %err, "decimals() failed, assuming 0");
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Raw allowance in base units. Unlimited approvals are `U256::MAX`.
    pub async fn allowance(&self, token: Address, spender: Address) -> Result<U256, ChainError> {
        let data = IERC20::allowanceCall {
            owner: self.address,
            spender,
        }
        .abi_encode();
        let raw = self.call(token, data.into()).await?;
        decode_u256(&raw)
    }

    /// Whether the account holds at least `min` of the native coin (`None`)
    /// or of an ERC-20 token
    pub async fn has_min_balance(&self, token: Option<Address>, min: Decimal) -> Result<bool, ChainError> {
        let balance = match token {
            Some(token) => self.token_balance(token).await?,
            None => self.native_balance().await?,
        };
        Ok(balance.value() >= min)
    }

    /// Read-only contract call from this account
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest {
            from: Some(self.address),
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(data),
            ..Default::default()
        };
        self.rpc_call("eth_call", move |rpc| {
            let request = request.clone();
            async move { rpc.call(request).await }
        })
        .await
    }

    pub async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, ChainError> {
        self.rpc_call("estimate_gas", move |rpc| {
            let request = request.clone();
            async move { rpc.estimate_gas(request).await }
        })
        .await
    }

    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        self.rpc_call("gas_price", |rpc| async move { rpc.gas_price().await })
            .await
    }

    pub async fn max_priority_fee(&self) -> Result<u128, ChainError> {
        self.rpc_call("max_priority_fee", |rpc| async move {
            rpc.max_priority_fee().await
        })
        .await
    }

    pub async fn base_fee(&self) -> Result<Option<u128>, ChainError> {
        self.rpc_call("latest_base_fee", |rpc| async move {
            rpc.latest_base_fee().await
        })
        .await
    }

    /// Broadcast a signed transaction. A node that already holds the
    /// transaction counts as success.
    pub async fn broadcast(&self, tx: &SignedTransaction) -> Result<B256, ChainError> {
        let raw = tx.raw().clone();
        let result = self
            .rpc_call("send_raw_transaction", move |rpc| {
                let raw = raw.clone();
                async move { rpc.send_raw_transaction(raw).await }
            })
            .await;

        match result {
            Ok(hash) => Ok(hash),
            Err(err) if err.is_already_known() => {
                debug!(tx_hash = %tx.hash(), "Transaction already known to node");
                Ok(tx.hash())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptInfo>, ChainError> {
        self.rpc_call("get_transaction_receipt", move |rpc| async move {
            rpc.receipt(tx_hash).await
        })
        .await
    }

    pub async fn revert_reason(&self, receipt: &ReceiptInfo) -> Result<Option<String>, ChainError> {
        let (tx_hash, block) = (receipt.tx_hash, receipt.block_number);
        self.rpc_call("revert_reason", move |rpc| async move {
            rpc.revert_reason(tx_hash, block).await
        })
        .await
    }
}

fn decode_u256(raw: &Bytes) -> Result<U256, ChainError> {
    U256::abi_decode(raw).map_err(|e| ChainError::Decode(e.to_string()))
}

fn to_amount(base: U256, decimals: u8) -> Result<TokenAmount, ChainError> {
    TokenAmount::from_base(base, decimals).map_err(|e| ChainError::Decode(e.to_string()))
}
