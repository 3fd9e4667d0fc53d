//! Test Utilities Module
//!
//! Scripted stand-ins for the node and the campaign API. Both record every
//! call so tests can assert on what was (or was not) sent.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::campaign::{AccountStats, CampaignApi, CampaignError, EnrollResponse, TaskStatusResponse};
use crate::rpc_manager::{ChainError, EvmRpc, ReceiptInfo};
use crate::tx_builder::{KeySigner, Signer, SignedTransaction, TransactionBuilderError, UnsignedTransaction};
use crate::types::{FeeModel, Network};
use crate::wallet::AccountKey;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Well-known development key (first anvil/hardhat account)
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn test_signer() -> KeySigner {
    KeySigner::new(AccountKey::from_hex(TEST_KEY).expect("valid test key"))
}

pub fn test_network() -> Network {
    Network {
        name: "zetachain".to_string(),
        rpc: "http://127.0.0.1:8545".to_string(),
        chain_id: 7000,
        fee_model: FeeModel::Eip1559,
        coin_symbol: "ZETA".to_string(),
        decimals: 18,
        explorer: Some("https://explorer.zetachain.com".to_string()),
    }
}

/// How [`MockRpc`] answers receipt queries for broadcast transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Revert,
    /// Never mined
    Pending,
}

/// Decoded view of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: B256,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

#[derive(Debug)]
struct RpcState {
    balance: U256,
    nonce: u64,
    auto_increment_nonce: bool,
    gas_price: u128,
    priority_fee: u128,
    base_fee: Option<u128>,
    gas_estimate: Result<u64, ChainError>,
    call_results: HashMap<[u8; 4], VecDeque<Result<Bytes, ChainError>>>,
    failures: HashMap<String, u32>,
    broadcast_error: Option<ChainError>,
    calls: HashMap<String, usize>,
    sent: Vec<SentTransaction>,
    sent_hashes: HashSet<B256>,
    scheduled_receipts: HashMap<B256, (bool, u32)>,
    receipt_mode: ReceiptMode,
    revert_reason: Option<String>,
}

/// Scripted JSON-RPC node
#[derive(Debug)]
pub struct MockRpc {
    state: Mutex<RpcState>,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRpc {
    /// Zero balance, nonce 0, 1 gwei fees, 21k gas, receipts succeed
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RpcState {
                balance: U256::ZERO,
                nonce: 0,
                auto_increment_nonce: true,
                gas_price: 1_000_000_000,
                priority_fee: 1_000_000_000,
                base_fee: Some(1_000_000_000),
                gas_estimate: Ok(21_000),
                call_results: HashMap::new(),
                failures: HashMap::new(),
                broadcast_error: None,
                calls: HashMap::new(),
                sent: Vec::new(),
                sent_hashes: HashSet::new(),
                scheduled_receipts: HashMap::new(),
                receipt_mode: ReceiptMode::Success,
                revert_reason: None,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RpcState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Count the call and apply any scripted transport failure
    fn enter(&self, method: &str) -> Result<std::sync::MutexGuard<'_, RpcState>, ChainError> {
        let mut state = self.state();
        *state.calls.entry(method.to_string()).or_default() += 1;
        if let Some(remaining) = state.failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ChainError::Transport {
                    endpoint: "mock".into(),
                    message: "connection reset by peer".into(),
                });
            }
        }
        Ok(state)
    }

    pub fn set_balance(&self, balance: U256) {
        self.state().balance = balance;
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.state().nonce = nonce;
    }

    /// Whether a broadcast advances the node's pending nonce
    pub fn set_auto_increment_nonce(&self, enabled: bool) {
        self.state().auto_increment_nonce = enabled;
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state().gas_price = gas_price;
    }

    pub fn set_priority_fee(&self, priority_fee: u128) {
        self.state().priority_fee = priority_fee;
    }

    pub fn set_base_fee(&self, base_fee: Option<u128>) {
        self.state().base_fee = base_fee;
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        self.state().gas_estimate = Ok(gas);
    }

    pub fn set_gas_estimate_error(&self, err: ChainError) {
        self.state().gas_estimate = Err(err);
    }

    /// Answer every `eth_call` with this selector with `result`
    pub fn set_call_result(&self, selector: [u8; 4], result: Bytes) {
        self.state()
            .call_results
            .insert(selector, VecDeque::from([Ok(result)]));
    }

    pub fn set_call_error(&self, selector: [u8; 4], err: ChainError) {
        self.state()
            .call_results
            .insert(selector, VecDeque::from([Err(err)]));
    }

    /// Answer successive calls in order, repeating the last result
    pub fn push_call_results(&self, selector: [u8; 4], results: Vec<Bytes>) {
        self.state()
            .call_results
            .insert(selector, results.into_iter().map(Ok).collect());
    }

    /// Fail the next `count` calls of `method` with a transport error
    pub fn fail_next(&self, method: &str, count: u32) {
        self.state().failures.insert(method.to_string(), count);
    }

    /// Reject the next broadcast with `err`
    pub fn fail_broadcast_with(&self, err: ChainError) {
        self.state().broadcast_error = Some(err);
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        self.state().receipt_mode = mode;
    }

    /// Return a receipt for `hash` after `polls` empty answers
    pub fn insert_receipt_after(&self, hash: B256, success: bool, polls: u32) {
        self.state().scheduled_receipts.insert(hash, (success, polls));
    }

    pub fn set_revert_reason(&self, reason: &str) {
        self.state().revert_reason = Some(reason.to_string());
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    pub fn sent_transactions(&self) -> Vec<SentTransaction> {
        self.state().sent.clone()
    }

    /// Nonces of accepted broadcasts, in broadcast order
    pub fn sent_nonces(&self) -> Vec<u64> {
        self.state().sent.iter().map(|tx| tx.nonce).collect()
    }

    fn receipt_info(hash: B256, success: bool) -> ReceiptInfo {
        ReceiptInfo {
            tx_hash: hash,
            success,
            block_number: Some(1),
            gas_used: 21_000,
        }
    }
}

#[async_trait]
impl EvmRpc for MockRpc {
    fn endpoint(&self) -> &str {
        "mock"
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64, ChainError> {
        Ok(self.enter("transaction_count")?.nonce)
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(self.enter("balance")?.balance)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.enter("gas_price")?.gas_price)
    }

    async fn max_priority_fee(&self) -> Result<u128, ChainError> {
        Ok(self.enter("max_priority_fee")?.priority_fee)
    }

    async fn latest_base_fee(&self) -> Result<Option<u128>, ChainError> {
        Ok(self.enter("latest_base_fee")?.base_fee)
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError> {
        let mut state = self.enter("call")?;
        let input = request.input.input().cloned().unwrap_or_default();
        let Some(selector) = input.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()) else {
            return Err(ChainError::from_response("mock", 3, "execution reverted"));
        };
        match state.call_results.get_mut(&selector) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(ChainError::Decode("empty".into()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ChainError::Decode("empty".into()))),
            None => Err(ChainError::from_response("mock", 3, "execution reverted")),
        }
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, ChainError> {
        let state = self.enter("estimate_gas")?;
        let estimate = state.gas_estimate.clone()?;
        // nodes refuse to simulate what the sender cannot pay for
        let value = request.value.unwrap_or_default();
        if state.balance.is_zero() || state.balance < value {
            return Err(ChainError::from_response(
                "mock",
                -32000,
                "insufficient funds for gas * price + value",
            ));
        }
        Ok(estimate)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let mut state = self.enter("send_raw_transaction")?;
        if let Some(err) = state.broadcast_error.take() {
            return Err(err);
        }

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| ChainError::Decode(format!("bad raw transaction: {e}")))?;
        let hash = keccak256(&raw);
        let nonce = envelope.nonce();
        state.sent.push(SentTransaction {
            hash,
            nonce,
            to: envelope.to().unwrap_or_default(),
            value: envelope.value(),
            input: envelope.input().clone(),
        });
        state.sent_hashes.insert(hash);
        if state.auto_increment_nonce {
            state.nonce = state.nonce.max(nonce + 1);
        }
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptInfo>, ChainError> {
        let mut state = self.enter("receipt")?;
        if let Some((success, polls)) = state.scheduled_receipts.get_mut(&tx_hash) {
            if *polls > 0 {
                *polls -= 1;
                return Ok(None);
            }
            return Ok(Some(Self::receipt_info(tx_hash, *success)));
        }
        if !state.sent_hashes.contains(&tx_hash) {
            return Ok(None);
        }
        Ok(match state.receipt_mode {
            ReceiptMode::Success => Some(Self::receipt_info(tx_hash, true)),
            ReceiptMode::Revert => Some(Self::receipt_info(tx_hash, false)),
            ReceiptMode::Pending => None,
        })
    }

    async fn revert_reason(
        &self,
        _tx_hash: B256,
        _block_number: Option<u64>,
    ) -> Result<Option<String>, ChainError> {
        Ok(self.enter("revert_reason")?.revert_reason.clone())
    }
}

/// Signer wrapper counting transaction signatures
#[derive(Debug)]
pub struct CountingSigner {
    inner: KeySigner,
    count: AtomicUsize,
}

impl CountingSigner {
    pub fn new(inner: KeySigner) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Signer for CountingSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn sign_transaction(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<SignedTransaction, TransactionBuilderError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_transaction(tx)
    }

    fn sign_hash(&self, hash: B256) -> Result<Signature, TransactionBuilderError> {
        self.inner.sign_hash(hash)
    }
}

#[derive(Debug, Default)]
struct CampaignState {
    statuses: VecDeque<TaskStatusResponse>,
    stats: AccountStats,
    failures: HashMap<String, (u32, CampaignError)>,
    calls: HashMap<String, usize>,
    claims: Vec<String>,
}

/// Scripted campaign API
#[derive(Debug, Default)]
pub struct MockCampaign {
    state: Mutex<CampaignState>,
}

impl MockCampaign {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CampaignState> {
        self.state.lock().expect("mock state poisoned")
    }

    fn enter(&self, method: &str) -> Result<std::sync::MutexGuard<'_, CampaignState>, CampaignError> {
        let mut state = self.state();
        *state.calls.entry(method.to_string()).or_default() += 1;
        if let Some((remaining, err)) = state.failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(err.clone());
            }
        }
        Ok(state)
    }

    /// Queue a task-status answer; the last one repeats
    pub fn push_task_status(&self, status: TaskStatusResponse) {
        self.state().statuses.push_back(status);
    }

    pub fn set_stats(&self, stats: AccountStats) {
        self.state().stats = stats;
    }

    /// Fail the next `count` calls of `method` with `err`
    pub fn fail_next(&self, method: &str, count: u32, err: CampaignError) {
        self.state().failures.insert(method.to_string(), (count, err));
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    /// Tasks claimed, in order
    pub fn claims(&self) -> Vec<String> {
        self.state().claims.clone()
    }
}

#[async_trait]
impl CampaignApi for MockCampaign {
    async fn enroll(&self, _address: Address) -> Result<EnrollResponse, CampaignError> {
        self.enter("enroll")?;
        Ok(EnrollResponse {
            is_user_verified: true,
        })
    }

    async fn task_status(&self, _address: Address) -> Result<TaskStatusResponse, CampaignError> {
        let mut state = self.enter("task_status")?;
        let status = if state.statuses.len() > 1 {
            state.statuses.pop_front()
        } else {
            state.statuses.front().cloned()
        };
        Ok(status.unwrap_or_default())
    }

    async fn claim(&self, _address: Address, task: &str, signed_message: &str) -> Result<(), CampaignError> {
        let mut state = self.enter("claim")?;
        if !signed_message.starts_with("0x") {
            return Err(CampaignError::Status {
                status: 400,
                body: "invalid signature".into(),
            });
        }
        state.claims.push(task.to_string());
        Ok(())
    }

    async fn stats(&self, _address: Address) -> Result<AccountStats, CampaignError> {
        Ok(self.enter("stats")?.stats)
    }
}
