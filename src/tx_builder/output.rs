//! Built and signed transaction values

use super::fees::FeeFields;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};

/// Fully specified transaction awaiting a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub fees: FeeFields,
}

impl UnsignedTransaction {
    /// Worst-case spend: `gas_limit * max price + value`
    pub fn max_cost(&self) -> U256 {
        self.fees.max_cost(self.gas_limit).saturating_add(self.value)
    }
}

/// Request used for `eth_estimateGas` before the gas limit is known
pub(crate) fn estimation_request(
    from: Address,
    to: Address,
    value: U256,
    input: &Bytes,
    nonce: u64,
    fees: &FeeFields,
) -> TransactionRequest {
    let mut request = TransactionRequest {
        from: Some(from),
        to: Some(TxKind::Call(to)),
        value: Some(value),
        input: TransactionInput::new(input.clone()),
        nonce: Some(nonce),
        ..Default::default()
    };
    match *fees {
        FeeFields::Legacy { gas_price } => request.gas_price = Some(gas_price),
        FeeFields::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            request.max_fee_per_gas = Some(max_fee_per_gas);
            request.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        }
    }
    request
}

/// Signed, encoded transaction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    raw: Bytes,
    hash: B256,
    nonce: u64,
}

impl SignedTransaction {
    pub(crate) fn new(raw: Bytes, hash: B256, nonce: u64) -> Self {
        Self { raw, hash, nonce }
    }

    /// EIP-2718 encoding, ready for `eth_sendRawTransaction`
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}
