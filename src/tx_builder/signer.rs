use super::errors::TransactionBuilderError;
use super::fees::FeeFields;
use super::output::{SignedTransaction, UnsignedTransaction};
use crate::wallet::AccountKey;
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Signature, TxKind, B256};
use alloy::signers::SignerSync;
use std::fmt::Debug;

/// Produces signatures for one account
pub trait Signer: Send + Sync + Debug {
    fn address(&self) -> Address;

    fn sign_transaction(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<SignedTransaction, TransactionBuilderError>;

    /// Sign a precomputed 32-byte digest (EIP-712 and similar)
    fn sign_hash(&self, hash: B256) -> Result<Signature, TransactionBuilderError>;
}

/// Signer backed by an in-memory private key
#[derive(Debug, Clone)]
pub struct KeySigner {
    key: AccountKey,
}

impl KeySigner {
    pub fn new(key: AccountKey) -> Self {
        Self { key }
    }
}

impl Signer for KeySigner {
    fn address(&self) -> Address {
        self.key.address()
    }

    fn sign_transaction(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<SignedTransaction, TransactionBuilderError> {
        sign_transaction(tx, &self.key)
    }

    fn sign_hash(&self, hash: B256) -> Result<Signature, TransactionBuilderError> {
        self.key
            .with_signer(|signer| signer.sign_hash_sync(&hash))
            .map_err(|e| TransactionBuilderError::signing(e.to_string()))?
            .map_err(|e| TransactionBuilderError::signing(e.to_string()))
    }
}

/// Sign `tx` with `key` and encode it as an EIP-2718 envelope
pub fn sign_transaction(
    tx: &UnsignedTransaction,
    key: &AccountKey,
) -> Result<SignedTransaction, TransactionBuilderError> {
    let envelope = key
        .with_signer(|signer| -> alloy::signers::Result<TxEnvelope> {
            match tx.fees {
                FeeFields::Legacy { gas_price } => {
                    let unsigned = TxLegacy {
                        chain_id: Some(tx.chain_id),
                        nonce: tx.nonce,
                        gas_price,
                        gas_limit: tx.gas_limit,
                        to: TxKind::Call(tx.to),
                        value: tx.value,
                        input: tx.input.clone(),
                    };
                    let signature = signer.sign_hash_sync(&unsigned.signature_hash())?;
                    Ok(TxEnvelope::Legacy(unsigned.into_signed(signature)))
                }
                FeeFields::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                } => {
                    let unsigned = TxEip1559 {
                        chain_id: tx.chain_id,
                        nonce: tx.nonce,
                        gas_limit: tx.gas_limit,
                        max_fee_per_gas,
                        max_priority_fee_per_gas,
                        to: TxKind::Call(tx.to),
                        value: tx.value,
                        input: tx.input.clone(),
                        ..Default::default()
                    };
                    let signature = signer.sign_hash_sync(&unsigned.signature_hash())?;
                    Ok(TxEnvelope::Eip1559(unsigned.into_signed(signature)))
                }
            }
        })
        .map_err(|e| TransactionBuilderError::signing(e.to_string()))?
        .map_err(|e| TransactionBuilderError::signing(e.to_string()))?;

    let hash = *envelope.tx_hash();
    let raw = envelope.encoded_2718();
    Ok(SignedTransaction::new(raw.into(), hash, tx.nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::Transaction as _;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::{keccak256, Bytes, U256};

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn unsigned(fees: FeeFields) -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 7000,
            nonce: 3,
            to: Address::repeat_byte(0x42),
            value: U256::from(1_000u64),
            input: Bytes::from(vec![0x01, 0x02]),
            gas_limit: 30_000,
            fees,
        }
    }

    #[test]
    fn test_eip1559_round_trip() {
        let key = AccountKey::from_hex(TEST_KEY).unwrap();
        let signed = sign_transaction(
            &unsigned(FeeFields::Eip1559 {
                max_fee_per_gas: 100,
                max_priority_fee_per_gas: 2,
            }),
            &key,
        )
        .unwrap();

        assert_eq!(signed.hash(), keccak256(signed.raw()));
        assert_eq!(signed.nonce(), 3);

        let decoded = TxEnvelope::decode_2718(&mut signed.raw().as_ref()).unwrap();
        assert!(decoded.is_eip1559());
        assert_eq!(decoded.nonce(), 3);
        assert_eq!(decoded.chain_id(), Some(7000));

        let inner = decoded.as_eip1559().unwrap();
        let recovered = inner
            .signature()
            .recover_address_from_prehash(&inner.tx().signature_hash())
            .unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn test_legacy_round_trip() {
        let key = AccountKey::from_hex(TEST_KEY).unwrap();
        let signed = sign_transaction(&unsigned(FeeFields::Legacy { gas_price: 50 }), &key).unwrap();

        let decoded = TxEnvelope::decode_2718(&mut signed.raw().as_ref()).unwrap();
        assert!(decoded.is_legacy());
        assert_eq!(decoded.gas_limit(), 30_000);

        let inner = decoded.as_legacy().unwrap();
        let recovered = inner
            .signature()
            .recover_address_from_prehash(&inner.tx().signature_hash())
            .unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn test_sign_hash_recovers() {
        let key = AccountKey::from_hex(TEST_KEY).unwrap();
        let signer = KeySigner::new(key.clone());
        let digest = keccak256(b"hello");
        let signature = signer.sign_hash(digest).unwrap();
        assert_eq!(
            signature.recover_address_from_prehash(&digest).unwrap(),
            key.address()
        );
    }
}
