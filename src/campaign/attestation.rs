//! EIP-712 claim attestation

use super::client::CampaignError;
use crate::tx_builder::Signer;
use alloy::primitives::{B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};

mod typed {
    alloy::sol! {
        struct Message {
            string content;
        }
    }
}

/// Typed-data message signed to prove account ownership on claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAttestation {
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
    #[serde(default = "default_domain_version")]
    pub domain_version: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_content")]
    pub content: String,
}

fn default_domain_name() -> String { "Hub/XP".to_string() }
fn default_domain_version() -> String { "1".to_string() }
fn default_chain_id() -> u64 { 7000 }
fn default_content() -> String { "Claim XP".to_string() }

impl Default for ClaimAttestation {
    fn default() -> Self {
        Self {
            domain_name: default_domain_name(),
            domain_version: default_domain_version(),
            chain_id: default_chain_id(),
            content: default_content(),
        }
    }
}

impl ClaimAttestation {
    fn domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(self.domain_name.clone().into()),
            Some(self.domain_version.clone().into()),
            Some(U256::from(self.chain_id)),
            None,
            None,
        )
    }

    /// EIP-712 digest of the attestation message
    pub fn signing_hash(&self) -> B256 {
        typed::Message {
            content: self.content.clone(),
        }
        .eip712_signing_hash(&self.domain())
    }

    /// `0x`-prefixed 65-byte signature, as the campaign API expects
    pub fn sign(&self, signer: &dyn Signer) -> Result<String, CampaignError> {
        let signature = signer
            .sign_hash(self.signing_hash())
            .map_err(|e| CampaignError::Signing(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_signer;
    use alloy::primitives::{keccak256, Signature};

    #[test]
    fn test_signing_hash_matches_manual_encoding() {
        let attestation = ClaimAttestation::default();

        let domain_typehash =
            keccak256("EIP712Domain(string name,string version,uint256 chainId)");
        let mut domain_enc = Vec::new();
        domain_enc.extend_from_slice(domain_typehash.as_slice());
        domain_enc.extend_from_slice(keccak256("Hub/XP").as_slice());
        domain_enc.extend_from_slice(keccak256("1").as_slice());
        domain_enc.extend_from_slice(&U256::from(7000u64).to_be_bytes::<32>());
        let domain_separator = keccak256(&domain_enc);

        let mut struct_enc = Vec::new();
        struct_enc.extend_from_slice(keccak256("Message(string content)").as_slice());
        struct_enc.extend_from_slice(keccak256("Claim XP").as_slice());
        let struct_hash = keccak256(&struct_enc);

        let mut digest_enc = vec![0x19, 0x01];
        digest_enc.extend_from_slice(domain_separator.as_slice());
        digest_enc.extend_from_slice(struct_hash.as_slice());

        assert_eq!(attestation.signing_hash(), keccak256(&digest_enc));
    }

    #[test]
    fn test_signature_recovers_to_account() {
        let signer = test_signer();
        let attestation = ClaimAttestation::default();
        let encoded = attestation.sign(&signer).unwrap();

        assert!(encoded.starts_with("0x"));
        assert_eq!(encoded.len(), 2 + 130);

        let bytes = hex::decode(&encoded[2..]).unwrap();
        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        let recovered = signature
            .recover_address_from_prehash(&attestation.signing_hash())
            .unwrap();
        assert_eq!(recovered, signer.address());
    }
}
