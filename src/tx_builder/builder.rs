use super::errors::TransactionBuilderError;
use super::fees::FeeEstimator;
use super::intent::TransactionIntent;
use super::output::{estimation_request, UnsignedTransaction};
use crate::metrics::metrics;
use crate::rpc_manager::{ChainClient, NonceLease};
use std::time::Instant;
use tracing::{debug, warn};

/// Turns an intent into a fully specified unsigned transaction
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    fees: FeeEstimator,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve fees and gas limit for `intent` at the leased nonce.
    ///
    /// Gas estimation failure aborts the build; nothing is signed.
    pub async fn build(
        &self,
        client: &ChainClient,
        lease: &NonceLease,
        intent: &TransactionIntent,
    ) -> Result<UnsignedTransaction, TransactionBuilderError> {
        let start = Instant::now();
        let nonce = lease.nonce();

        let fees = self
            .fees
            .estimate(client, &intent.fees, intent.gas_multiplier)
            .await?;

        let request = estimation_request(
            client.address(),
            intent.to,
            intent.value,
            &intent.data,
            nonce,
            &fees,
        );
        let estimated = client.estimate_gas(request).await.map_err(|cause| {
            warn!(to = %intent.to, nonce, error = %cause, "Gas estimation failed");
            TransactionBuilderError::GasEstimationFailed { cause }
        })?;
        let gas_limit = intent.gas_multiplier.apply_gas(estimated);

        metrics()
            .build_latency
            .observe(start.elapsed().as_secs_f64());
        debug!(to = %intent.to, nonce, estimated, gas_limit, "Transaction built");

        Ok(UnsignedTransaction {
            chain_id: client.network().chain_id,
            nonce,
            to: intent.to,
            value: intent.value,
            input: intent.data.clone(),
            gas_limit,
            fees,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::ChainError;
    use crate::test_utils::{test_network, MockRpc};
    use crate::tx_builder::{FeeFields, GasMultiplier};
    use alloy::primitives::{Address, U256};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_build_applies_multiplier_to_gas_and_fee() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(U256::from(10u64).pow(U256::from(18u8)));
        mock.set_nonce(9);
        mock.set_base_fee(Some(100));
        mock.set_priority_fee(3);
        mock.set_gas_estimate(50_001);

        let client = ChainClient::new(mock.clone(), Arc::new(test_network()), Address::repeat_byte(1));
        let lease = client.lease_nonce().await.unwrap();
        let intent = TransactionIntent::transfer(Address::repeat_byte(2), U256::from(1u8))
            .with_gas_multiplier(GasMultiplier::try_from(1.5).unwrap());

        let tx = TransactionBuilder::new().build(&client, &lease, &intent).await.unwrap();
        assert_eq!(tx.nonce, 9);
        assert_eq!(tx.chain_id, test_network().chain_id);
        // ceil(50001 * 1.5) = 75002
        assert_eq!(tx.gas_limit, 75_002);
        assert_eq!(
            tx.fees,
            FeeFields::Eip1559 {
                max_fee_per_gas: 153,
                max_priority_fee_per_gas: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_failure_surfaces() {
        let mock = Arc::new(MockRpc::new());
        mock.set_gas_estimate_error(ChainError::from_response("mock", 3, "execution reverted"));

        let client = ChainClient::new(mock.clone(), Arc::new(test_network()), Address::repeat_byte(1));
        let lease = client.lease_nonce().await.unwrap();
        let intent = TransactionIntent::call(Address::repeat_byte(2), vec![0xde, 0xad]);

        let err = TransactionBuilder::new().build(&client, &lease, &intent).await.unwrap_err();
        assert!(matches!(err, TransactionBuilderError::GasEstimationFailed { .. }));
    }
}
