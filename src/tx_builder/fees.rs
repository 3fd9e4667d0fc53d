use super::errors::TransactionBuilderError;
use super::intent::{FeeOverrides, GasMultiplier};
use crate::rpc_manager::ChainClient;
use crate::types::FeeModel;
use alloy::primitives::U256;
use tracing::debug;

/// Fee fields of a transaction, shaped by the network's fee model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeFields {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl FeeFields {
    /// Highest price per gas unit the transaction may pay
    pub fn max_price_per_gas(&self) -> u128 {
        match *self {
            FeeFields::Legacy { gas_price } => gas_price,
            FeeFields::Eip1559 {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
        }
    }

    /// Upper bound on the fee for `gas_limit` units
    pub fn max_cost(&self, gas_limit: u64) -> U256 {
        U256::from(self.max_price_per_gas()) * U256::from(gas_limit)
    }
}

/// Derives fee fields from node data and caller overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeEstimator;

impl FeeEstimator {
    pub async fn estimate(
        &self,
        client: &ChainClient,
        overrides: &FeeOverrides,
        multiplier: GasMultiplier,
    ) -> Result<FeeFields, TransactionBuilderError> {
        match client.network().fee_model {
            FeeModel::Legacy => {
                let gas_price = match overrides.gas_price {
                    Some(price) => price,
                    None => client.gas_price().await?,
                };
                debug!(gas_price, "Legacy fee estimated");
                Ok(FeeFields::Legacy { gas_price })
            }
            FeeModel::Eip1559 => {
                let priority = match overrides.max_priority_fee_per_gas {
                    Some(fee) => fee,
                    None => client.max_priority_fee().await?,
                };
                let base_fee = client.base_fee().await?.ok_or_else(|| {
                    TransactionBuilderError::FeeUnavailable(format!(
                        "network {} reports no base fee",
                        client.network().name
                    ))
                })?;

                let fees = Self::eip1559_fields(base_fee, priority, multiplier);
                debug!(base_fee, priority, max_fee = fees.max_price_per_gas(), "EIP-1559 fee estimated");
                Ok(fees)
            }
        }
    }

    /// `maxFee = ceil(baseFee * multiplier) + priority`
    pub fn eip1559_fields(base_fee: u128, priority: u128, multiplier: GasMultiplier) -> FeeFields {
        FeeFields::Eip1559 {
            max_fee_per_gas: multiplier.apply(base_fee).saturating_add(priority),
            max_priority_fee_per_gas: priority,
        }
    }
}
