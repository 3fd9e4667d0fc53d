//! What a caller wants executed, before any chain state is consulted

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiplier applied to gas limits and base fees, stored in basis points
/// so that application stays in integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct GasMultiplier(u32);

impl GasMultiplier {
    pub const ONE: Self = Self(10_000);

    pub fn from_bps(bps: u32) -> Result<Self, String> {
        if bps < Self::ONE.0 {
            return Err(format!("gas multiplier must be >= 1.0, got {}", bps as f64 / 10_000.0));
        }
        Ok(Self(bps))
    }

    pub fn bps(self) -> u32 {
        self.0
    }

    /// `ceil(value * multiplier)`
    pub fn apply(self, value: u128) -> u128 {
        let bps = self.0 as u128;
        let scaled = value.saturating_mul(bps);
        scaled / 10_000 + u128::from(scaled % 10_000 != 0)
    }

    pub fn apply_gas(self, gas: u64) -> u64 {
        u64::try_from(self.apply(gas as u128)).unwrap_or(u64::MAX)
    }
}

impl Default for GasMultiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<f64> for GasMultiplier {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value < 1.0 || value > 100.0 {
            return Err(format!("gas multiplier must be in [1.0, 100.0], got {value}"));
        }
        Self::from_bps((value * 10_000.0).round() as u32)
    }
}

impl From<GasMultiplier> for f64 {
    fn from(value: GasMultiplier) -> Self {
        value.0 as f64 / 10_000.0
    }
}

impl fmt::Display for GasMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", f64::from(*self))
    }
}

/// Caller-supplied fee values that bypass node queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeOverrides {
    pub gas_price: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// A transaction to perform, independent of nonce and fees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub fees: FeeOverrides,
    pub gas_multiplier: GasMultiplier,
}

impl TransactionIntent {
    /// Contract call carrying calldata
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
            fees: FeeOverrides::default(),
            gas_multiplier: GasMultiplier::ONE,
        }
    }

    /// Plain native-coin transfer
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            value,
            ..Self::call(to, Bytes::new())
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_multiplier(mut self, multiplier: GasMultiplier) -> Self {
        self.gas_multiplier = multiplier;
        self
    }

    pub fn with_priority_fee(mut self, max_priority_fee_per_gas: u128) -> Self {
        self.fees.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.fees.gas_price = Some(gas_price);
        self
    }
}
