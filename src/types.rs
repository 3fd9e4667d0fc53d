//! Common types used throughout the application

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest decimal scale a [`TokenAmount`] can carry exactly.
pub const MAX_DECIMALS: u8 = 28;

/// Fee model of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeeModel {
    /// Single `gasPrice` field
    Legacy,
    /// `maxFeePerGas` / `maxPriorityFeePerGas`
    #[default]
    Eip1559,
}

/// Immutable network descriptor, shared read-only by every account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub rpc: String,
    pub chain_id: u64,
    #[serde(default)]
    pub fee_model: FeeModel,
    pub coin_symbol: String,
    #[serde(default = "default_native_decimals")]
    pub decimals: u8,
    /// Block explorer base URL, used only for log links
    #[serde(default)]
    pub explorer: Option<String>,
}

fn default_native_decimals() -> u8 {
    18
}

impl Network {
    pub fn is_eip1559(&self) -> bool {
        self.fee_model == FeeModel::Eip1559
    }

    /// Explorer link for a transaction hash, if an explorer is configured
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Errors raised while constructing a [`TokenAmount`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Negative amount: {0}")]
    Negative(Decimal),

    #[error("Amount out of range: {0}")]
    OutOfRange(String),

    #[error("Decimal scale {0} exceeds maximum {MAX_DECIMALS}")]
    ScaleTooLarge(u8),

    #[error("Invalid amount literal: {0}")]
    Parse(String),
}

/// A token quantity carried in both base units and human units.
///
/// The base value is always `round(value * 10^decimals)` (half away from
/// zero), computed on integers, for any value a `Decimal` can hold at full
/// scale. Beyond that the base stays authoritative. Instances are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    base: U256,
    value: Decimal,
    decimals: u8,
}

impl TokenAmount {
    /// Build from an integer amount of base units (wei-style).
    ///
    /// The base amount is kept exact for the whole `U256` range. When it does
    /// not fit a `Decimal` at full scale, the human value drops trailing
    /// fractional digits (rounding half away from zero) and saturates at
    /// `Decimal::MAX`.
    pub fn from_base(base: U256, decimals: u8) -> Result<Self, AmountError> {
        if decimals > MAX_DECIMALS {
            return Err(AmountError::ScaleTooLarge(decimals));
        }

        Ok(Self {
            base,
            value: human_value(base, decimals),
            decimals,
        })
    }

    /// Build from a human-scaled decimal value
    pub fn from_decimal(value: Decimal, decimals: u8) -> Result<Self, AmountError> {
        if decimals > MAX_DECIMALS {
            return Err(AmountError::ScaleTooLarge(decimals));
        }
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }

        let mantissa = value.mantissa().unsigned_abs();
        let scale = value.scale() as u8;

        let base = if scale <= decimals {
            let factor = pow10(decimals - scale);
            U256::from(mantissa)
                .checked_mul(factor)
                .ok_or_else(|| AmountError::OutOfRange(value.to_string()))?
        } else {
            // scale <= 28, so the divisor fits in u128
            let divisor = 10u128.pow((scale - decimals) as u32);
            let quotient = mantissa / divisor;
            let remainder = mantissa % divisor;
            let rounded = if remainder >= divisor - remainder {
                quotient + 1
            } else {
                quotient
            };
            U256::from(rounded)
        };

        Ok(Self {
            base,
            value,
            decimals,
        })
    }

    /// Parse a decimal literal such as `"0.015"`
    pub fn parse(literal: &str, decimals: u8) -> Result<Self, AmountError> {
        let value = literal
            .trim()
            .parse::<Decimal>()
            .map_err(|e| AmountError::Parse(format!("{literal}: {e}")))?;
        Self::from_decimal(value, decimals)
    }

    pub fn zero(decimals: u8) -> Self {
        Self {
            base: U256::ZERO,
            value: Decimal::ZERO,
            decimals: decimals.min(MAX_DECIMALS),
        }
    }

    /// Integer base-unit amount
    pub fn base(&self) -> U256 {
        self.base
    }

    /// Human-scaled amount
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.base.is_zero()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.normalize())
    }
}

fn pow10(exp: u8) -> U256 {
    U256::from(10u8).pow(U256::from(exp))
}

fn human_value(base: U256, decimals: u8) -> Decimal {
    for dropped in 0..=decimals {
        let divisor = pow10(dropped);
        let quotient = base / divisor;
        let remainder = base % divisor;
        let rounded = if remainder >= divisor - remainder && !remainder.is_zero() {
            quotient + U256::from(1u8)
        } else {
            quotient
        };

        let mantissa = u128::try_from(rounded).ok().and_then(|m| i128::try_from(m).ok());
        if let Some(value) = mantissa
            .and_then(|m| Decimal::try_from_i128_with_scale(m, (decimals - dropped) as u32).ok())
        {
            return value;
        }
    }
    Decimal::MAX
}

/// One row handed to the report sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReport {
    pub address: Address,
    pub level: u32,
    pub points: u64,
    pub rank: u64,
}
