//! ERC-20 allowance management

use crate::execution::{ExecutionError, TransactionExecutor};
use crate::rpc_manager::IERC20;
use crate::tx_builder::TransactionIntent;
use crate::types::TokenAmount;
use alloy::primitives::{Address, B256};
use alloy::sol_types::SolCall;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Existing allowance already covers the target amount
    AlreadyApproved,
    /// A confirmed `approve` transaction raised the allowance
    Approved { tx_hash: B256 },
}

/// Makes sure a spender may move enough of the account's tokens
#[derive(Debug, Clone, Copy)]
pub struct ApprovalGuard<'a> {
    executor: &'a TransactionExecutor,
    confirmation_timeout: Duration,
}

impl<'a> ApprovalGuard<'a> {
    pub fn new(executor: &'a TransactionExecutor, confirmation_timeout: Duration) -> Self {
        Self {
            executor,
            confirmation_timeout,
        }
    }

    /// Ensure `spender` may transfer `amount` of `token`.
    ///
    /// With no amount, or an amount above the balance, the whole balance is
    /// approved. A zero balance fails immediately. Repeated calls with the
    /// allowance already in place send nothing.
    pub async fn ensure_approved(
        &self,
        token: Address,
        spender: Address,
        amount: Option<TokenAmount>,
    ) -> Result<ApprovalStatus, ExecutionError> {
        let client = self.executor.client();
        let balance = client.token_balance(token).await?;
        if balance.is_zero() {
            return Err(ExecutionError::ZeroBalance { token });
        }

        let target = match amount {
            Some(amount) if amount.base() <= balance.base() => amount,
            _ => balance,
        };

        let allowance = client.allowance(token, spender).await?;
        if allowance >= target.base() {
            debug!(token = %token, spender = %spender, allowance = %allowance, "Allowance already sufficient");
            return Ok(ApprovalStatus::AlreadyApproved);
        }

        let data = IERC20::approveCall {
            spender,
            value: target.base(),
        }
        .abi_encode();

        let receipt = self
            .executor
            .submit_and_confirm(&TransactionIntent::call(token, data), self.confirmation_timeout)
            .await
            .map_err(|err| match err {
                ExecutionError::Reverted { .. } | ExecutionError::Unconfirmed { .. } => {
                    ExecutionError::ApprovalFailed(err.to_string())
                }
                other => other,
            })?;

        info!(token = %token, spender = %spender, amount = %target, tx_hash = %receipt.tx_hash, "Approved");
        Ok(ApprovalStatus::Approved {
            tx_hash: receipt.tx_hash,
        })
    }
}
