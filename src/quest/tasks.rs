//! Task handlers
//!
//! Campaign tasks are bound to handlers in configuration (`[[tasks]]`).
//! Each [`TaskKind`] variant is a generic on-chain action; what to call and
//! how much to send stays in the configuration file. A task with no binding
//! resolves to [`TaskKind::Manual`] and is skipped.

use crate::approval::ApprovalGuard;
use crate::execution::{ExecutionError, TransactionExecutor};
use crate::tx_builder::{GasMultiplier, TransactionIntent};
use crate::types::TokenAmount;
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Placeholder in calldata templates replaced by the account address
pub const SELF_PLACEHOLDER: &str = "{self}";

/// Send native coin, to the account itself unless `to` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTransfer {
    #[serde(default)]
    pub to: Option<Address>,
    pub amount: Decimal,
}

/// Arbitrary contract call from a hex calldata template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub to: Address,
    pub data: String,
    /// Native value in whole coins
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub gas_multiplier: Option<GasMultiplier>,
}

/// ERC-20 approval followed by a contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveAndCall {
    pub token: Address,
    pub spender: Address,
    /// Whole tokens; the whole balance when unset
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub call: ContractCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum TaskKind {
    NativeTransfer(NativeTransfer),
    ContractCall(ContractCall),
    ApproveAndCall(ApproveAndCall),
    /// Off-chain or manual task, nothing to execute
    Manual,
}

/// One `[[tasks]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBinding {
    pub id: String,
    #[serde(flatten)]
    pub kind: TaskKind,
}

/// What a handler needs from the account pipeline
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub executor: &'a TransactionExecutor,
    pub confirmation_timeout: Duration,
    /// Used when the task does not set its own multiplier
    pub gas_multiplier: GasMultiplier,
}

#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed { tx_hash: B256 },
    /// Broadcast, but no receipt arrived within the confirmation timeout.
    /// The transaction may still land.
    Unconfirmed { tx_hash: B256 },
    Skipped,
    Failed(ExecutionError),
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Unconfirmed { .. } => "unconfirmed",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    /// Hash of a transaction that reached the node, confirmed or not
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::Completed { tx_hash } | Self::Unconfirmed { tx_hash } => Some(*tx_hash),
            Self::Skipped | Self::Failed(_) => None,
        }
    }
}

/// Result of one dispatched task
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task: String,
    pub outcome: TaskOutcome,
}

/// Capability shared by every task handler
#[async_trait]
pub trait QuestAction: Send + Sync {
    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutcome, ExecutionError>;
}

#[async_trait]
impl QuestAction for NativeTransfer {
    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutcome, ExecutionError> {
        let decimals = ctx.executor.client().network().decimals;
        let amount = TokenAmount::from_decimal(self.amount, decimals)
            .map_err(|e| ExecutionError::InvalidDescriptor(e.to_string()))?;
        let to = self.to.unwrap_or_else(|| ctx.executor.address());

        let intent = TransactionIntent::transfer(to, amount.base()).with_gas_multiplier(ctx.gas_multiplier);
        let receipt = ctx
            .executor
            .submit_and_confirm(&intent, ctx.confirmation_timeout)
            .await?;
        Ok(TaskOutcome::Completed {
            tx_hash: receipt.tx_hash,
        })
    }
}

impl ContractCall {
    fn intent(&self, account: Address, decimals: u8, default_multiplier: GasMultiplier) -> Result<TransactionIntent, ExecutionError> {
        let data = render_calldata(&self.data, account)?;
        let value = match self.value {
            Some(value) => TokenAmount::from_decimal(value, decimals)
                .map_err(|e| ExecutionError::InvalidDescriptor(e.to_string()))?
                .base(),
            None => U256::ZERO,
        };
        Ok(TransactionIntent::call(self.to, data)
            .with_value(value)
            .with_gas_multiplier(self.gas_multiplier.unwrap_or(default_multiplier)))
    }
}

#[async_trait]
impl QuestAction for ContractCall {
    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutcome, ExecutionError> {
        let decimals = ctx.executor.client().network().decimals;
        let intent = self.intent(ctx.executor.address(), decimals, ctx.gas_multiplier)?;
        let receipt = ctx
            .executor
            .submit_and_confirm(&intent, ctx.confirmation_timeout)
            .await?;
        Ok(TaskOutcome::Completed {
            tx_hash: receipt.tx_hash,
        })
    }
}

#[async_trait]
impl QuestAction for ApproveAndCall {
    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutcome, ExecutionError> {
        let amount = match self.amount {
            Some(amount) => {
                let decimals = ctx.executor.client().decimals(self.token).await?;
                Some(
                    TokenAmount::from_decimal(amount, decimals)
                        .map_err(|e| ExecutionError::InvalidDescriptor(e.to_string()))?,
                )
            }
            None => None,
        };

        ApprovalGuard::new(ctx.executor, ctx.confirmation_timeout)
            .ensure_approved(self.token, self.spender, amount)
            .await?;
        self.call.execute(ctx).await
    }
}

#[async_trait]
impl QuestAction for TaskKind {
    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutcome, ExecutionError> {
        match self {
            Self::NativeTransfer(handler) => handler.execute(ctx).await,
            Self::ContractCall(handler) => handler.execute(ctx).await,
            Self::ApproveAndCall(handler) => handler.execute(ctx).await,
            Self::Manual => Ok(TaskOutcome::Skipped),
        }
    }
}

static UNBOUND: TaskKind = TaskKind::Manual;

/// Static task id to handler table
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    bindings: HashMap<String, TaskKind>,
}

impl TaskRegistry {
    pub fn new(bindings: impl IntoIterator<Item = TaskBinding>) -> Self {
        Self {
            bindings: bindings.into_iter().map(|b| (b.id, b.kind)).collect(),
        }
    }

    /// Handler for `task`; unbound tasks resolve to [`TaskKind::Manual`]
    pub fn resolve(&self, task: &str) -> &TaskKind {
        self.bindings.get(task).unwrap_or(&UNBOUND)
    }

    pub fn is_bound(&self, task: &str) -> bool {
        self.bindings.contains_key(task)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Decode a hex calldata template, substituting `{self}` with the
/// ABI-encoded (left-padded) account address
pub fn render_calldata(template: &str, account: Address) -> Result<Bytes, ExecutionError> {
    let padded = format!("{:0>64}", hex::encode(account));
    let rendered = template.trim().replace(SELF_PLACEHOLDER, &padded);
    let digits = rendered.strip_prefix("0x").unwrap_or(&rendered);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| ExecutionError::InvalidDescriptor(format!("calldata {template}: {e}")))
}
