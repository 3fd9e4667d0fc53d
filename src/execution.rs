//! Transaction execution pipeline
//!
//! One call to [`TransactionExecutor::submit`] runs the whole chain of
//! steps for an intent: nonce lease, fee and gas resolution, balance
//! pre-flight, signing, broadcast and (optionally) confirmation.

use crate::confirmation::{ConfirmationOutcome, ConfirmationWaiter};
use crate::metrics::metrics;
use crate::retry::CancelSignal;
use crate::rpc_manager::{ChainClient, ChainError, ReceiptInfo};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{Signer, TransactionBuilder, TransactionBuilderError, TransactionIntent};
use alloy::primitives::{Address, B256, U256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Coarse classification used by callers to decide what to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or node connectivity; may succeed later
    Transport,
    /// The node or contract rejected the request
    Protocol,
    /// Business precondition failed locally
    Logic,
    /// Broadcast succeeded but no receipt arrived in time
    Unconfirmed,
}

#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("Build failed: {0}")]
    Build(#[from] TransactionBuilderError),

    #[error("Insufficient funds: required {required} wei, available {available} wei")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("Zero balance of token {token}")]
    ZeroBalance { token: Address },

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Invalid task descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Transaction {tx_hash} reverted: {}", reason.as_deref().unwrap_or("no reason"))]
    Reverted {
        tx_hash: B256,
        reason: Option<String>,
    },

    #[error("Transaction {tx_hash} not confirmed in time")]
    Unconfirmed { tx_hash: B256 },

    #[error("RPC error: {0}")]
    Chain(#[from] ChainError),

    #[error("Execution cancelled before signing")]
    Cancelled,
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Build(err) if err.is_transport() => ErrorKind::Transport,
            Self::Build(TransactionBuilderError::Configuration(_))
            | Self::Build(TransactionBuilderError::GasEstimationFailed { .. }) => ErrorKind::Logic,
            Self::Build(_) => ErrorKind::Protocol,
            Self::Chain(err) if err.is_transport() => ErrorKind::Transport,
            Self::Chain(_) => ErrorKind::Protocol,
            Self::Reverted { .. } | Self::ApprovalFailed(_) => ErrorKind::Protocol,
            Self::InsufficientFunds { .. }
            | Self::ZeroBalance { .. }
            | Self::InvalidDescriptor(_)
            | Self::Cancelled => ErrorKind::Logic,
            Self::Unconfirmed { .. } => ErrorKind::Unconfirmed,
        }
    }
}

/// A transaction accepted by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub tx_hash: B256,
    pub nonce: u64,
}

/// Executes intents for one account, one transaction at a time
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    client: Arc<ChainClient>,
    signer: Arc<dyn Signer>,
    builder: TransactionBuilder,
    waiter: ConfirmationWaiter,
    cancel: CancelSignal,
    logger: StructuredLogger,
}

impl TransactionExecutor {
    pub fn new(client: Arc<ChainClient>, signer: Arc<dyn Signer>, cancel: CancelSignal) -> Self {
        let logger = StructuredLogger::for_account(signer.address());
        Self {
            client,
            signer,
            builder: TransactionBuilder::new(),
            waiter: ConfirmationWaiter::default(),
            cancel,
            logger,
        }
    }

    pub fn with_waiter(mut self, waiter: ConfirmationWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Build, sign and broadcast `intent`.
    ///
    /// Cancellation is honoured up to the signing step. Once signed, the
    /// transaction is always handed to the node.
    pub async fn submit(&self, intent: &TransactionIntent) -> Result<SubmittedTransaction, ExecutionError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        // a balance that cannot even cover the value never reaches estimation
        let available = self.client.native_balance().await?.base();
        if available.is_zero() || available < intent.value {
            warn!(
                account = %self.address(),
                value = %intent.value,
                available = %available,
                "Balance does not cover value and gas"
            );
            return Err(ExecutionError::InsufficientFunds {
                required: intent.value,
                available,
            });
        }

        let lease = self.client.lease_nonce().await?;
        let unsigned = match self.builder.build(&self.client, &lease, intent).await {
            Ok(unsigned) => unsigned,
            Err(TransactionBuilderError::GasEstimationFailed { cause }) if cause.is_insufficient_funds() => {
                return Err(ExecutionError::InsufficientFunds {
                    required: intent.value,
                    available,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let required = unsigned.max_cost();
        if available < required {
            warn!(
                account = %self.address(),
                required = %required,
                available = %available,
                "Balance does not cover value plus maximum gas cost"
            );
            return Err(ExecutionError::InsufficientFunds {
                required,
                available,
            });
        }

        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let signed = self.signer.sign_transaction(&unsigned)?;

        let tx_hash = match self.client.broadcast(&signed).await {
            Ok(hash) => hash,
            Err(err @ ChainError::NonceRejected(_)) => {
                lease.invalidate();
                metrics().transactions_failed.inc();
                return Err(err.into());
            }
            Err(err) => {
                metrics().transactions_failed.inc();
                return Err(err.into());
            }
        };
        let nonce = lease.nonce();
        lease.commit();

        metrics().transactions_sent.inc();
        self.logger
            .log_transaction_sent(&tx_hash, nonce, self.client.network().tx_url(&tx_hash.to_string()));

        Ok(SubmittedTransaction { tx_hash, nonce })
    }

    /// Submit and wait for a successful receipt
    pub async fn submit_and_confirm(
        &self,
        intent: &TransactionIntent,
        timeout: Duration,
    ) -> Result<ReceiptInfo, ExecutionError> {
        let submitted = self.submit(intent).await?;
        let outcome = self
            .waiter
            .await_confirmation(&self.client, submitted.tx_hash, timeout)
            .await?;
        self.logger.log_confirmation(&submitted.tx_hash, &outcome);

        match outcome {
            ConfirmationOutcome::Confirmed(receipt) => {
                metrics().transactions_confirmed.inc();
                info!(account = %self.address(), tx_hash = %submitted.tx_hash, "✅ Transaction confirmed");
                Ok(receipt)
            }
            ConfirmationOutcome::Reverted { receipt, reason } => {
                metrics().transactions_reverted.inc();
                Err(ExecutionError::Reverted {
                    tx_hash: receipt.tx_hash,
                    reason,
                })
            }
            ConfirmationOutcome::TimedOut { tx_hash } => {
                metrics().transactions_unconfirmed.inc();
                Err(ExecutionError::Unconfirmed { tx_hash })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::cancel_pair;
    use crate::test_utils::{test_network, test_signer, CountingSigner, MockRpc, ReceiptMode};
    use std::collections::HashSet;

    fn one_ether() -> U256 {
        U256::from(10u64).pow(U256::from(18u8))
    }

    fn executor(mock: &Arc<MockRpc>, signer: Arc<dyn Signer>) -> TransactionExecutor {
        let client = Arc::new(ChainClient::new(mock.clone(), Arc::new(test_network()), signer.address()));
        TransactionExecutor::new(client, signer, CancelSignal::never())
            .with_waiter(ConfirmationWaiter::new(Duration::from_millis(100)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_broadcasts_and_commits_nonce() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(one_ether());
        mock.set_nonce(5);

        let exec = executor(&mock, Arc::new(test_signer()));
        let intent = TransactionIntent::transfer(Address::repeat_byte(9), U256::from(1u8));

        let first = exec.submit(&intent).await.unwrap();
        let second = exec.submit(&intent).await.unwrap();
        assert_eq!(first.nonce, 5);
        assert_eq!(second.nonce, 6);
        assert_eq!(mock.sent_nonces(), vec![5, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_use_distinct_nonces() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(one_ether());
        mock.set_nonce(0);
        // node lags behind our own broadcasts
        mock.set_auto_increment_nonce(false);

        let exec = Arc::new(executor(&mock, Arc::new(test_signer())));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let exec = exec.clone();
            handles.push(tokio::spawn(async move {
                exec.submit(&TransactionIntent::transfer(Address::repeat_byte(3), U256::ZERO))
                    .await
                    .unwrap()
                    .nonce
            }));
        }

        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        let unique: HashSet<_> = nonces.iter().copied().collect();
        assert_eq!(unique.len(), 5);

        let sent = mock.sent_nonces();
        assert!(sent.windows(2).all(|w| w[0] < w[1]), "not strictly increasing: {sent:?}");
        assert_eq!(sent, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_estimation_failure_never_signs() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(one_ether());
        mock.set_gas_estimate_error(ChainError::from_response("mock", 3, "execution reverted"));

        let signer = Arc::new(CountingSigner::new(test_signer()));
        let exec = executor(&mock, signer.clone());

        let err = exec
            .submit(&TransactionIntent::call(Address::repeat_byte(4), vec![0x12]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::Build(TransactionBuilderError::GasEstimationFailed { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert_eq!(signer.count(), 0);
        assert!(mock.sent_nonces().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_rejected_for_funds_is_insufficient_funds() {
        let mock = Arc::new(MockRpc::new());
        // enough for the value, not for value plus gas as the node sees it
        mock.set_balance(U256::from(10u8));
        mock.set_gas_estimate_error(ChainError::from_response(
            "mock",
            -32000,
            "insufficient funds for gas * price + value",
        ));

        let signer = Arc::new(CountingSigner::new(test_signer()));
        let exec = executor(&mock, signer.clone());
        let err = exec
            .submit(&TransactionIntent::transfer(Address::repeat_byte(5), U256::from(1u8)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::InsufficientFunds { available, .. } if available == U256::from(10u8)
        ));
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert_eq!(signer.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_balance_is_logic_error_before_broadcast() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(U256::ZERO);

        let exec = executor(&mock, Arc::new(test_signer()));
        let err = exec
            .submit(&TransactionIntent::transfer(Address::repeat_byte(5), U256::from(1u8)))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::InsufficientFunds { .. }));
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert_eq!(mock.call_count("estimate_gas"), 0);
        assert_eq!(mock.call_count("send_raw_transaction"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_balance_account_cannot_estimate() {
        let mock = Arc::new(MockRpc::new());
        let client = ChainClient::new(mock.clone(), Arc::new(test_network()), Address::repeat_byte(1));
        let lease = client.lease_nonce().await.unwrap();

        let err = TransactionBuilder::new()
            .build(&client, &lease, &TransactionIntent::call(Address::repeat_byte(2), vec![0x01]))
            .await
            .unwrap_err();
        let TransactionBuilderError::GasEstimationFailed { cause } = err else {
            panic!("expected a gas estimation failure");
        };
        assert!(cause.is_insufficient_funds());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_signing() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(one_ether());
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let signer: Arc<dyn Signer> = Arc::new(test_signer());
        let client = Arc::new(ChainClient::new(mock.clone(), Arc::new(test_network()), signer.address()));
        let exec = TransactionExecutor::new(client, signer, signal);

        let err = exec
            .submit(&TransactionIntent::transfer(Address::ZERO, U256::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
        assert!(mock.sent_nonces().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonce_rejection_resyncs_from_chain() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(one_ether());
        mock.set_nonce(2);
        mock.set_auto_increment_nonce(false);

        let exec = executor(&mock, Arc::new(test_signer()));
        let intent = TransactionIntent::transfer(Address::repeat_byte(6), U256::ZERO);
        assert_eq!(exec.submit(&intent).await.unwrap().nonce, 2);

        mock.fail_broadcast_with(ChainError::NonceRejected("nonce too low".into()));
        assert!(exec.submit(&intent).await.is_err());

        // cursor forgotten, next lease follows the node again
        mock.set_nonce(7);
        assert_eq!(exec.submit(&intent).await.unwrap().nonce, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_and_confirm_outcomes() {
        let mock = Arc::new(MockRpc::new());
        mock.set_balance(one_ether());
        let exec = executor(&mock, Arc::new(test_signer()));
        let intent = TransactionIntent::transfer(Address::repeat_byte(7), U256::ZERO);

        mock.set_receipt_mode(ReceiptMode::Success);
        let receipt = exec.submit_and_confirm(&intent, Duration::from_secs(5)).await.unwrap();
        assert!(receipt.success);

        mock.set_receipt_mode(ReceiptMode::Revert);
        let err = exec.submit_and_confirm(&intent, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Reverted { .. }));

        mock.set_receipt_mode(ReceiptMode::Pending);
        let err = exec.submit_and_confirm(&intent, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unconfirmed);
    }

    #[test]
    fn test_error_kinds() {
        let transport = ExecutionError::Chain(ChainError::Timeout {
            endpoint: "node".into(),
            timeout_ms: 1000,
        });
        assert_eq!(transport.kind(), ErrorKind::Transport);

        let fee = ExecutionError::Build(TransactionBuilderError::FeeUnavailable("none".into()));
        assert_eq!(fee.kind(), ErrorKind::Protocol);

        let estimate = ExecutionError::Build(TransactionBuilderError::GasEstimationFailed {
            cause: ChainError::from_response("node", 3, "execution reverted"),
        });
        assert_eq!(estimate.kind(), ErrorKind::Logic);

        let estimate_timeout = ExecutionError::Build(TransactionBuilderError::GasEstimationFailed {
            cause: ChainError::Timeout {
                endpoint: "node".into(),
                timeout_ms: 1000,
            },
        });
        assert_eq!(estimate_timeout.kind(), ErrorKind::Transport);

        let zero = ExecutionError::ZeroBalance { token: Address::ZERO };
        assert_eq!(zero.kind(), ErrorKind::Logic);
    }
}
