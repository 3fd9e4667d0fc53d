//! Receipt polling for broadcast transactions

use crate::metrics::metrics;
use crate::rpc_manager::{ChainClient, ChainError, ReceiptInfo};
use alloy::primitives::B256;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Final state of a confirmation wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed(ReceiptInfo),
    Reverted {
        receipt: ReceiptInfo,
        reason: Option<String>,
    },
    /// No receipt before the deadline. The transaction may still be mined.
    TimedOut { tx_hash: B256 },
}

impl ConfirmationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Polls for a receipt at a fixed interval until a deadline
#[derive(Debug, Clone)]
pub struct ConfirmationWaiter {
    poll_interval: Duration,
}

impl Default for ConfirmationWaiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ConfirmationWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(10)),
        }
    }

    /// Wait for `tx_hash` to be mined.
    ///
    /// Transient polling failures are absorbed until the deadline; only a
    /// protocol-level error ends the wait early.
    pub async fn await_confirmation(
        &self,
        client: &ChainClient,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<ConfirmationOutcome, ChainError> {
        let start = Instant::now();
        let deadline = start + timeout;

        loop {
            match client.receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    metrics()
                        .confirmation_latency
                        .observe(start.elapsed().as_secs_f64());
                    if receipt.success {
                        debug!(tx_hash = %tx_hash, block = ?receipt.block_number, "Transaction confirmed");
                        return Ok(ConfirmationOutcome::Confirmed(receipt));
                    }
                    let reason = match client.revert_reason(&receipt).await {
                        Ok(reason) => reason,
                        Err(e) => {
                            debug!(tx_hash = %tx_hash, error = %e, "Revert reason unavailable");
                            None
                        }
                    };
                    return Ok(ConfirmationOutcome::Reverted { receipt, reason });
                }
                Ok(None) => {}
                Err(err) if err.is_retryable() => {
                    debug!(tx_hash = %tx_hash, error = %err, "Receipt poll failed, will retry");
                }
                Err(err) => return Err(err),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(tx_hash = %tx_hash, timeout_secs = timeout.as_secs(), "No receipt before deadline");
                return Ok(ConfirmationOutcome::TimedOut { tx_hash });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::ChainClient;
    use crate::test_utils::{test_network, MockRpc, ReceiptMode};
    use alloy::primitives::Address;
    use std::sync::Arc;

    fn client(mock: &Arc<MockRpc>) -> ChainClient {
        ChainClient::new(mock.clone(), Arc::new(test_network()), Address::repeat_byte(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_after_some_polls() {
        let mock = Arc::new(MockRpc::new());
        let hash = B256::repeat_byte(7);
        mock.insert_receipt_after(hash, true, 3);

        let outcome = ConfirmationWaiter::new(Duration::from_secs(1))
            .await_confirmation(&client(&mock), hash, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(outcome.is_confirmed());
        assert_eq!(mock.call_count("receipt"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_receipt_times_out() {
        let mock = Arc::new(MockRpc::new());
        mock.set_receipt_mode(ReceiptMode::Pending);
        let hash = B256::repeat_byte(8);

        let start = Instant::now();
        let outcome = ConfirmationWaiter::new(Duration::from_secs(2))
            .await_confirmation(&client(&mock), hash, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::TimedOut { tx_hash: hash });
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_receipt_carries_reason() {
        let mock = Arc::new(MockRpc::new());
        let hash = B256::repeat_byte(9);
        mock.insert_receipt_after(hash, false, 0);
        mock.set_revert_reason("execution reverted: already claimed");

        let outcome = ConfirmationWaiter::default()
            .await_confirmation(&client(&mock), hash, Duration::from_secs(10))
            .await
            .unwrap();

        match outcome {
            ConfirmationOutcome::Reverted { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("execution reverted: already claimed"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
