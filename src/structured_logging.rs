//! Account-scoped structured log events

use crate::confirmation::ConfirmationOutcome;
use crate::quest::{AccountOutcome, QuestState, TaskOutcome};
use crate::types::TokenAmount;
use alloy::primitives::{Address, B256};
use std::time::Duration;
use uuid::Uuid;

/// Structured logger for one account run
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    account: String,
    run_id: String,
}

impl StructuredLogger {
    pub fn for_account(address: Address) -> Self {
        Self {
            account: address.to_checksum(None),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn log_balance(&self, balance: &TokenAmount, symbol: &str) {
        tracing::info!(
            account = %self.account,
            run_id = %self.run_id,
            balance = %balance,
            symbol = %symbol,
            "Native balance"
        );
    }

    pub fn log_transaction_sent(&self, tx_hash: &B256, nonce: u64, explorer_url: Option<String>) {
        tracing::info!(
            account = %self.account,
            run_id = %self.run_id,
            tx_hash = %tx_hash,
            nonce = %nonce,
            url = explorer_url.as_deref().unwrap_or(""),
            "Transaction sent"
        );
    }

    pub fn log_confirmation(&self, tx_hash: &B256, outcome: &ConfirmationOutcome) {
        match outcome {
            ConfirmationOutcome::Confirmed(receipt) => tracing::debug!(
                account = %self.account,
                run_id = %self.run_id,
                tx_hash = %tx_hash,
                block = ?receipt.block_number,
                gas_used = %receipt.gas_used,
                outcome = "confirmed",
                "Transaction confirmed"
            ),
            ConfirmationOutcome::Reverted { reason, .. } => tracing::warn!(
                account = %self.account,
                run_id = %self.run_id,
                tx_hash = %tx_hash,
                reason = reason.as_deref().unwrap_or("unknown"),
                outcome = "reverted",
                "Transaction reverted"
            ),
            ConfirmationOutcome::TimedOut { .. } => tracing::warn!(
                account = %self.account,
                run_id = %self.run_id,
                tx_hash = %tx_hash,
                outcome = "unconfirmed",
                "Transaction outcome unknown, it may still be mined"
            ),
        }
    }

    pub fn log_transition(&self, from: &QuestState, to: &QuestState) {
        tracing::debug!(
            account = %self.account,
            run_id = %self.run_id,
            from = %from,
            to = %to,
            "State transition"
        );
    }

    pub fn log_task_outcome(&self, task: &str, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed { tx_hash } => tracing::info!(
                account = %self.account,
                run_id = %self.run_id,
                task = %task,
                tx_hash = %tx_hash,
                outcome = "completed",
                "Task completed"
            ),
            TaskOutcome::Unconfirmed { tx_hash } => tracing::warn!(
                account = %self.account,
                run_id = %self.run_id,
                task = %task,
                tx_hash = %tx_hash,
                outcome = "unconfirmed",
                "Task transaction sent but not confirmed in time"
            ),
            TaskOutcome::Skipped => tracing::debug!(
                account = %self.account,
                run_id = %self.run_id,
                task = %task,
                outcome = "skipped",
                "Task has no handler, skipped"
            ),
            TaskOutcome::Failed(err) => tracing::warn!(
                account = %self.account,
                run_id = %self.run_id,
                task = %task,
                kind = ?err.kind(),
                error = %err,
                outcome = "failed",
                "Task failed"
            ),
        }
    }

    pub fn log_claim(&self, task: &str) {
        tracing::info!(
            account = %self.account,
            run_id = %self.run_id,
            task = %task,
            "Claimed task"
        );
    }

    /// Final per-account row, emitted exactly once per run
    pub fn log_summary(&self, outcome: &AccountOutcome, elapsed: Duration) {
        let completed = outcome
            .tasks
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Completed { .. }))
            .count();
        let reason = match &outcome.state {
            QuestState::Failed(reason) => reason.to_string(),
            _ => String::new(),
        };

        tracing::info!(
            account = %self.account,
            run_id = %self.run_id,
            status = outcome.status(),
            state = %outcome.state,
            reason = %reason,
            tasks_completed = completed,
            tasks_unconfirmed = outcome.unconfirmed_tasks(),
            tasks_failed = outcome.failed_tasks(),
            claimed = outcome.claimed.len(),
            points = ?outcome.report.as_ref().map(|r| r.points),
            elapsed_secs = elapsed.as_secs(),
            "Account finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_tag_is_checksummed() {
        let address: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
        let logger = StructuredLogger::for_account(address);
        assert_eq!(logger.account(), "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    }

    #[test]
    fn test_run_ids_differ_per_logger() {
        let a = StructuredLogger::for_account(Address::ZERO);
        let b = StructuredLogger::for_account(Address::ZERO);
        assert_ne!(a.run_id, b.run_id);
    }
}
