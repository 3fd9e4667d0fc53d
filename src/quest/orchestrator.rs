//! Per-account quest pipeline
//!
//! ```text
//! Unenrolled -> Enrolled -> TasksDiscovered -> Claiming -> Executing
//!                                  ^                          |
//!                                  +---- settle polling <-----+
//!                                  -> Claiming -> Done
//! ```
//!
//! Everything here runs sequentially for one account. Campaign requests
//! retry forever with a jittered delay; cancellation interrupts them.

use super::state::{FailureReason, QuestState};
use super::tasks::{QuestAction, TaskContext, TaskKind, TaskOutcome, TaskRecord, TaskRegistry};
use crate::campaign::{AccountStats, CampaignApi, CampaignError, ClaimAttestation, TaskCatalog};
use crate::config::{CampaignConfig, Config, TransactionConfig};
use crate::execution::{ExecutionError, TransactionExecutor};
use crate::metrics::metrics;
use crate::retry::{cancellable_sleep, retry_with_backoff, CancelSignal, RetryPolicy};
use crate::rpc_manager::ChainError;
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{GasMultiplier, TransactionIntent};
use crate::types::AccountReport;
use alloy::primitives::Address;
use alloy::sol_types::{SolCall, SolValue};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

alloy::sol! {
    /// On-chain enrollment registry
    interface IEnrollment {
        function hasBeenVerified(address user) external view returns (bool);
        function markAsVerified() external;
    }
}

/// What an account run does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Enroll, claim, execute available tasks, claim again, report
    #[default]
    Tasks,
    /// Enroll, claim what is ready, report
    Claim,
    /// Report only
    Stats,
}

#[derive(Debug, Error)]
pub enum QuestError {
    #[error("Native balance is zero, cannot pay for gas")]
    InsufficientGas,

    #[error("Enrollment failed: {0}")]
    Enrollment(ExecutionError),

    #[error("Campaign API error: {0}")]
    Campaign(#[from] CampaignError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Illegal state transition {from} -> {to}")]
    InvalidTransition { from: QuestState, to: QuestState },

    #[error("Cancelled")]
    Cancelled,
}

impl QuestError {
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::InsufficientGas => FailureReason::InsufficientGas,
            Self::Enrollment(ExecutionError::Cancelled)
            | Self::Campaign(CampaignError::Cancelled)
            | Self::Chain(ChainError::Cancelled)
            | Self::Cancelled => FailureReason::Cancelled,
            Self::Enrollment(ExecutionError::InsufficientFunds { .. }) => FailureReason::InsufficientGas,
            Self::Enrollment(err) => FailureReason::Enrollment(err.to_string()),
            Self::Campaign(err) => FailureReason::Campaign(err.to_string()),
            Self::Chain(err) => FailureReason::Chain(err.to_string()),
            Self::InvalidTransition { .. } => FailureReason::Chain(self.to_string()),
        }
    }
}

/// Pacing and policy knobs for one account run
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mode: RunMode,
    pub confirmation_timeout: Duration,
    pub gas_multiplier: GasMultiplier,
    /// Applied to every campaign request
    pub http_retry: RetryPolicy,
    /// Pause after each campaign request
    pub request_delay: Duration,
    /// Pause between consecutive on-chain steps
    pub rpc_delay: Duration,
    pub task_delay: (Duration, Duration),
    pub shuffle_tasks: bool,
    pub settle_polls: u32,
    pub settle_delay: Duration,
    pub registry_contract: Option<Address>,
    pub attestation: ClaimAttestation,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config, mode: RunMode) -> Self {
        Self::from_parts(&config.campaign, &config.transactions, mode)
    }

    fn from_parts(campaign: &CampaignConfig, transactions: &TransactionConfig, mode: RunMode) -> Self {
        Self {
            mode,
            confirmation_timeout: Duration::from_secs(transactions.confirmation_timeout_secs),
            gas_multiplier: transactions.gas_multiplier,
            http_retry: RetryPolicy::forever(
                Duration::from_secs(campaign.retry_min_secs),
                Duration::from_secs(campaign.retry_max_secs),
            ),
            request_delay: Duration::from_secs(campaign.delay_between_requests_secs),
            rpc_delay: Duration::from_secs(transactions.delay_between_rpc_requests_secs),
            task_delay: (
                Duration::from_secs(campaign.task_delay_min_secs),
                Duration::from_secs(campaign.task_delay_max_secs),
            ),
            shuffle_tasks: campaign.shuffle_tasks,
            settle_polls: campaign.settle_polls,
            settle_delay: Duration::from_secs(campaign.settle_delay_secs),
            registry_contract: campaign.registry_contract,
            attestation: campaign.attestation.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_parts(&CampaignConfig::default(), &TransactionConfig::default(), RunMode::default())
    }
}

/// Final result of one account run
#[derive(Debug, Clone)]
pub struct AccountOutcome {
    pub address: Address,
    pub state: QuestState,
    pub tasks: Vec<TaskRecord>,
    pub claimed: Vec<String>,
    /// Absent when the account failed or statistics were unavailable
    pub report: Option<AccountReport>,
}

impl AccountOutcome {
    /// Tasks whose transaction was sent but never confirmed. They count
    /// neither as completed nor as failed.
    pub fn unconfirmed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Unconfirmed { .. }))
            .count()
    }

    pub fn failed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Failed(_)))
            .count()
    }

    /// `success`, `partial` (done with failed tasks) or `failed`
    pub fn status(&self) -> &'static str {
        match &self.state {
            QuestState::Done if self.failed_tasks() == 0 => "success",
            QuestState::Done => "partial",
            _ => "failed",
        }
    }
}

/// Drives one account through the quest pipeline
#[derive(Debug)]
pub struct QuestOrchestrator {
    executor: TransactionExecutor,
    campaign: Arc<dyn CampaignApi>,
    registry: Arc<TaskRegistry>,
    settings: OrchestratorSettings,
    cancel: CancelSignal,
    logger: StructuredLogger,
    state: QuestState,
    dispatched: HashSet<String>,
    records: Vec<TaskRecord>,
    claimed: Vec<String>,
}

impl QuestOrchestrator {
    pub fn new(
        executor: TransactionExecutor,
        campaign: Arc<dyn CampaignApi>,
        registry: Arc<TaskRegistry>,
        settings: OrchestratorSettings,
        cancel: CancelSignal,
    ) -> Self {
        let logger = StructuredLogger::for_account(executor.address());
        Self {
            executor,
            campaign,
            registry,
            settings,
            cancel,
            logger,
            state: QuestState::Unenrolled,
            dispatched: HashSet::new(),
            records: Vec::new(),
            claimed: Vec::new(),
        }
    }

    pub fn state(&self) -> &QuestState {
        &self.state
    }

    pub fn address(&self) -> Address {
        self.executor.address()
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// Run the whole pipeline. Never fails: errors end in `Failed`.
    pub async fn run(mut self) -> AccountOutcome {
        let started = Instant::now();

        if let Err(err) = self.drive().await {
            warn!(account = %self.address(), error = %err, "Account pipeline stopped");
            self.fail(err.failure_reason());
        }

        let report = if self.state == QuestState::Done {
            match self.stats().await {
                Ok(stats) => Some(AccountReport {
                    address: self.address(),
                    level: stats.level,
                    points: stats.total_xp,
                    rank: stats.rank,
                }),
                Err(err) => {
                    warn!(account = %self.address(), error = %err, "Statistics unavailable");
                    None
                }
            }
        } else {
            None
        };

        let outcome = AccountOutcome {
            address: self.address(),
            state: self.state.clone(),
            tasks: std::mem::take(&mut self.records),
            claimed: std::mem::take(&mut self.claimed),
            report,
        };
        metrics()
            .accounts_total
            .with_label_values(&[outcome.status()])
            .inc();
        self.logger.log_summary(&outcome, started.elapsed());
        outcome
    }

    async fn drive(&mut self) -> Result<(), QuestError> {
        if self.settings.mode == RunMode::Stats {
            return self.transition(QuestState::Done);
        }

        self.check_gas().await?;
        self.enroll().await?;

        let catalog = self.discover_tasks().await?;
        self.claim(&catalog.ready).await?;

        if self.settings.mode == RunMode::Tasks && !catalog.available.is_empty() {
            info!(
                account = %self.address(),
                tasks = %catalog.available.join(", "),
                "Available tasks"
            );
            self.dispatch(&catalog.available).await?;

            // unconfirmed transactions may still land and earn XP
            let sent: Vec<String> = self
                .records
                .iter()
                .filter(|r| r.outcome.tx_hash().is_some())
                .map(|r| r.task.clone())
                .collect();
            let catalog = self.settle(&sent).await?;
            self.claim(&catalog.ready).await?;
        }

        self.transition(QuestState::Done)
    }

    async fn check_gas(&mut self) -> Result<(), QuestError> {
        let balance = self.executor.client().native_balance().await?;
        self.logger
            .log_balance(&balance, &self.executor.client().network().coin_symbol);
        if balance.is_zero() {
            return Err(QuestError::InsufficientGas);
        }
        Ok(())
    }

    /// Register the account on-chain unless already verified, then confirm
    /// enrollment with the campaign.
    pub async fn enroll(&mut self) -> Result<(), QuestError> {
        if let Some(registry) = self.settings.registry_contract {
            let account = self.address();
            let raw = self
                .executor
                .client()
                .call(registry, IEnrollment::hasBeenVerifiedCall { user: account }.abi_encode().into())
                .await?;
            let verified =
                bool::abi_decode(&raw).map_err(|e| QuestError::Chain(ChainError::Decode(e.to_string())))?;

            if verified {
                info!(account = %account, "Already enrolled");
            } else {
                self.pause(self.settings.rpc_delay).await?;
                let intent = TransactionIntent::call(registry, IEnrollment::markAsVerifiedCall {}.abi_encode())
                    .with_gas_multiplier(self.settings.gas_multiplier);
                self.executor
                    .submit_and_confirm(&intent, self.settings.confirmation_timeout)
                    .await
                    .map_err(QuestError::Enrollment)?;
                self.pause(self.settings.rpc_delay).await?;
            }
        }

        let response = self
            .campaign_call("campaign_enroll", |api, address| async move { api.enroll(address).await })
            .await?;
        info!(account = %self.address(), verified = response.is_user_verified, "Enrollment status");
        self.pause(self.settings.request_delay).await?;

        self.transition(QuestState::Enrolled)
    }

    /// Fetch and partition the task catalog
    pub async fn discover_tasks(&mut self) -> Result<TaskCatalog, QuestError> {
        let status = self
            .campaign_call("campaign_task_status", |api, address| async move {
                api.task_status(address).await
            })
            .await?;
        let catalog = TaskCatalog::from_status(&status);
        debug!(
            account = %self.address(),
            ready = ?catalog.ready,
            available = ?catalog.available,
            "Tasks discovered"
        );
        self.pause(self.settings.request_delay).await?;

        self.transition(QuestState::TasksDiscovered)?;
        Ok(catalog)
    }

    /// Execute every task in `available` at most once per run. A failing
    /// task is recorded and the next one still runs.
    pub async fn dispatch(&mut self, available: &[String]) -> Result<usize, QuestError> {
        self.transition(QuestState::Executing)?;

        let mut order = available.to_vec();
        if self.settings.shuffle_tasks {
            order.shuffle(&mut rand::thread_rng());
        }

        let ctx = TaskContext {
            executor: &self.executor,
            confirmation_timeout: self.settings.confirmation_timeout,
            gas_multiplier: self.settings.gas_multiplier,
        };
        let mut executed = 0;

        for task in order {
            if !self.dispatched.insert(task.clone()) {
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(QuestError::Cancelled);
            }

            let handler = self.registry.resolve(&task);
            let outcome = if matches!(handler, TaskKind::Manual) {
                TaskOutcome::Skipped
            } else {
                executed += 1;
                match handler.execute(&ctx).await {
                    Ok(outcome) => outcome,
                    Err(ExecutionError::Cancelled) => return Err(QuestError::Cancelled),
                    Err(ExecutionError::Unconfirmed { tx_hash }) => TaskOutcome::Unconfirmed { tx_hash },
                    Err(err) => TaskOutcome::Failed(err),
                }
            };

            metrics()
                .tasks_total
                .with_label_values(&[outcome.label()])
                .inc();
            self.logger.log_task_outcome(&task, &outcome);
            let ran = !matches!(outcome, TaskOutcome::Skipped);
            self.records.push(TaskRecord { task, outcome });

            if ran {
                let delay = random_delay(self.settings.task_delay);
                if !cancellable_sleep(delay, &self.cancel).await {
                    return Err(QuestError::Cancelled);
                }
            }
        }

        Ok(executed)
    }

    /// Poll discovery until the campaign reflects the sent tasks or the
    /// poll budget runs out. XP for a task appears some time after its
    /// transaction confirms.
    async fn settle(&mut self, sent: &[String]) -> Result<TaskCatalog, QuestError> {
        let mut catalog = self.discover_tasks().await?;
        for poll in 0..self.settings.settle_polls {
            let pending: Vec<&String> = sent
                .iter()
                .filter(|task| catalog.available.contains(task))
                .collect();
            if pending.is_empty() {
                break;
            }
            debug!(account = %self.address(), poll, pending = ?pending, "Waiting for campaign to register tasks");
            self.pause(self.settings.settle_delay).await?;
            catalog = self.discover_tasks().await?;
        }
        Ok(catalog)
    }

    /// Claim every task in `ready`, returning the tasks claimed
    pub async fn claim(&mut self, ready: &[String]) -> Result<Vec<String>, QuestError> {
        self.transition(QuestState::Claiming)?;
        if ready.is_empty() {
            info!(account = %self.address(), "Nothing to claim");
            return Ok(Vec::new());
        }

        let signature = self.settings.attestation.sign(self.executor.signer())?;
        let mut claimed = Vec::with_capacity(ready.len());

        for task in ready {
            self.campaign_call("campaign_claim", |api, address| {
                let task = task.clone();
                let signature = signature.clone();
                async move { api.claim(address, &task, &signature).await }
            })
            .await?;

            metrics().claims_total.inc();
            self.logger.log_claim(task);
            claimed.push(task.clone());
            // kept even if a later claim or the pause fails
            self.claimed.push(task.clone());
            self.pause(self.settings.request_delay).await?;
        }

        Ok(claimed)
    }

    /// Level, XP and rank of the account
    pub async fn stats(&self) -> Result<AccountStats, QuestError> {
        let stats = self
            .campaign_call("campaign_stats", |api, address| async move { api.stats(address).await })
            .await?;
        Ok(stats)
    }

    async fn campaign_call<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T, CampaignError>
    where
        F: FnMut(Arc<dyn CampaignApi>, Address) -> Fut,
        Fut: Future<Output = Result<T, CampaignError>>,
    {
        let address = self.address();
        retry_with_backoff(operation, &self.settings.http_retry, &self.cancel, || {
            request(self.campaign.clone(), address)
        })
        .await
    }

    async fn pause(&self, delay: Duration) -> Result<(), QuestError> {
        if delay.is_zero() {
            return Ok(());
        }
        if cancellable_sleep(delay, &self.cancel).await {
            Ok(())
        } else {
            Err(QuestError::Cancelled)
        }
    }

    fn transition(&mut self, next: QuestState) -> Result<(), QuestError> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(&next) {
            return Err(QuestError::InvalidTransition {
                from: self.state.clone(),
                to: next,
            });
        }
        self.logger.log_transition(&self.state, &next);
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, reason: FailureReason) {
        let next = QuestState::Failed(reason);
        if self.state.can_transition_to(&next) {
            self.logger.log_transition(&self.state, &next);
            self.state = next;
        }
    }
}

fn random_delay((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}
