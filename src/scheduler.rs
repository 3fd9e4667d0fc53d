//! Account pool
//!
//! Runs one [`QuestOrchestrator`] per account with at most `pool_size` of
//! them in flight. Accounts share nothing mutable: each gets its own RPC
//! transport, campaign client, rate limiter and nonce cursor.

use crate::campaign::HttpCampaignClient;
use crate::config::Config;
use crate::confirmation::ConfirmationWaiter;
use crate::execution::TransactionExecutor;
use crate::metrics::{metrics, GaugeGuard};
use crate::quest::{
    AccountOutcome, FailureReason, OrchestratorSettings, QuestOrchestrator, QuestState, RunMode,
    TaskRegistry,
};
use crate::retry::{cancellable_sleep, CancelSignal};
use crate::rpc_manager::{AlloyRpc, ChainClient};
use crate::tx_builder::{KeySigner, Signer};
use crate::types::{AccountReport, Network};
use crate::wallet::AccountProfile;
use alloy::primitives::Address;
use anyhow::Context;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Builds the orchestrator for one account
pub trait AccountLauncher: Send + Sync {
    fn launch(&self, profile: &AccountProfile, cancel: CancelSignal) -> anyhow::Result<QuestOrchestrator>;
}

/// Launcher wired to the configured network and campaign API
#[derive(Debug)]
pub struct LiveLauncher {
    config: Arc<Config>,
    network: Arc<Network>,
    registry: Arc<TaskRegistry>,
    settings: OrchestratorSettings,
}

impl LiveLauncher {
    pub fn new(config: Arc<Config>, mode: RunMode) -> Self {
        let network = Arc::new(config.network.clone());
        let registry = Arc::new(TaskRegistry::new(config.tasks.clone()));
        let settings = OrchestratorSettings::from_config(&config, mode);
        Self {
            config,
            network,
            registry,
            settings,
        }
    }

    fn rate_limiter(&self) -> Option<Arc<DefaultDirectRateLimiter>> {
        NonZeroU32::new(self.config.rpc.rate_limit_rps)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))))
    }
}

impl AccountLauncher for LiveLauncher {
    fn launch(&self, profile: &AccountProfile, cancel: CancelSignal) -> anyhow::Result<QuestOrchestrator> {
        let proxy = profile.proxy.as_deref();
        let limiter = self.rate_limiter();

        let rpc = AlloyRpc::connect(
            &self.network.rpc,
            proxy,
            Duration::from_secs(self.config.rpc.timeout_secs),
        )
        .with_context(|| format!("account #{}: RPC transport", profile.index))?;

        let mut client = ChainClient::new(Arc::new(rpc), self.network.clone(), profile.address())
            .with_retry_policy(self.config.rpc_retry_policy());
        let mut campaign = HttpCampaignClient::new(&self.config.campaign, proxy)
            .with_context(|| format!("account #{}: campaign client", profile.index))?;
        if let Some(limiter) = limiter {
            client = client.with_rate_limiter(limiter.clone());
            campaign = campaign.with_rate_limiter(limiter);
        }

        let signer: Arc<dyn Signer> = Arc::new(KeySigner::new(profile.key.clone()));
        let executor = TransactionExecutor::new(Arc::new(client), signer, cancel.clone()).with_waiter(
            ConfirmationWaiter::new(Duration::from_millis(self.config.transactions.receipt_poll_interval_ms)),
        );

        Ok(QuestOrchestrator::new(
            executor,
            Arc::new(campaign),
            self.registry.clone(),
            self.settings.clone(),
            cancel,
        ))
    }
}

/// Bounded pool of concurrent account runs
#[derive(Debug, Clone)]
pub struct AccountPool {
    pool_size: usize,
    start_jitter: Duration,
    cancel: CancelSignal,
}

impl AccountPool {
    pub fn new(pool_size: usize, start_jitter: Duration, cancel: CancelSignal) -> Self {
        Self {
            pool_size: pool_size.max(1),
            start_jitter,
            cancel,
        }
    }

    pub fn from_config(config: &Config, cancel: CancelSignal) -> Self {
        Self::new(
            config.scheduler.pool_size,
            Duration::from_secs(config.scheduler.start_jitter_secs),
            cancel,
        )
    }

    /// Run every profile to a terminal state. Outcomes come back in profile
    /// order, one per profile, including accounts that never started.
    pub async fn run(
        &self,
        profiles: Vec<AccountProfile>,
        launcher: Arc<dyn AccountLauncher>,
    ) -> Vec<AccountOutcome> {
        info!(accounts = profiles.len(), pool_size = self.pool_size, "Starting account pool");

        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut handles: Vec<(Address, JoinHandle<AccountOutcome>)> = Vec::with_capacity(profiles.len());

        for profile in profiles {
            let address = profile.address();
            let semaphore = semaphore.clone();
            let launcher = launcher.clone();
            let cancel = self.cancel.clone();
            let jitter = self.start_jitter;

            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return not_started(address, FailureReason::Cancelled),
                    permit = semaphore.acquire_owned() => permit,
                };
                let _permit = match permit {
                    Ok(permit) => permit,
                    Err(_) => return not_started(address, FailureReason::Cancelled),
                };

                let delay = random_jitter(jitter);
                debug!(account = %address, delay_ms = delay.as_millis() as u64, "Start jitter");
                if !cancellable_sleep(delay, &cancel).await || cancel.is_cancelled() {
                    return not_started(address, FailureReason::Cancelled);
                }

                let orchestrator = match launcher.launch(&profile, cancel) {
                    Ok(orchestrator) => orchestrator,
                    Err(e) => {
                        error!(account = %address, error = %format!("{e:#}"), "Failed to set up account");
                        return not_started(address, FailureReason::Setup(format!("{e:#}")));
                    }
                };

                let _active = GaugeGuard::new(&metrics().active_accounts);
                orchestrator.run().await
            });
            handles.push((address, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (address, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(account = %address, error = %e, "Account task aborted");
                    outcomes.push(not_started(address, FailureReason::Setup(e.to_string())));
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.status() != "failed").count();
        info!(
            accounts = outcomes.len(),
            succeeded,
            failed = outcomes.len() - succeeded,
            "Account pool finished"
        );
        outcomes
    }
}

/// Statistics rows of every account that produced them
pub fn collect_reports(outcomes: &[AccountOutcome]) -> Vec<AccountReport> {
    let reports: Vec<AccountReport> = outcomes.iter().filter_map(|o| o.report.clone()).collect();
    if reports.len() < outcomes.len() {
        warn!(
            missing = outcomes.len() - reports.len(),
            "Some accounts have no statistics"
        );
    }
    reports
}

fn not_started(address: Address, reason: FailureReason) -> AccountOutcome {
    metrics()
        .accounts_total
        .with_label_values(&["failed"])
        .inc();
    AccountOutcome {
        address,
        state: QuestState::Failed(reason),
        tasks: Vec::new(),
        claimed: Vec::new(),
        report: None,
    }
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{
        AccountStats, CampaignApi, CampaignError, EnrollResponse, TaskStatusResponse,
    };
    use crate::retry::cancel_pair;
    use crate::test_utils::{test_network, MockRpc};
    use crate::wallet::AccountKey;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Campaign whose statistics call takes a second and tracks overlap
    #[derive(Debug, Default)]
    struct SlowStats {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CampaignApi for SlowStats {
        async fn enroll(&self, _address: Address) -> Result<EnrollResponse, CampaignError> {
            Ok(EnrollResponse { is_user_verified: true })
        }

        async fn task_status(&self, _address: Address) -> Result<TaskStatusResponse, CampaignError> {
            Ok(TaskStatusResponse::default())
        }

        async fn claim(&self, _address: Address, _task: &str, _signed: &str) -> Result<(), CampaignError> {
            Ok(())
        }

        async fn stats(&self, _address: Address) -> Result<AccountStats, CampaignError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(AccountStats::default())
        }
    }

    #[derive(Debug, Default)]
    struct StatsLauncher {
        campaign: Arc<SlowStats>,
        launched: AtomicUsize,
        broken_index: Option<usize>,
    }

    impl AccountLauncher for StatsLauncher {
        fn launch(&self, profile: &AccountProfile, cancel: CancelSignal) -> anyhow::Result<QuestOrchestrator> {
            if self.broken_index == Some(profile.index) {
                anyhow::bail!("invalid proxy");
            }
            self.launched.fetch_add(1, Ordering::SeqCst);

            let signer: Arc<dyn Signer> = Arc::new(KeySigner::new(profile.key.clone()));
            let client = ChainClient::new(Arc::new(MockRpc::new()), Arc::new(test_network()), profile.address());
            let executor = TransactionExecutor::new(Arc::new(client), signer, cancel.clone());
            Ok(QuestOrchestrator::new(
                executor,
                self.campaign.clone(),
                Arc::new(TaskRegistry::new(Vec::new())),
                OrchestratorSettings {
                    mode: RunMode::Stats,
                    ..OrchestratorSettings::default()
                },
                cancel,
            ))
        }
    }

    fn profiles(count: usize) -> Vec<AccountProfile> {
        (0..count)
            .map(|index| AccountProfile {
                index,
                key: AccountKey::from_hex(&format!("{:064x}", index + 1)).unwrap(),
                proxy: None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_concurrency_and_keeps_order() {
        let launcher = Arc::new(StatsLauncher::default());
        let pool = AccountPool::new(2, Duration::ZERO, CancelSignal::never());
        let input = profiles(5);
        let expected: Vec<Address> = input.iter().map(|p| p.address()).collect();

        let outcomes = pool.run(input, launcher.clone()).await;

        assert_eq!(outcomes.iter().map(|o| o.address).collect::<Vec<_>>(), expected);
        assert!(outcomes.iter().all(|o| o.state == QuestState::Done));
        assert_eq!(launcher.campaign.peak.load(Ordering::SeqCst), 2);
        assert_eq!(collect_reports(&outcomes).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_is_isolated() {
        let launcher = Arc::new(StatsLauncher {
            broken_index: Some(1),
            ..StatsLauncher::default()
        });
        let pool = AccountPool::new(3, Duration::ZERO, CancelSignal::never());

        let outcomes = pool.run(profiles(3), launcher.clone()).await;

        assert_eq!(outcomes[0].state, QuestState::Done);
        assert!(matches!(
            &outcomes[1].state,
            QuestState::Failed(FailureReason::Setup(msg)) if msg.contains("invalid proxy")
        ));
        assert_eq!(outcomes[2].state, QuestState::Done);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_jitter_skips_launch() {
        let launcher = Arc::new(StatsLauncher::default());
        let (handle, cancel) = cancel_pair();
        let pool = AccountPool::new(4, Duration::from_secs(3600), cancel);

        let run = tokio::spawn({
            let launcher = launcher.clone();
            async move { pool.run(profiles(4), launcher).await }
        });
        tokio::task::yield_now().await;
        handle.cancel();

        let outcomes = run.await.unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes
            .iter()
            .all(|o| o.state == QuestState::Failed(FailureReason::Cancelled)));
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(random_jitter(Duration::from_secs(5)) <= Duration::from_secs(5));
        }
    }
}
