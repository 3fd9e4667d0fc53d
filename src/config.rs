//! Configuration module for questbot
//!
//! All settings come from one TOML file. Every section except `[network]`
//! has defaults, so a minimal file only names the network and the tasks.

use crate::campaign::ClaimAttestation;
use crate::quest::TaskBinding;
use crate::retry::RetryPolicy;
use crate::tx_builder::GasMultiplier;
use crate::types::Network;
use alloy::primitives::{address, Address};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target EVM network
    pub network: Network,

    /// JSON-RPC access
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Transaction building and confirmation
    #[serde(default)]
    pub transactions: TransactionConfig,

    /// Campaign HTTP API
    #[serde(default)]
    pub campaign: CampaignConfig,

    /// Account pool
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Input and output files
    #[serde(default)]
    pub accounts: AccountsConfig,

    /// Task id to handler bindings
    #[serde(default)]
    pub tasks: Vec<TaskBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Rate limit per account (requests per second), 0 disables
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Applied to gas estimates and base fees
    #[serde(default)]
    pub gas_multiplier: GasMultiplier,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_interval_ms: u64,

    /// Pause between consecutive on-chain steps of one account
    #[serde(default = "default_rpc_delay")]
    pub delay_between_rpc_requests_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_campaign_base_url")]
    pub base_url: String,

    #[serde(default = "default_enroll_path")]
    pub enroll_path: String,

    #[serde(default = "default_task_status_path")]
    pub task_status_path: String,

    #[serde(default = "default_claim_path")]
    pub claim_path: String,

    #[serde(default = "default_stats_path")]
    pub stats_path: String,

    /// Sent as `Origin`, and with a trailing slash as `Referer`
    #[serde(default = "default_origin")]
    pub origin: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_http_timeout")]
    pub request_timeout_secs: u64,

    /// Delay range between attempts of a failing campaign request
    #[serde(default = "default_retry_min")]
    pub retry_min_secs: u64,

    #[serde(default = "default_retry_max")]
    pub retry_max_secs: u64,

    /// Pause between consecutive campaign requests of one account
    #[serde(default = "default_http_delay")]
    pub delay_between_requests_secs: u64,

    /// Random pause range between dispatched tasks
    #[serde(default = "default_task_delay_min")]
    pub task_delay_min_secs: u64,

    #[serde(default = "default_task_delay_max")]
    pub task_delay_max_secs: u64,

    #[serde(default = "default_true")]
    pub shuffle_tasks: bool,

    /// Extra discovery rounds after execution while waiting for rewards
    #[serde(default = "default_settle_polls")]
    pub settle_polls: u32,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// On-chain enrollment registry; `None` skips on-chain enrollment
    #[serde(default = "default_registry")]
    pub registry_contract: Option<Address>,

    #[serde(default)]
    pub attestation: ClaimAttestation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Accounts processed concurrently
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Each account waits a random delay in `[0, start_jitter]` before starting
    #[serde(default = "default_start_jitter")]
    pub start_jitter_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// One hex private key per line
    #[serde(default = "default_keys_file")]
    pub keys_file: PathBuf,

    /// One proxy per line, matched to keys by position
    #[serde(default = "default_proxies_file")]
    pub proxies_file: PathBuf,

    /// `;`-delimited statistics report
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,
}

// Default value functions
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_base_backoff_ms() -> u64 { 200 }
fn default_max_backoff_ms() -> u64 { 5_000 }
fn default_rate_limit() -> u32 { 5 }
fn default_confirmation_timeout() -> u64 { 200 }
fn default_receipt_poll_ms() -> u64 { 2_000 }
fn default_rpc_delay() -> u64 { 10 }
fn default_campaign_base_url() -> String { "https://xp.cl04.zetachain.com".to_string() }
fn default_enroll_path() -> String { "/v1/enroll-in-zeta-xp".to_string() }
fn default_task_status_path() -> String { "/v1/get-user-has-xp-to-refresh".to_string() }
fn default_claim_path() -> String { "/v1/xp/claim-task".to_string() }
fn default_stats_path() -> String { "/v1/get-points".to_string() }
fn default_origin() -> Option<String> { Some("https://hub.zetachain.com".to_string()) }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_http_timeout() -> u64 { 30 }
fn default_retry_min() -> u64 { 600 }
fn default_retry_max() -> u64 { 800 }
fn default_http_delay() -> u64 { 10 }
fn default_task_delay_min() -> u64 { 30 }
fn default_task_delay_max() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_settle_polls() -> u32 { 3 }
fn default_settle_delay() -> u64 { 30 }
fn default_registry() -> Option<Address> { Some(address!("3C85e0cA1001F085A3e58d55A0D76E2E8B0A33f9")) }
fn default_pool_size() -> usize { 5 }
fn default_start_jitter() -> u64 { 30 }
fn default_keys_file() -> PathBuf { PathBuf::from("keys.txt") }
fn default_proxies_file() -> PathBuf { PathBuf::from("proxies.txt") }
fn default_report_file() -> PathBuf { PathBuf::from("stats.csv") }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_rpc_timeout(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            rate_limit_rps: default_rate_limit(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            gas_multiplier: GasMultiplier::default(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            receipt_poll_interval_ms: default_receipt_poll_ms(),
            delay_between_rpc_requests_secs: default_rpc_delay(),
        }
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            base_url: default_campaign_base_url(),
            enroll_path: default_enroll_path(),
            task_status_path: default_task_status_path(),
            claim_path: default_claim_path(),
            stats_path: default_stats_path(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_http_timeout(),
            retry_min_secs: default_retry_min(),
            retry_max_secs: default_retry_max(),
            delay_between_requests_secs: default_http_delay(),
            task_delay_min_secs: default_task_delay_min(),
            task_delay_max_secs: default_task_delay_max(),
            shuffle_tasks: default_true(),
            settle_polls: default_settle_polls(),
            settle_delay_secs: default_settle_delay(),
            registry_contract: default_registry(),
            attestation: ClaimAttestation::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            start_jitter_secs: default_start_jitter(),
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            keys_file: default_keys_file(),
            proxies_file: default_proxies_file(),
            report_file: default_report_file(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration after applying `.env`
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    /// Reject settings that would make the run meaningless
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.rpc.trim().is_empty() {
            bail!("network.rpc must not be empty");
        }
        if self.network.chain_id == 0 {
            bail!("network.chain_id must not be 0");
        }
        if self.scheduler.pool_size == 0 {
            bail!("scheduler.pool_size must be at least 1");
        }
        if self.rpc.max_retries == 0 {
            bail!("rpc.max_retries must be at least 1");
        }
        if self.rpc.base_backoff_ms > self.rpc.max_backoff_ms {
            bail!("rpc.base_backoff_ms exceeds rpc.max_backoff_ms");
        }
        if self.campaign.retry_min_secs > self.campaign.retry_max_secs {
            bail!("campaign.retry_min_secs exceeds campaign.retry_max_secs");
        }
        if self.campaign.task_delay_min_secs > self.campaign.task_delay_max_secs {
            bail!("campaign.task_delay_min_secs exceeds campaign.task_delay_max_secs");
        }

        let mut seen = std::collections::HashSet::new();
        for binding in &self.tasks {
            if !seen.insert(binding.id.as_str()) {
                bail!("task {} is bound more than once", binding.id);
            }
        }
        Ok(())
    }

    pub fn rpc_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            self.rpc.max_retries,
            Duration::from_millis(self.rpc.base_backoff_ms),
            Duration::from_millis(self.rpc.max_backoff_ms),
        )
    }

    pub fn http_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::forever(
            Duration::from_secs(self.campaign.retry_min_secs),
            Duration::from_secs(self.campaign.retry_max_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::TaskKind;
    use crate::types::FeeModel;

    const MINIMAL: &str = r#"
        [network]
        name = "zetachain"
        rpc = "https://zetachain-evm.blockpi.network/v1/rpc/public"
        chain_id = 7000
        coin_symbol = "ZETA"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.network.fee_model, FeeModel::Eip1559);
        assert_eq!(config.network.decimals, 18);
        assert_eq!(config.scheduler.pool_size, 5);
        assert_eq!(config.campaign.retry_min_secs, 600);
        assert_eq!(config.transactions.gas_multiplier, GasMultiplier::ONE);
        assert!(config.tasks.is_empty());
        assert_eq!(
            config.http_retry_policy(),
            RetryPolicy::forever(Duration::from_secs(600), Duration::from_secs(800))
        );
    }

    #[test]
    fn test_full_config_parses_tasks() {
        let toml_str = format!(
            "{MINIMAL}\n{}",
            r#"
            [transactions]
            gas_multiplier = 1.2

            [scheduler]
            pool_size = 2

            [[tasks]]
            id = "SEND_ZETA"
            handler = "native_transfer"
            amount = "0.001"

            [[tasks]]
            id = "ONE_INVITE_ACCEPTED"
            handler = "manual"

            [[tasks]]
            id = "POOL_DEPOSIT_ANY_POOL"
            handler = "contract_call"
            to = "0x08F4539f91faA96b34323c11C9B00123bA19eef3"
            data = "0xa9059cbb{self}"
            "#
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(config.transactions.gas_multiplier.bps(), 12_000);
        assert_eq!(config.tasks.len(), 3);
        assert!(matches!(config.tasks[0].kind, TaskKind::NativeTransfer(_)));
        assert!(matches!(config.tasks[1].kind, TaskKind::Manual));
        assert!(matches!(config.tasks[2].kind, TaskKind::ContractCall(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.scheduler.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.network.chain_id = 0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.campaign.retry_min_secs = 900;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gas_multiplier_below_one_rejected_at_parse() {
        let toml_str = format!("{MINIMAL}\n[transactions]\ngas_multiplier = 0.8\n");
        assert!(toml::from_str::<Config>(&toml_str).is_err());
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = Config::from_file("/nonexistent/questbot.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/questbot.toml"));
    }
}
