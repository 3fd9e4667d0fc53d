//! questbot - quest automation for EVM campaign programs
//!
//! The library drives many accounts through an on-chain campaign: it
//! enrolls each account, discovers its tasks, executes the on-chain ones
//! and claims the rewards through the campaign API.
//!
//! Layers, bottom up:
//!
//! - [`rpc_manager`]: JSON-RPC transport, retries, nonce leases
//! - [`tx_builder`]: fee resolution, gas estimation, signing
//! - [`execution`]: broadcast, confirmation, error classification
//! - [`quest`]: per-account state machine and task handlers
//! - [`scheduler`]: bounded pool of concurrent accounts

pub mod approval;
pub mod campaign;
pub mod config;
pub mod confirmation;
pub mod endpoints;
pub mod execution;
pub mod metrics;
pub mod quest;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod structured_logging;
pub mod tx_builder;
pub mod types;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use config::Config;
pub use execution::{ErrorKind, ExecutionError, TransactionExecutor};
pub use quest::{AccountOutcome, QuestOrchestrator, QuestState, RunMode};
pub use scheduler::{AccountLauncher, AccountPool, LiveLauncher};
pub use types::{Network, TokenAmount};
