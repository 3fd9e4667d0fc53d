//! Quest orchestration: per-account state machine and task handlers

pub mod orchestrator;
pub mod state;
pub mod tasks;

pub use orchestrator::{AccountOutcome, OrchestratorSettings, QuestError, QuestOrchestrator, RunMode};
pub use state::{FailureReason, QuestState};
pub use tasks::{
    ApproveAndCall, ContractCall, NativeTransfer, QuestAction, TaskBinding, TaskContext, TaskKind, TaskOutcome,
    TaskRecord, TaskRegistry,
};
