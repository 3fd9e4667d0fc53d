//! Per-account quest state machine

use std::fmt;

/// Why an account stopped before finishing its run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Native balance cannot pay for any gas
    InsufficientGas,
    /// On-chain registration failed or could not be confirmed
    Enrollment(String),
    /// The campaign API returned something unusable
    Campaign(String),
    /// RPC failure outside of a task
    Chain(String),
    /// Clients for the account could not be built, or its task panicked
    Setup(String),
    /// Operator interrupt
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientGas => write!(f, "insufficient native balance for gas"),
            Self::Enrollment(msg) => write!(f, "enrollment failed: {msg}"),
            Self::Campaign(msg) => write!(f, "campaign API error: {msg}"),
            Self::Chain(msg) => write!(f, "chain error: {msg}"),
            Self::Setup(msg) => write!(f, "setup failed: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Position of one account in the quest pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestState {
    Unenrolled,
    Enrolled,
    TasksDiscovered,
    Claiming,
    Executing,
    Done,
    Failed(FailureReason),
}

impl QuestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Allowed edges of the pipeline.
    ///
    /// Discovery can be re-entered from `Claiming` and `Executing` because
    /// claim readiness is polled again after tasks run. `Unenrolled -> Done`
    /// is the statistics-only run.
    pub fn can_transition_to(&self, next: &QuestState) -> bool {
        use QuestState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed(_)) {
            return true;
        }
        matches!(
            (self, next),
            (Unenrolled, Enrolled)
                | (Unenrolled, Done)
                | (Enrolled, TasksDiscovered)
                | (TasksDiscovered, Claiming)
                | (TasksDiscovered, Executing)
                | (TasksDiscovered, Done)
                | (Claiming, TasksDiscovered)
                | (Claiming, Executing)
                | (Claiming, Done)
                | (Executing, TasksDiscovered)
                | (Executing, Claiming)
                | (Executing, Done)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unenrolled => "unenrolled",
            Self::Enrolled => "enrolled",
            Self::TasksDiscovered => "tasks_discovered",
            Self::Claiming => "claiming",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for QuestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_allowed() {
        let path = [
            QuestState::Unenrolled,
            QuestState::Enrolled,
            QuestState::TasksDiscovered,
            QuestState::Claiming,
            QuestState::Executing,
            QuestState::TasksDiscovered,
            QuestState::Claiming,
            QuestState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let failed = QuestState::Failed(FailureReason::InsufficientGas);
        assert!(failed.is_terminal());
        assert!(!failed.can_transition_to(&QuestState::Enrolled));
        assert!(!QuestState::Done.can_transition_to(&QuestState::Failed(FailureReason::Cancelled)));
    }

    #[test]
    fn test_skipping_enrollment_rejected() {
        assert!(!QuestState::Unenrolled.can_transition_to(&QuestState::TasksDiscovered));
        assert!(!QuestState::Enrolled.can_transition_to(&QuestState::Executing));
    }

    #[test]
    fn test_any_live_state_can_fail() {
        let reason = QuestState::Failed(FailureReason::Campaign("bad json".into()));
        for state in [QuestState::Unenrolled, QuestState::Executing, QuestState::Claiming] {
            assert!(state.can_transition_to(&reason));
        }
        assert_eq!(reason.to_string(), "failed (campaign API error: bad json)");
    }
}
