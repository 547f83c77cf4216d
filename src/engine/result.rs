//! Transition packets and run results

use super::EngineState;
use crate::client::ClientError;
use crate::conversation::Thread;
use crate::message::Usage;
use std::fmt;
use std::time::Duration;

/// How a single step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// New nodes were appended
    Committed,
    /// Already TERMINATE; nothing to do
    Idle,
    /// The client call failed or timed out; nothing was appended
    ClientFailed(ClientError),
    /// Cancelled mid-step; nothing was appended
    Cancelled,
}

/// Record of one engine step
#[derive(Debug, Clone)]
pub struct Transition {
    /// State the step acted on
    pub from: EngineState,
    /// State derived after the step
    pub to: EngineState,
    pub outcome: StepOutcome,
    /// Node ids committed by this step, in append order
    pub appended: Vec<String>,
    pub usage: Usage,
    pub cache_hit: bool,
    /// Tool calls dispatched
    pub tool_calls: usize,
    pub duration: Duration,
}

impl Transition {
    pub(super) fn unchanged(state: EngineState, outcome: StepOutcome, duration: Duration) -> Self {
        Self {
            from: state,
            to: state,
            outcome,
            appended: Vec::new(),
            usage: Usage::default(),
            cache_hit: false,
            tool_calls: 0,
            duration,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.outcome == StepOutcome::Committed
    }

    /// Whether the step issued a client request
    pub fn called_client(&self) -> bool {
        self.from == EngineState::Generate
            && matches!(
                self.outcome,
                StepOutcome::Committed | StepOutcome::ClientFailed(_)
            )
    }
}

/// Why `run` stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Terminated,
    /// Ran out of steps before reaching TERMINATE; the result is partial
    StepLimitReached,
    ClientFailed(ClientError),
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => f.write_str("terminated"),
            Self::StepLimitReached => f.write_str("step_limit_reached"),
            Self::ClientFailed(e) => write!(f, "client_failed({})", e.kind),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Accumulated accounting for one `run`
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub outcome: RunOutcome,
    pub final_state: EngineState,
    pub steps: usize,
    pub generate_calls: usize,
    pub tool_calls: usize,
    pub cache_hits: usize,
    pub usage: Usage,
    pub duration: Duration,
    pub step_limit_reached: bool,
    pub transitions: Vec<Transition>,
}

impl RunMetadata {
    pub(super) fn new(
        outcome: RunOutcome,
        final_state: EngineState,
        transitions: Vec<Transition>,
        duration: Duration,
    ) -> Self {
        Self {
            step_limit_reached: outcome == RunOutcome::StepLimitReached,
            outcome,
            final_state,
            steps: transitions.len(),
            generate_calls: transitions.iter().filter(|t| t.called_client()).count(),
            tool_calls: transitions.iter().map(|t| t.tool_calls).sum(),
            cache_hits: transitions.iter().filter(|t| t.cache_hit).count(),
            usage: transitions.iter().fold(Usage::default(), |acc, t| acc + t.usage),
            duration,
            transitions,
        }
    }

    /// Any generate step was served from cache
    pub fn cache_hit(&self) -> bool {
        self.cache_hits > 0
    }
}

/// What `run` hands back: the projection it ended on plus metadata.
/// Read-only once returned.
#[derive(Debug, Clone)]
pub struct EngineResult {
    pub thread: Thread,
    pub leaf_id: Option<String>,
    pub metadata: RunMetadata,
}

impl EngineResult {
    pub fn is_terminated(&self) -> bool {
        self.metadata.outcome == RunOutcome::Terminated
    }

    /// Text of the last message, if any
    pub fn final_text(&self) -> Option<String> {
        self.thread.last().map(|m| m.text())
    }
}
