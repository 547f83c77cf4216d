//! State derivation
//!
//! The engine keeps no state of its own between steps: what to do next is
//! a pure function of the last message on the active projection.

use crate::conversation::pending_calls;
use crate::message::{Message, MessageKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// Ask the client for the next assistant turn
    Generate,
    /// Run the open tool calls
    Execute,
    /// Final answer reached
    Terminate,
    /// Nothing to respond to yet (empty or system-only history)
    Incomplete,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminate)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Generate => "GENERATE",
            Self::Execute => "EXECUTE",
            Self::Terminate => "TERMINATE",
            Self::Incomplete => "INCOMPLETE",
        };
        f.write_str(s)
    }
}

/// | last message              | state      |
/// |---------------------------|------------|
/// | none / System             | INCOMPLETE |
/// | User                      | GENERATE   |
/// | Assistant with open calls | EXECUTE    |
/// | Assistant, text only      | TERMINATE  |
/// | Tool, all calls answered  | GENERATE   |
/// | Tool, calls still open    | EXECUTE    |
pub fn derive_state(thread: &[Arc<Message>]) -> EngineState {
    let Some(last) = thread.last() else {
        return EngineState::Incomplete;
    };
    match &last.kind {
        MessageKind::System => EngineState::Incomplete,
        MessageKind::User => EngineState::Generate,
        MessageKind::Assistant { tool_calls } if tool_calls.is_empty() => EngineState::Terminate,
        MessageKind::Assistant { .. } => EngineState::Execute,
        MessageKind::Tool { .. } if pending_calls(thread).is_empty() => EngineState::Generate,
        MessageKind::Tool { .. } => EngineState::Execute,
    }
}
