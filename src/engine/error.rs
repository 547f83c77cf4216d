use super::EngineState;
use crate::conversation::ConversationError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that stop the engine. Client failures, cancellation and the
/// step ceiling are reported through the run outcome instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The projection has nothing to respond to; seed it with a user message
    #[error("Conversation not ready: state is {state}")]
    NotReady { state: EngineState },
    #[error("Structural violation: {0}")]
    Structural(#[from] ConversationError),
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}
