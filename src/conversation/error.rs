//! Structural errors for the conversation tree

use thiserror::Error;

/// Structural violations. All of these indicate a bug in the caller or
/// corrupted state; none are repaired automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Dangling reference: node {node_id} points at missing parent {parent_id}")]
    DanglingReference { node_id: String, parent_id: String },
    #[error("Conversation already has a root node")]
    DuplicateRoot,
    #[error("Conversation is empty")]
    EmptyConversation,
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl ConversationError {
    pub(crate) fn violation(message: impl Into<String>) -> Self {
        ConversationError::InvariantViolation(message.into())
    }
}
