//! Branching conversation history
//!
//! Messages live in a tree of nodes owned by a `ConversationManager`.
//! A conversation handed to a model is a projection: the path from the
//! root to one chosen node. Edits and regenerations never mutate a node;
//! they add a sibling branch and move the leaf pointer.

mod error;
mod manager;
mod navigation;
mod node;
mod validate;

#[cfg(test)]
mod proptests;

pub use error::ConversationError;
pub use manager::{ConversationManager, Head, Snapshot};
pub use navigation::{BranchNavigator, Direction};
pub use node::{Node, NodeRecord};
pub use validate::pending_calls;
pub(crate) use validate::check_append;

use crate::message::Message;
use std::sync::Arc;

/// Linear projection of the tree, root first
pub type Thread = Vec<Arc<Message>>;
