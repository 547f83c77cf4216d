//! Tree nodes

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Position of one message in the tree.
///
/// The node is the graph position; the message is the payload. Only the
/// manager appends to `children_ids`, and it never rewrites the message.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: String,
    pub(crate) parent_id: Option<String>,
    pub(crate) children_ids: Vec<String>,
    pub(crate) message: Arc<Message>,
    pub(crate) sequence: u64,
}

impl Node {
    pub(crate) fn new(
        id: String,
        parent_id: Option<String>,
        message: Arc<Message>,
        sequence: u64,
    ) -> Self {
        Self {
            id,
            parent_id,
            children_ids: Vec::new(),
            message,
            sequence,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Children in creation order
    pub fn children_ids(&self) -> &[String] {
        &self.children_ids
    }

    pub fn message(&self) -> &Arc<Message> {
        &self.message
    }

    /// Creation order within the conversation, starting at 0
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }

    pub fn to_record(&self) -> NodeRecord {
        NodeRecord {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            sequence: self.sequence,
            message: Message::clone(&self.message),
        }
    }
}

/// Persisted form of a node. Child lists are rebuilt from parent links
/// and sequence numbers on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub sequence: u64,
    pub message: Message,
}
