//! Conversation tree ownership and mutation

use super::node::{Node, NodeRecord};
use super::validate::{check_append, pending_calls};
use super::{ConversationError, Thread};
use crate::message::{ContentBlock, Message, Role, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Serializable state of a manager: every node plus the pointers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub conversation_id: String,
    pub nodes: Vec<NodeRecord>,
    pub root_id: Option<String>,
    pub current_leaf_id: Option<String>,
    /// Most recently touched child per parent
    #[serde(default)]
    pub touched: BTreeMap<String, String>,
}

/// Pointers of a manager, persisted separately from its nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub root_id: Option<String>,
    pub current_leaf_id: Option<String>,
    #[serde(default)]
    pub touched: BTreeMap<String, String>,
}

/// Owns the message tree of one conversation.
///
/// Single writer: only `add_message`, `branch_at`, `edit`, `rewind` and
/// `checkout` change anything, and of those only the first three create
/// nodes. Nodes are never removed.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    conversation_id: String,
    nodes: HashMap<String, Node>,
    /// Node ids in creation order
    order: Vec<String>,
    root_id: Option<String>,
    current_leaf_id: Option<String>,
    /// parent id -> child last advanced into; drives the default branch
    touched: HashMap<String, String>,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationManager {
    /// Create an empty conversation with a generated id
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
            root_id: None,
            current_leaf_id: None,
            touched: HashMap::new(),
        }
    }

    /// Create a conversation whose root is the given system message
    pub fn seeded(system: Message) -> Result<Self, ConversationError> {
        if system.role() != Role::System {
            return Err(ConversationError::violation(format!(
                "seed must be a system message, got {}",
                system.role()
            )));
        }
        let mut manager = Self::new();
        manager.add_message(system)?;
        Ok(manager)
    }

    // ==================== Accessors ====================

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn current_leaf_id(&self) -> Option<&str> {
        self.current_leaf_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    fn require(&self, node_id: &str) -> Result<&Node, ConversationError> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| ConversationError::NodeNotFound(node_id.to_string()))
    }

    /// All nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    // ==================== Mutation ====================

    /// Append a message under the current leaf and move the leaf to it.
    ///
    /// On an empty conversation this creates the root.
    pub fn add_message(&mut self, message: Message) -> Result<String, ConversationError> {
        let parent = self.current_leaf_id.clone();
        self.append(parent, message)
    }

    /// Create a new child under `node_id`, alongside any existing children,
    /// and move the leaf to it. Used for both edits and regenerations.
    pub fn branch_at(&mut self, node_id: &str, message: Message) -> Result<String, ConversationError> {
        self.require(node_id)?;
        self.append(Some(node_id.to_string()), message)
    }

    /// Replace the content of `node_id` on a new sibling branch.
    ///
    /// The original node and everything below it stay untouched.
    pub fn edit(
        &mut self,
        node_id: &str,
        content: Vec<ContentBlock>,
    ) -> Result<String, ConversationError> {
        let node = self.require(node_id)?;
        let Some(parent_id) = node.parent_id.clone() else {
            return Err(ConversationError::violation("the root message cannot be edited"));
        };
        let edited = node.message.edited(content);
        self.append(Some(parent_id), edited)
    }

    /// Point the leaf at `node_id` exactly, e.g. to regenerate the turn
    /// after it. Descendants remain reachable through `checkout`.
    pub fn rewind(&mut self, node_id: &str) -> Result<(), ConversationError> {
        self.require(node_id)?;
        self.mark_path(node_id)?;
        self.current_leaf_id = Some(node_id.to_string());
        Ok(())
    }

    /// Commit navigation: move the leaf to the default leaf below `node_id`
    /// and remember the path as the most recently touched one.
    pub fn checkout(&mut self, node_id: &str) -> Result<String, ConversationError> {
        let leaf = self.default_leaf(node_id)?;
        self.mark_path(&leaf)?;
        self.current_leaf_id = Some(leaf.clone());
        Ok(leaf)
    }

    fn append(
        &mut self,
        parent_id: Option<String>,
        message: Message,
    ) -> Result<String, ConversationError> {
        let thread = match &parent_id {
            Some(parent) => self.get_thread(parent)?,
            None if self.root_id.is_some() => return Err(ConversationError::DuplicateRoot),
            None => Vec::new(),
        };
        check_append(&thread, &message)?;

        let node_id = uuid::Uuid::new_v4().to_string();
        let sequence = self.order.len() as u64;
        let node = Node::new(node_id.clone(), parent_id.clone(), Arc::new(message), sequence);

        match parent_id {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children_ids.push(node_id.clone());
                }
                self.touched.insert(parent, node_id.clone());
            }
            None => self.root_id = Some(node_id.clone()),
        }

        tracing::debug!(
            conv_id = %self.conversation_id,
            node_id = %node_id,
            role = %node.message.role(),
            "Appended message"
        );

        self.nodes.insert(node_id.clone(), node);
        self.order.push(node_id.clone());
        self.current_leaf_id = Some(node_id.clone());
        Ok(node_id)
    }

    fn mark_path(&mut self, node_id: &str) -> Result<(), ConversationError> {
        let path = self.path(node_id)?;
        for pair in path.windows(2) {
            self.touched.insert(pair[0].clone(), pair[1].clone());
        }
        Ok(())
    }

    // ==================== Projection ====================

    /// Node ids from the root down to `leaf_id`
    pub fn path(&self, leaf_id: &str) -> Result<Vec<String>, ConversationError> {
        let mut ids = Vec::new();
        let mut current = self.require(leaf_id)?;
        loop {
            ids.push(current.id.clone());
            if ids.len() > self.nodes.len() {
                return Err(ConversationError::violation(format!(
                    "parent links from {leaf_id} form a cycle"
                )));
            }
            let Some(parent_id) = &current.parent_id else {
                break;
            };
            current = self
                .nodes
                .get(parent_id)
                .ok_or_else(|| ConversationError::DanglingReference {
                    node_id: current.id.clone(),
                    parent_id: parent_id.clone(),
                })?;
        }
        ids.reverse();
        Ok(ids)
    }

    /// Messages from the root down to `leaf_id`, in chronological order
    pub fn get_thread(&self, leaf_id: &str) -> Result<Thread, ConversationError> {
        Ok(self
            .path(leaf_id)?
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| Arc::clone(&node.message))
            .collect())
    }

    /// Projection of the active path. Empty when nothing was added yet.
    pub fn current_thread(&self) -> Result<Thread, ConversationError> {
        match &self.current_leaf_id {
            Some(leaf) => self.get_thread(leaf),
            None => Ok(Vec::new()),
        }
    }

    /// Leaf reached from `node_id` by always following the child that was
    /// most recently advanced into, or the newest child if none was.
    pub fn default_leaf(&self, node_id: &str) -> Result<String, ConversationError> {
        let mut current = self.require(node_id)?;
        let mut steps = 0;
        while let Some(last_child) = current.children_ids.last() {
            let next_id = self
                .touched
                .get(&current.id)
                .filter(|id| current.children_ids.contains(id))
                .unwrap_or(last_child);
            current = self.require(next_id)?;
            steps += 1;
            if steps > self.nodes.len() {
                return Err(ConversationError::violation("child links form a cycle"));
            }
        }
        Ok(current.id.clone())
    }

    /// All leaf node ids in creation order
    pub fn leaves(&self) -> Vec<String> {
        self.nodes()
            .filter(|node| node.is_leaf())
            .map(|node| node.id.clone())
            .collect()
    }

    /// One projection per leaf
    pub fn threads(&self) -> Result<Vec<Thread>, ConversationError> {
        self.leaves().iter().map(|leaf| self.get_thread(leaf)).collect()
    }

    /// Tool calls on the active path still waiting for a tool message
    pub fn pending_tool_calls(&self) -> Result<Vec<ToolCall>, ConversationError> {
        let thread = self.current_thread()?;
        Ok(pending_calls(&thread).into_iter().cloned().collect())
    }

    // ==================== Snapshot / restore ====================

    pub fn head(&self) -> Head {
        Head {
            root_id: self.root_id.clone(),
            current_leaf_id: self.current_leaf_id.clone(),
            touched: self
                .touched
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let Head {
            root_id,
            current_leaf_id,
            touched,
        } = self.head();
        Snapshot {
            conversation_id: self.conversation_id.clone(),
            nodes: self.nodes().map(Node::to_record).collect(),
            root_id,
            current_leaf_id,
            touched,
        }
    }

    /// Rebuild a manager from a snapshot, re-checking every structural rule
    pub fn restore(snapshot: Snapshot) -> Result<Self, ConversationError> {
        let Snapshot {
            conversation_id,
            mut nodes,
            root_id,
            current_leaf_id,
            touched,
        } = snapshot;
        nodes.sort_by_key(|record| record.sequence);

        let mut manager = Self::with_id(conversation_id);
        for record in nodes {
            let NodeRecord {
                id,
                parent_id,
                sequence,
                message,
            } = record;

            let thread = match &parent_id {
                Some(parent) if !manager.nodes.contains_key(parent) => {
                    return Err(ConversationError::DanglingReference {
                        node_id: id,
                        parent_id: parent.clone(),
                    });
                }
                Some(parent) => manager.get_thread(parent)?,
                None if manager.root_id.is_some() => return Err(ConversationError::DuplicateRoot),
                None => Vec::new(),
            };
            check_append(&thread, &message)?;

            match &parent_id {
                Some(parent) => {
                    if let Some(parent_node) = manager.nodes.get_mut(parent) {
                        parent_node.children_ids.push(id.clone());
                    }
                }
                None => manager.root_id = Some(id.clone()),
            }
            manager.order.push(id.clone());
            manager
                .nodes
                .insert(id.clone(), Node::new(id, parent_id, Arc::new(message), sequence));
        }

        if manager.root_id != root_id {
            return Err(ConversationError::violation(format!(
                "snapshot root {root_id:?} does not match rebuilt root {:?}",
                manager.root_id
            )));
        }
        if let Some(leaf) = &current_leaf_id {
            manager.require(leaf)?;
        }
        manager.current_leaf_id = current_leaf_id;
        manager.touched = touched
            .into_iter()
            .filter(|(parent, child)| manager.contains(parent) && manager.contains(child))
            .collect();
        Ok(manager)
    }
}
