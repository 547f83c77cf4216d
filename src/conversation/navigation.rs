//! Read-only branch navigation
//!
//! Navigation never moves the leaf pointer. A caller that wants to make a
//! previewed branch active commits it with `ConversationManager::checkout`.

use super::{ConversationError, ConversationManager, Thread};

/// Direction for sibling navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

impl Direction {
    fn delta(self) -> isize {
        match self {
            Direction::Prev => -1,
            Direction::Next => 1,
        }
    }
}

impl ConversationManager {
    /// Sibling of `node_id` in the given direction.
    ///
    /// Returns `None` at either end of the sibling list (no wrap-around)
    /// and for the root, which has no siblings.
    pub fn navigate(
        &self,
        node_id: &str,
        direction: Direction,
    ) -> Result<Option<String>, ConversationError> {
        self.sibling_at_offset(node_id, direction.delta())
    }

    /// Zero-based index of `node_id` among its siblings, and the sibling count
    pub fn position(&self, node_id: &str) -> Result<(usize, usize), ConversationError> {
        let siblings = self.siblings(node_id)?;
        let index = siblings
            .iter()
            .position(|id| id == node_id)
            .ok_or_else(|| {
                ConversationError::violation(format!("{node_id} missing from its parent's children"))
            })?;
        Ok((index, siblings.len()))
    }

    fn siblings(&self, node_id: &str) -> Result<Vec<String>, ConversationError> {
        let node = self
            .node(node_id)
            .ok_or_else(|| ConversationError::NodeNotFound(node_id.to_string()))?;
        match node.parent_id() {
            None => Ok(vec![node_id.to_string()]),
            Some(parent_id) => {
                let parent = self.node(parent_id).ok_or_else(|| {
                    ConversationError::DanglingReference {
                        node_id: node_id.to_string(),
                        parent_id: parent_id.to_string(),
                    }
                })?;
                Ok(parent.children_ids().to_vec())
            }
        }
    }

    fn sibling_at_offset(
        &self,
        node_id: &str,
        delta: isize,
    ) -> Result<Option<String>, ConversationError> {
        let (index, count) = self.position(node_id)?;
        let siblings = self.siblings(node_id)?;
        Ok(index
            .checked_add_signed(delta)
            .filter(|target| *target < count)
            .and_then(|target| siblings.get(target).cloned()))
    }
}

/// Read-only view for UI collaborators that browse branches
#[derive(Debug, Clone, Copy)]
pub struct BranchNavigator<'a> {
    manager: &'a ConversationManager,
}

impl<'a> BranchNavigator<'a> {
    pub fn new(manager: &'a ConversationManager) -> Self {
        Self { manager }
    }

    /// All siblings of `node_id` (itself included) in creation order
    pub fn list_siblings(&self, node_id: &str) -> Result<Vec<String>, ConversationError> {
        self.manager.siblings(node_id)
    }

    /// Sibling `delta` positions away; `None` when that runs off either end
    pub fn advance(&self, node_id: &str, delta: isize) -> Result<Option<String>, ConversationError> {
        self.manager.sibling_at_offset(node_id, delta)
    }

    /// Projection ending at `leaf_id`
    pub fn thread_for(&self, leaf_id: &str) -> Result<Thread, ConversationError> {
        self.manager.get_thread(leaf_id)
    }

    /// Projection of the branch a user would land on after selecting
    /// `node_id`, without committing to it
    pub fn preview(&self, node_id: &str) -> Result<Thread, ConversationError> {
        let leaf = self.manager.default_leaf(node_id)?;
        self.manager.get_thread(&leaf)
    }
}
