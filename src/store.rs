//! Persistence for conversation trees
//!
//! The engine only needs to save nodes as they are committed, save the
//! head pointers, and load a snapshot back. Schema choice is up to the
//! implementation.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use crate::conversation::{ConversationError, ConversationManager, Head, Node, Snapshot};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Stored conversation is corrupt: {0}")]
    Corrupt(ConversationError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert or replace one node. Creates the conversation if needed.
    async fn save_node(&self, conversation_id: &str, node: &Node) -> StoreResult<()>;

    async fn save_head(&self, conversation_id: &str, head: &Head) -> StoreResult<()>;

    /// `None` when nothing was ever saved under this id
    async fn load(&self, conversation_id: &str) -> StoreResult<Option<Snapshot>>;

    /// Known conversation ids, most recently updated first
    async fn list(&self) -> StoreResult<Vec<String>>;

    async fn delete(&self, conversation_id: &str) -> StoreResult<()>;

    /// Save every node and the head of `manager`
    async fn save_manager(&self, manager: &ConversationManager) -> StoreResult<()> {
        let conversation_id = manager.conversation_id();
        for node in manager.nodes() {
            self.save_node(conversation_id, node).await?;
        }
        self.save_head(conversation_id, &manager.head()).await
    }

    /// Load and re-validate a manager
    async fn restore(&self, conversation_id: &str) -> StoreResult<ConversationManager> {
        let snapshot = self
            .load(conversation_id)
            .await?
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        ConversationManager::restore(snapshot).map_err(StoreError::Corrupt)
    }
}
