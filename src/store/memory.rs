use super::{ConversationRepository, StoreError, StoreResult};
use crate::conversation::{Head, Node, NodeRecord, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct Stored {
    nodes: BTreeMap<String, NodeRecord>,
    head: Head,
    updated_at: DateTime<Utc>,
}

/// Repository that lives and dies with the process
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    conversations: Mutex<HashMap<String, Stored>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Stored>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn entry<'a>(
        map: &'a mut HashMap<String, Stored>,
        conversation_id: &str,
    ) -> &'a mut Stored {
        let stored = map.entry(conversation_id.to_string()).or_insert_with(|| Stored {
            nodes: BTreeMap::new(),
            head: Head::default(),
            updated_at: Utc::now(),
        });
        stored.updated_at = Utc::now();
        stored
    }
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    async fn save_node(&self, conversation_id: &str, node: &Node) -> StoreResult<()> {
        let mut map = self.lock();
        Self::entry(&mut map, conversation_id)
            .nodes
            .insert(node.id().to_string(), node.to_record());
        Ok(())
    }

    async fn save_head(&self, conversation_id: &str, head: &Head) -> StoreResult<()> {
        let mut map = self.lock();
        Self::entry(&mut map, conversation_id).head = head.clone();
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> StoreResult<Option<Snapshot>> {
        Ok(self.lock().get(conversation_id).map(|stored| {
            let mut nodes: Vec<NodeRecord> = stored.nodes.values().cloned().collect();
            nodes.sort_by_key(|record| record.sequence);
            Snapshot {
                conversation_id: conversation_id.to_string(),
                nodes,
                root_id: stored.head.root_id.clone(),
                current_leaf_id: stored.head.current_leaf_id.clone(),
                touched: stored.head.touched.clone(),
            }
        }))
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let map = self.lock();
        let mut entries: Vec<(&String, &Stored)> = map.iter().collect();
        entries.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at).then_with(|| a.0.cmp(b.0)));
        Ok(entries.into_iter().map(|(id, _)| id.clone()).collect())
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<()> {
        self.lock()
            .remove(conversation_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))
    }
}
