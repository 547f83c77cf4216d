use super::{ConversationRepository, StoreError, StoreResult};
use crate::conversation::{ConversationError, Head, Node, NodeRecord, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    root_id TEXT,
    current_leaf_id TEXT,
    touched TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at DESC);

CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    parent_id TEXT,
    sequence INTEGER NOT NULL,
    message TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_nodes_conversation ON nodes(conversation_id, sequence);
";

/// Thread-safe `SQLite` repository
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch_conversation(conn: &Connection, conversation_id: &str) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO conversations (id, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            params![conversation_id, now],
        )?;
        Ok(())
    }
}

fn to_sql_sequence(sequence: u64) -> i64 {
    i64::try_from(sequence).unwrap_or(i64::MAX)
}

#[async_trait]
impl ConversationRepository for SqliteRepository {
    async fn save_node(&self, conversation_id: &str, node: &Node) -> StoreResult<()> {
        let message = serde_json::to_string(node.message().as_ref())?;
        let conn = self.conn();
        Self::touch_conversation(&conn, conversation_id)?;
        conn.execute(
            "INSERT OR REPLACE INTO nodes (id, conversation_id, parent_id, sequence, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.id(),
                conversation_id,
                node.parent_id(),
                to_sql_sequence(node.sequence()),
                message
            ],
        )?;
        Ok(())
    }

    async fn save_head(&self, conversation_id: &str, head: &Head) -> StoreResult<()> {
        let touched = serde_json::to_string(&head.touched)?;
        let conn = self.conn();
        Self::touch_conversation(&conn, conversation_id)?;
        conn.execute(
            "UPDATE conversations SET root_id = ?2, current_leaf_id = ?3, touched = ?4 WHERE id = ?1",
            params![conversation_id, head.root_id, head.current_leaf_id, touched],
        )?;
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> StoreResult<Option<Snapshot>> {
        let conn = self.conn();
        let head = conn
            .query_row(
                "SELECT root_id, current_leaf_id, touched FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((root_id, current_leaf_id, touched)) = head else {
            return Ok(None);
        };
        let touched: BTreeMap<String, String> = serde_json::from_str(&touched)?;

        let mut stmt = conn.prepare(
            "SELECT id, parent_id, sequence, message FROM nodes
             WHERE conversation_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt
            .query_map(params![conversation_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let nodes = rows
            .into_iter()
            .map(|(id, parent_id, sequence, message)| {
                let sequence = u64::try_from(sequence).map_err(|_| {
                    StoreError::Corrupt(ConversationError::violation(format!(
                        "node {id} has negative sequence {sequence}"
                    )))
                })?;
                Ok(NodeRecord {
                    id,
                    parent_id,
                    sequence,
                    message: serde_json::from_str(&message)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(Snapshot {
            conversation_id: conversation_id.to_string(),
            nodes,
            root_id,
            current_leaf_id,
            touched,
        }))
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM conversations ORDER BY updated_at DESC, id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM nodes WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        let deleted = conn.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![conversation_id],
        )?;
        if deleted == 0 {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        Ok(())
    }
}
