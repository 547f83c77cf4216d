//! Response cache
//!
//! Keys are content hashes of everything that determines a generation:
//! model, parameters, the advertised capabilities and the fingerprint of
//! each message in the projection. Cached values are whole client responses.

use crate::capability::CapabilityDefinition;
use crate::client::{ClientResponse, GenerationParams};
use crate::message::Message;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Hex SHA-256 key for one generation request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(
        model_id: &str,
        params: &GenerationParams,
        tools: &[CapabilityDefinition],
        messages: &[Arc<Message>],
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update([0]);
        // Struct serialization is infallible for GenerationParams
        hasher.update(serde_json::to_vec(params).unwrap_or_default());

        let mut tools: Vec<&CapabilityDefinition> = tools.iter().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        for tool in tools {
            hasher.update([1]);
            hasher.update(tool.name.as_bytes());
            hasher.update([0]);
            hasher.update(tool.input_schema.to_string().as_bytes());
        }
        for message in messages {
            hasher.update([0]);
            hasher.update(message.fingerprint().as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Storage for cached responses
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<ClientResponse>;

    async fn set(&self, key: CacheKey, response: ClientResponse);

    /// Drop every entry
    async fn wipe(&self);

    fn stats(&self) -> CacheStats;
}

/// Process-local cache backed by a hash map
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<CacheKey, ClientResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, ClientResponse>> {
        // A panic while holding the lock cannot leave the map half-written
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<ClientResponse> {
        let found = self.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    async fn set(&self, key: CacheKey, response: ClientResponse) {
        self.lock().insert(key, response);
    }

    async fn wipe(&self) {
        self.lock().clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.lock().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
