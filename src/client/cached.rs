use super::{Client, ClientError, ClientRequest, ClientResponse};
use crate::cache::{CacheKey, ResponseCache};
use async_trait::async_trait;
use std::sync::Arc;

/// Memoizes responses by request content.
///
/// A hit is returned as a reissued copy (fresh message id) flagged
/// `cache_hit`, so the same cached turn can sit on several branches.
/// Errors are never cached.
pub struct CachedClient<C> {
    inner: C,
    cache: Arc<dyn ResponseCache>,
}

impl<C: Client> CachedClient<C> {
    pub fn new(inner: C, cache: Arc<dyn ResponseCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }
}

#[async_trait]
impl<C: Client> Client for CachedClient<C> {
    async fn send(&self, request: &ClientRequest) -> Result<ClientResponse, ClientError> {
        let key = CacheKey::for_request(
            self.inner.model_id(),
            &request.params,
            &request.tools,
            &request.messages,
        );

        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(key = %key, "Response cache hit");
            let mut message = cached.message.reissued();
            message.metadata.cache_hit = true;
            return Ok(ClientResponse {
                message,
                usage: cached.usage,
                cache_hit: true,
            });
        }

        let response = self.inner.send(request).await?;
        self.cache.set(key, response.clone()).await;
        Ok(response)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
