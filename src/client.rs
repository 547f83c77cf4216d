//! Model client abstraction
//!
//! A client turns a conversation projection into the next assistant
//! message. Providers implement `Client`; logging, retry and caching are
//! layered on as decorators so the engine never sees them.

mod cached;
mod error;
mod logging;
mod retry;

pub use cached::CachedClient;
pub use error::{ClientError, ClientErrorKind};
pub use logging::LoggingClient;
pub use retry::{RetryPolicy, RetryingClient};

use crate::capability::CapabilityDefinition;
use crate::conversation::Thread;
use crate::message::{Message, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sampling parameters forwarded to the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Provider-specific passthrough
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// One generation request
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub messages: Thread,
    pub params: GenerationParams,
    pub tools: Vec<CapabilityDefinition>,
}

impl ClientRequest {
    pub fn new(messages: Thread, params: GenerationParams) -> Self {
        Self {
            messages,
            params,
            tools: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<CapabilityDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Generated message plus accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub message: Message,
    pub usage: Usage,
    #[serde(default)]
    pub cache_hit: bool,
}

impl ClientResponse {
    pub fn new(message: Message, usage: Usage) -> Self {
        Self {
            message,
            usage,
            cache_hit: false,
        }
    }
}

/// Common interface for model providers
#[async_trait]
pub trait Client: Send + Sync {
    async fn send(&self, request: &ClientRequest) -> Result<ClientResponse, ClientError>;

    fn model_id(&self) -> &str;
}

#[async_trait]
impl<C: Client + ?Sized> Client for Arc<C> {
    async fn send(&self, request: &ClientRequest) -> Result<ClientResponse, ClientError> {
        (**self).send(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}
