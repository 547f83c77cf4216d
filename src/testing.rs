//! Mock implementations for testing
//!
//! These mocks let engine and decorator tests run without a real provider.

use crate::capability::{Capability, CapabilityContext, CapabilityOutput};
use crate::client::{Client, ClientError, ClientRequest, ClientResponse};
use crate::message::{ContentBlock, Message, ToolCall, Usage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Client
// ============================================================================

/// Mock client that returns queued responses
pub struct MockClient {
    responses: Mutex<VecDeque<Result<ClientResponse, ClientError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<ClientRequest>>,
}

impl MockClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, response: ClientResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: ClientError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Queue a text-only assistant reply
    pub fn queue_text(&self, text: &str, usage: Usage) {
        self.queue_response(ClientResponse::new(Message::assistant(text), usage));
    }

    /// Queue an assistant reply that requests the given calls
    pub fn queue_tool_calls(&self, calls: Vec<ToolCall>, usage: Usage) {
        self.queue_response(ClientResponse::new(
            Message::assistant_with_tools(vec![], calls),
            usage,
        ));
    }

    pub fn recorded_requests(&self) -> Vec<ClientRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &ClientRequest) -> Result<ClientResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::unavailable("No mock response queued")))
    }
}

#[async_trait]
impl Client for MockClient {
    async fn send(&self, request: &ClientRequest) -> Result<ClientResponse, ClientError> {
        self.next(request)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Delayed Mock Client (for cancellation and timeout testing)
// ============================================================================

/// Mock client that sleeps before answering
pub struct DelayedMockClient {
    inner: MockClient,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockClient {
    pub fn new(model_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            inner: MockClient::new(model_id),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_text(&self, text: &str, usage: Usage) {
        self.inner.queue_text(text, usage);
    }

    pub fn recorded_requests(&self) -> Vec<ClientRequest> {
        self.inner.recorded_requests()
    }
}

#[async_trait]
impl Client for DelayedMockClient {
    async fn send(&self, request: &ClientRequest) -> Result<ClientResponse, ClientError> {
        // notify_one stores a permit, so a waiter that subscribes late still wakes
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.next(request)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// Capability fixtures
// ============================================================================

/// Returns `arguments.text`, or the raw arguments when absent
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> String {
        "Echo the input".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } }
        })
    }

    async fn invoke(&self, arguments: Value, _ctx: CapabilityContext) -> CapabilityOutput {
        match arguments.get("text").and_then(Value::as_str) {
            Some(text) => CapabilityOutput::success(text),
            None => CapabilityOutput::json(&arguments),
        }
    }
}

/// Always reports an error
pub struct FailingCapability {
    name: String,
}

impl FailingCapability {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Capability for FailingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        "Always fails".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _arguments: Value, _ctx: CapabilityContext) -> CapabilityOutput {
        CapabilityOutput::error(format!("{} failed", self.name))
    }
}

/// Sleeps, honouring cancellation, then returns "done"
pub struct SlowCapability {
    delay: Duration,
    /// Notified when an invocation starts
    pub started: Arc<Notify>,
}

impl SlowCapability {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl Capability for SlowCapability {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> String {
        "Takes a while".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _arguments: Value, ctx: CapabilityContext) -> CapabilityOutput {
        self.started.notify_one();
        tokio::select! {
            () = tokio::time::sleep(self.delay) => CapabilityOutput::success("done"),
            () = ctx.cancel.cancelled() => CapabilityOutput::error("[cancelled]"),
        }
    }
}

/// Panics on every call
pub struct PanickingCapability;

#[async_trait]
impl Capability for PanickingCapability {
    fn name(&self) -> &str {
        "panic"
    }

    fn description(&self) -> String {
        "Panics".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _arguments: Value, _ctx: CapabilityContext) -> CapabilityOutput {
        panic!("capability exploded");
    }
}

/// Text content shorthand
pub fn text(s: &str) -> Vec<ContentBlock> {
    vec![ContentBlock::text(s)]
}
