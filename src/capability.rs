//! Capabilities a tool call can target
//!
//! Capabilities are stateless singletons registered once at startup; all
//! per-call context arrives through `CapabilityContext`.

mod executor;
mod function;

pub use executor::CapabilityExecutor;
pub use function::FnCapability;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result from a capability invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    pub success: bool,
    pub output: String,
}

impl CapabilityOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }

    /// Serialize a structured result as the output text
    pub fn json(value: &Value) -> Self {
        Self::success(value.to_string())
    }
}

/// Context handed to every invocation
#[derive(Debug, Clone)]
pub struct CapabilityContext {
    /// Cancellation signal; long-running capabilities should watch it
    pub cancel: CancellationToken,
    /// Id of the tool call being answered
    pub call_id: String,
}

impl CapabilityContext {
    pub fn new(cancel: CancellationToken, call_id: impl Into<String>) -> Self {
        Self {
            cancel,
            call_id: call_id.into(),
        }
    }
}

/// Description of a capability advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Something a tool call can invoke
#[async_trait]
pub trait Capability: Send + Sync {
    /// Name the model uses in tool calls
    fn name(&self) -> &str;

    /// Description for the model
    fn description(&self) -> String;

    /// JSON schema for the arguments
    fn input_schema(&self) -> Value;

    /// Run with the call's arguments
    async fn invoke(&self, arguments: Value, ctx: CapabilityContext) -> CapabilityOutput;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Capability already registered: {0}")]
    Duplicate(String),
}

/// Name -> capability lookup, read-only once the engine holds it
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name().to_string();
        if self.capabilities.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.capabilities.insert(name, capability);
        Ok(())
    }

    /// Builder form of `register`
    pub fn with(mut self, capability: Arc<dyn Capability>) -> Result<Self, RegistryError> {
        self.register(capability)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Definitions for every registered capability, sorted by name
    pub fn definitions(&self) -> Vec<CapabilityDefinition> {
        self.capabilities
            .values()
            .map(|c| CapabilityDefinition {
                name: c.name().to_string(),
                description: c.description(),
                input_schema: c.input_schema(),
            })
            .collect()
    }
}
