//! Conduit - conversation engine core
//!
//! Branching message history, a state-derived generate/execute loop and a
//! provider-agnostic client contract. Providers, storage backends and
//! telemetry sinks plug in through traits.

pub mod cache;
pub mod capability;
pub mod client;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod logging;
pub mod message;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use capability::{Capability, CapabilityContext, CapabilityOutput, CapabilityRegistry};
pub use client::{Client, ClientError, ClientErrorKind, ClientRequest, ClientResponse, GenerationParams};
pub use config::EngineConfig;
pub use conversation::{BranchNavigator, ConversationError, ConversationManager, Direction, Thread};
pub use engine::{Engine, EngineError, EngineResult, EngineState, RunOutcome};
pub use message::{ContentBlock, Message, Role, ToolCall, Usage};
