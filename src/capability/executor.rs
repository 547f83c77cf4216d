//! Concurrent tool-call execution
//!
//! Every call in an assistant turn runs on its own task with its own
//! timeout. Results come back in declaration order regardless of
//! completion order, and every call yields exactly one tool message.

use super::{Capability, CapabilityContext, CapabilityRegistry};
use crate::message::{CapabilityFailure, FailureKind, Message, ToolCall};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

#[derive(Debug, Clone)]
pub struct CapabilityExecutor {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl CapabilityExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a single call on the current task
    pub async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> Message {
        invoke(
            self.registry.resolve(&call.name),
            call.clone(),
            self.timeout,
            cancel.child_token(),
        )
        .await
    }

    /// Execute all calls concurrently, returning one tool message per call
    /// in the order the calls were declared.
    ///
    /// Panics inside a capability are caught and reported as failures for
    /// that call only. Dropping the returned future cancels every call's
    /// token and aborts the tasks still running.
    pub async fn execute_all(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<Message> {
        let scope = cancel.child_token();
        let _cancel_on_drop = scope.clone().drop_guard();

        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                AbortOnDropHandle::new(tokio::spawn(invoke(
                    self.registry.resolve(&call.name),
                    call.clone(),
                    self.timeout,
                    scope.child_token(),
                )))
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(calls)
            .map(|(joined, call)| joined.unwrap_or_else(|e| join_failure(call, &e)))
            .collect()
    }
}

async fn invoke(
    capability: Option<Arc<dyn Capability>>,
    call: ToolCall,
    timeout: Duration,
    cancel: CancellationToken,
) -> Message {
    let Some(capability) = capability else {
        tracing::warn!(call_id = %call.id, name = %call.name, "No capability registered");
        return Message::tool_failure(&call, CapabilityFailure::not_found(&call.name));
    };

    let ctx = CapabilityContext::new(cancel.clone(), call.id.clone());
    let started = Instant::now();

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CapabilityFailure::new(
            FailureKind::Cancelled,
            "cancelled before completion",
        )),
        outcome = tokio::time::timeout(timeout, capability.invoke(call.arguments.clone(), ctx)) => {
            match outcome {
                Ok(output) if output.success => Ok(output.output),
                Ok(output) => Err(CapabilityFailure::new(FailureKind::CapabilityError, output.output)),
                Err(_) => Err(CapabilityFailure::new(
                    FailureKind::TimedOut,
                    format!("no result after {}ms", timeout.as_millis()),
                )),
            }
        }
    };

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match result {
        Ok(output) => {
            tracing::info!(call_id = %call.id, name = %call.name, elapsed_ms, "Capability completed");
            Message::tool_result(&call, output)
        }
        Err(failure) => {
            tracing::warn!(
                call_id = %call.id,
                name = %call.name,
                elapsed_ms,
                kind = %failure.kind,
                error = %failure.message,
                "Capability failed"
            );
            Message::tool_failure(&call, failure)
        }
    }
}

fn join_failure(call: &ToolCall, error: &JoinError) -> Message {
    let failure = if error.is_panic() {
        tracing::error!(call_id = %call.id, name = %call.name, "Capability panicked");
        CapabilityFailure::new(FailureKind::Panicked, format!("capability '{}' panicked", call.name))
    } else {
        CapabilityFailure::new(FailureKind::Cancelled, "task aborted")
    };
    Message::tool_failure(call, failure)
}
