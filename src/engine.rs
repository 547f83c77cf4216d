//! Conversation engine
//!
//! Drives one conversation forward: derive the state from the active
//! projection, act on it, append what came back, repeat. All ordering
//! rules are enforced by the `ConversationManager` on append, so a cached
//! or misbehaving client cannot smuggle a malformed turn into the tree.

mod error;
mod result;
mod state;

#[cfg(test)]
mod proptests;

pub use error::EngineError;
pub use result::{EngineResult, RunMetadata, RunOutcome, StepOutcome, Transition};
pub use state::{derive_state, EngineState};

use crate::capability::{CapabilityExecutor, CapabilityRegistry};
use crate::client::{Client, ClientError, ClientRequest, ClientResponse};
use crate::config::EngineConfig;
use crate::conversation::{check_append, ConversationManager, Thread};
use crate::message::{Message, Role};
use crate::store::ConversationRepository;
use crate::telemetry::{Odometer, TelemetrySink, TokenEvent, TracingSink};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Engine {
    client: Arc<dyn Client>,
    executor: CapabilityExecutor,
    config: EngineConfig,
    telemetry: Arc<dyn TelemetrySink>,
    repository: Option<Arc<dyn ConversationRepository>>,
    odometer: Arc<Odometer>,
}

impl Engine {
    pub fn new(
        client: Arc<dyn Client>,
        capabilities: Arc<CapabilityRegistry>,
        config: EngineConfig,
    ) -> Self {
        let executor = CapabilityExecutor::new(capabilities, config.capability_timeout);
        Self {
            client,
            executor,
            config,
            telemetry: Arc::new(TracingSink),
            repository: None,
            odometer: Arc::new(Odometer::new()),
        }
    }

    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Save every committed node and the head pointers after each step
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn ConversationRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token usage of every generate call made through this engine
    pub fn odometer(&self) -> &Arc<Odometer> {
        &self.odometer
    }

    /// State of the active projection
    pub fn state(manager: &ConversationManager) -> Result<EngineState, EngineError> {
        Ok(derive_state(&manager.current_thread()?))
    }

    // ==================== Run loop ====================

    /// Step until TERMINATE, the step ceiling, a client failure or
    /// cancellation. Only structural and persistence problems are errors.
    pub async fn run(
        &self,
        manager: &mut ConversationManager,
        cancel: &CancellationToken,
    ) -> Result<EngineResult, EngineError> {
        let started = Instant::now();
        let conv_id = manager.conversation_id().to_string();

        let initial = Self::state(manager)?;
        if initial == EngineState::Incomplete {
            return Err(EngineError::NotReady { state: initial });
        }
        if let Some(repository) = &self.repository {
            repository.save_manager(manager).await?;
        }

        tracing::info!(conv_id = %conv_id, state = %initial, "Run started");

        let mut transitions = Vec::new();
        let outcome = loop {
            if Self::state(manager)?.is_terminal() {
                break RunOutcome::Terminated;
            }
            if transitions.len() >= self.config.max_steps {
                tracing::warn!(
                    conv_id = %conv_id,
                    max_steps = self.config.max_steps,
                    "Step limit reached"
                );
                break RunOutcome::StepLimitReached;
            }

            let transition = self.step(manager, cancel).await?;
            let stop = match &transition.outcome {
                StepOutcome::ClientFailed(e) => Some(RunOutcome::ClientFailed(e.clone())),
                StepOutcome::Cancelled => Some(RunOutcome::Cancelled),
                StepOutcome::Committed | StepOutcome::Idle => None,
            };
            transitions.push(transition);
            if let Some(outcome) = stop {
                break outcome;
            }
        };

        let thread = manager.current_thread()?;
        let metadata = RunMetadata::new(
            outcome,
            derive_state(&thread),
            transitions,
            started.elapsed(),
        );
        self.telemetry.run_finished(&conv_id, &metadata);

        Ok(EngineResult {
            thread,
            leaf_id: manager.current_leaf_id().map(String::from),
            metadata,
        })
    }

    // ==================== Single step ====================

    /// Perform exactly one transition.
    ///
    /// A cancelled or failed step leaves the tree exactly as it was.
    pub async fn step(
        &self,
        manager: &mut ConversationManager,
        cancel: &CancellationToken,
    ) -> Result<Transition, EngineError> {
        let started = Instant::now();
        let thread = manager.current_thread()?;
        let state = derive_state(&thread);

        tracing::debug!(conv_id = %manager.conversation_id(), state = %state, "Entering state");

        let transition = match state {
            EngineState::Incomplete => return Err(EngineError::NotReady { state }),
            EngineState::Terminate => Transition::unchanged(state, StepOutcome::Idle, started.elapsed()),
            _ if cancel.is_cancelled() => {
                Transition::unchanged(state, StepOutcome::Cancelled, started.elapsed())
            }
            EngineState::Generate => self.generate(manager, thread, cancel, started).await?,
            EngineState::Execute => self.execute(manager, cancel, started).await?,
        };

        if transition.is_committed() {
            self.persist(manager, &transition.appended).await?;
        }
        self.telemetry.transition(manager.conversation_id(), &transition);
        Ok(transition)
    }

    async fn generate(
        &self,
        manager: &mut ConversationManager,
        thread: Thread,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<Transition, EngineError> {
        let conv_id = manager.conversation_id().to_string();
        let request = ClientRequest::new(thread, self.config.params.clone())
            .with_tools(self.executor.registry().definitions());
        let timeout = self.config.client_timeout;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            sent = tokio::time::timeout(timeout, self.client.send(&request)) => {
                Some(sent.unwrap_or_else(|_| Err(ClientError::timeout(timeout))))
            }
        };

        // A response that lands after cancellation is discarded too
        let Some(result) = result.filter(|_| !cancel.is_cancelled()) else {
            tracing::info!(conv_id = %conv_id, "Generate cancelled");
            return Ok(Transition::unchanged(
                EngineState::Generate,
                StepOutcome::Cancelled,
                started.elapsed(),
            ));
        };

        let response = match result.and_then(|r| check_reply(&request.messages, r)) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    conv_id = %conv_id,
                    kind = %e.kind,
                    error = %e.message,
                    "Generate failed"
                );
                return Ok(Transition::unchanged(
                    EngineState::Generate,
                    StepOutcome::ClientFailed(e),
                    started.elapsed(),
                ));
            }
        };

        let ClientResponse {
            message,
            usage,
            cache_hit,
        } = response;
        self.odometer
            .record(TokenEvent::new(self.client.model_id(), usage, cache_hit));

        let mut message = message.with_usage(usage);
        message.metadata.cache_hit = cache_hit;
        let node_id = manager.add_message(message)?;

        Ok(Transition {
            from: EngineState::Generate,
            to: Self::state(manager)?,
            outcome: StepOutcome::Committed,
            appended: vec![node_id],
            usage,
            cache_hit,
            tool_calls: 0,
            duration: started.elapsed(),
        })
    }

    async fn execute(
        &self,
        manager: &mut ConversationManager,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<Transition, EngineError> {
        let calls = manager.pending_tool_calls()?;
        tracing::info!(
            conv_id = %manager.conversation_id(),
            calls = calls.len(),
            "Dispatching tool calls"
        );

        let results = self.executor.execute_all(&calls, cancel).await;
        if cancel.is_cancelled() {
            tracing::info!(conv_id = %manager.conversation_id(), "Execute cancelled");
            return Ok(Transition::unchanged(
                EngineState::Execute,
                StepOutcome::Cancelled,
                started.elapsed(),
            ));
        }

        let appended = results
            .into_iter()
            .map(|message| manager.add_message(message))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transition {
            from: EngineState::Execute,
            to: Self::state(manager)?,
            outcome: StepOutcome::Committed,
            appended,
            usage: crate::message::Usage::default(),
            cache_hit: false,
            tool_calls: calls.len(),
            duration: started.elapsed(),
        })
    }

    async fn persist(
        &self,
        manager: &ConversationManager,
        appended: &[String],
    ) -> Result<(), EngineError> {
        let Some(repository) = &self.repository else {
            return Ok(());
        };
        let conv_id = manager.conversation_id();
        for node in appended.iter().filter_map(|id| manager.node(id)) {
            repository.save_node(conv_id, node).await?;
        }
        repository.save_head(conv_id, &manager.head()).await?;
        Ok(())
    }
}

/// Reject replies that would not append cleanly to the projection they answer
fn check_reply(thread: &[Arc<Message>], response: ClientResponse) -> Result<ClientResponse, ClientError> {
    if response.message.role() != Role::Assistant {
        return Err(ClientError::malformed(format!(
            "expected an assistant message, got {}",
            response.message.role()
        )));
    }
    check_append(thread, &response.message)
        .map_err(|e| ClientError::malformed(format!("reply rejected: {e}")))?;
    Ok(response)
}
