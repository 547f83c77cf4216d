//! Telemetry sinks and token accounting

use crate::engine::{RunMetadata, Transition};
use crate::message::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Receives engine events. Implementations must not block for long and
/// cannot fail the run.
pub trait TelemetrySink: Send + Sync {
    fn transition(&self, conversation_id: &str, transition: &Transition);

    fn run_finished(&self, conversation_id: &str, metadata: &RunMetadata);
}

/// Drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn transition(&self, _conversation_id: &str, _transition: &Transition) {}

    fn run_finished(&self, _conversation_id: &str, _metadata: &RunMetadata) {}
}

/// Emits events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn transition(&self, conversation_id: &str, transition: &Transition) {
        tracing::debug!(
            conv_id = %conversation_id,
            from = %transition.from,
            to = %transition.to,
            appended = transition.appended.len(),
            duration_ms = %transition.duration.as_millis(),
            "Transition"
        );
    }

    fn run_finished(&self, conversation_id: &str, metadata: &RunMetadata) {
        tracing::info!(
            conv_id = %conversation_id,
            outcome = %metadata.outcome,
            final_state = %metadata.final_state,
            steps = metadata.steps,
            generate_calls = metadata.generate_calls,
            tool_calls = metadata.tool_calls,
            cache_hits = metadata.cache_hits,
            input_tokens = metadata.usage.input_tokens,
            output_tokens = metadata.usage.output_tokens,
            duration_ms = %metadata.duration.as_millis(),
            "Run finished"
        );
    }
}

/// Token usage from one generate call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub timestamp: DateTime<Utc>,
    pub cache_hit: bool,
}

impl TokenEvent {
    pub fn new(model: impl Into<String>, usage: Usage, cache_hit: bool) -> Self {
        Self {
            model: model.into(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            timestamp: Utc::now(),
            cache_hit,
        }
    }

    pub fn usage(&self) -> Usage {
        Usage::new(self.input_tokens, self.output_tokens)
    }
}

/// Append-only token counter owned by an engine
#[derive(Debug, Default)]
pub struct Odometer {
    events: Mutex<Vec<TokenEvent>>,
}

impl Odometer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TokenEvent>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn record(&self, event: TokenEvent) {
        self.lock().push(event);
    }

    /// Sum over every recorded event
    pub fn totals(&self) -> Usage {
        self.lock().iter().map(TokenEvent::usage).fold(Usage::default(), |acc, u| acc + u)
    }

    pub fn events(&self) -> Vec<TokenEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<TokenEvent> {
        std::mem::take(&mut *self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_odometer_totals_and_drain() {
        let odometer = Odometer::new();
        assert!(odometer.is_empty());
        odometer.record(TokenEvent::new("m", Usage::new(10, 2), false));
        odometer.record(TokenEvent::new("m", Usage::new(5, 1), true));

        assert_eq!(odometer.totals(), Usage::new(15, 3));
        assert_eq!(odometer.len(), 2);
        assert!(odometer.events()[1].cache_hit);

        let drained = odometer.drain();
        assert_eq!(drained.len(), 2);
        assert!(odometer.is_empty());
        assert_eq!(odometer.totals(), Usage::default());
    }

    #[test]
    fn test_odometer_concurrent_record() {
        let odometer = Arc::new(Odometer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let odometer = odometer.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        odometer.record(TokenEvent::new("m", Usage::new(1, 1), false));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(odometer.totals(), Usage::new(800, 800));
    }
}
