//! Property-based tests for state derivation and tool execution

use super::*;
use crate::message::{Message, ToolCall, Usage};
use crate::telemetry::NullSink;
use crate::testing::{EchoCapability, FailingCapability, MockClient};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Turn {
    User(String),
    Assistant(String),
    /// Assistant with tool calls to the given capability names, answered in full
    ToolRound(Vec<String>),
}

fn arb_capability_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("echo".to_string()),
        Just("broken".to_string()),
        Just("unknown".to_string()),
    ]
}

fn arb_turn() -> impl Strategy<Value = Turn> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(Turn::User),
        "[a-z]{1,8}".prop_map(Turn::Assistant),
        proptest::collection::vec(arb_capability_name(), 1..4).prop_map(Turn::ToolRound),
    ]
}

/// Build a valid conversation from turns, skipping any the manager rejects
fn build(turns: &[Turn]) -> ConversationManager {
    let mut manager = ConversationManager::seeded(Message::system("s")).unwrap();
    for turn in turns {
        match turn {
            Turn::User(t) => {
                let _ = manager.add_message(Message::user(t.clone()));
            }
            Turn::Assistant(t) => {
                let _ = manager.add_message(Message::assistant(t.clone()));
            }
            Turn::ToolRound(names) => {
                let calls: Vec<ToolCall> = names
                    .iter()
                    .map(|n| ToolCall::generated(n.clone(), json!({})))
                    .collect();
                if manager
                    .add_message(Message::assistant_with_tools(vec![], calls.clone()))
                    .is_ok()
                {
                    for call in &calls {
                        manager.add_message(Message::tool_result(call, "ok")).unwrap();
                    }
                }
            }
        }
    }
    manager
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn registry() -> Arc<CapabilityRegistry> {
    Arc::new(
        CapabilityRegistry::new()
            .with(Arc::new(EchoCapability))
            .unwrap()
            .with(Arc::new(FailingCapability::new("broken")))
            .unwrap(),
    )
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // Derivation is a pure function of the projection
    #[test]
    fn prop_derivation_is_pure(turns in proptest::collection::vec(arb_turn(), 0..12)) {
        let manager = build(&turns);
        let thread = manager.current_thread().unwrap();
        prop_assert_eq!(derive_state(&thread), derive_state(&thread));
    }

    // Once TERMINATE, deriving again and stepping change nothing
    #[test]
    fn prop_terminate_is_idempotent(
        turns in proptest::collection::vec(arb_turn(), 0..12),
        reply in "[a-z]{1,8}",
    ) {
        let mut manager = build(&turns);
        // Rejected when the last turn is already a user message
        let _ = manager.add_message(Message::user("q"));
        manager.add_message(Message::assistant(reply)).unwrap();
        let thread = manager.current_thread().unwrap();
        prop_assert_eq!(derive_state(&thread), EngineState::Terminate);

        let mock = Arc::new(MockClient::new("mock"));
        let engine = Engine::new(mock.clone(), registry(), EngineConfig::default())
            .with_telemetry(Arc::new(NullSink));
        let before = manager.snapshot();
        let transition = runtime()
            .block_on(engine.step(&mut manager, &CancellationToken::new()))
            .unwrap();

        prop_assert_eq!(transition.outcome, StepOutcome::Idle);
        prop_assert_eq!(manager.snapshot(), before);
        prop_assert_eq!(derive_state(&manager.current_thread().unwrap()), EngineState::Terminate);
        prop_assert!(mock.recorded_requests().is_empty());
    }

    // After an execute step every declared call has exactly one tool message
    #[test]
    fn prop_execute_answers_every_call(names in proptest::collection::vec(arb_capability_name(), 1..6)) {
        let mut manager = ConversationManager::seeded(Message::system("s")).unwrap();
        manager.add_message(Message::user("go")).unwrap();
        let calls: Vec<ToolCall> = names
            .iter()
            .map(|n| ToolCall::generated(n.clone(), json!({"text": "t"})))
            .collect();
        manager
            .add_message(Message::assistant_with_tools(vec![], calls.clone()))
            .unwrap();

        let engine = Engine::new(Arc::new(MockClient::new("mock")), registry(), EngineConfig::default())
            .with_telemetry(Arc::new(NullSink));
        let transition = runtime()
            .block_on(engine.step(&mut manager, &CancellationToken::new()))
            .unwrap();

        prop_assert_eq!(transition.from, EngineState::Execute);
        prop_assert_eq!(transition.to, EngineState::Generate);
        prop_assert_eq!(transition.appended.len(), calls.len());
        prop_assert!(manager.pending_tool_calls().unwrap().is_empty());

        let thread = manager.current_thread().unwrap();
        let answered: Vec<&str> = thread[3..].iter().filter_map(|m| m.tool_call_id()).collect();
        let declared: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        prop_assert_eq!(answered.len(), declared.len());
        let unique: HashSet<&str> = answered.iter().copied().collect();
        prop_assert_eq!(unique.len(), declared.len());
        prop_assert_eq!(answered, declared);
    }

    // No run ever produces adjacent user messages
    #[test]
    fn prop_run_keeps_alternation(replies in proptest::collection::vec("[a-z]{1,8}", 1..4)) {
        let mock = Arc::new(MockClient::new("mock"));
        for reply in &replies {
            mock.queue_text(reply, Usage::new(1, 1));
        }
        let engine = Engine::new(mock, registry(), EngineConfig::default())
            .with_telemetry(Arc::new(NullSink));
        let mut manager = ConversationManager::seeded(Message::system("s")).unwrap();
        let rt = runtime();
        for i in 0..replies.len() {
            manager.add_message(Message::user(format!("q{i}"))).unwrap();
            let result = rt.block_on(engine.run(&mut manager, &CancellationToken::new())).unwrap();
            prop_assert!(result.is_terminated());
        }
        let thread = manager.current_thread().unwrap();
        for pair in thread.windows(2) {
            prop_assert!(!(pair[0].role() == Role::User && pair[1].role() == Role::User));
        }
        prop_assert_eq!(engine.odometer().len(), replies.len());
    }
}
