//! Property-based tests for the conversation tree
//!
//! These drive the manager with arbitrary operation sequences (invalid
//! ones are allowed to fail) and check that every projection stays
//! well-formed.

use super::*;
use crate::message::{Message, Role, ToolCall};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    User(String),
    Assistant(String),
    AssistantWithTools(usize),
    AnswerPending,
    /// Branch a user message under the node at this index (mod node count)
    BranchUser(usize, String),
    Checkout(usize),
    Rewind(usize),
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_text().prop_map(Op::User),
        arb_text().prop_map(Op::Assistant),
        (1usize..4).prop_map(Op::AssistantWithTools),
        Just(Op::AnswerPending),
        (any::<usize>(), arb_text()).prop_map(|(i, t)| Op::BranchUser(i, t)),
        any::<usize>().prop_map(Op::Checkout),
        any::<usize>().prop_map(Op::Rewind),
    ]
}

fn node_at(manager: &ConversationManager, index: usize) -> Option<String> {
    let ids: Vec<String> = manager.nodes().map(|n| n.id().to_string()).collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()].clone())
    }
}

fn apply(manager: &mut ConversationManager, op: Op) {
    // Rejected operations are fine; only the resulting tree is checked
    let _ = match op {
        Op::User(text) => manager.add_message(Message::user(text)).map(|_| ()),
        Op::Assistant(text) => manager.add_message(Message::assistant(text)).map(|_| ()),
        Op::AssistantWithTools(n) => {
            let calls = (0..n)
                .map(|_| ToolCall::generated("lookup", json!({})))
                .collect();
            manager
                .add_message(Message::assistant_with_tools(vec![], calls))
                .map(|_| ())
        }
        Op::AnswerPending => match manager.pending_tool_calls() {
            Ok(pending) => pending.first().map_or(Ok(()), |call| {
                manager
                    .add_message(Message::tool_result(call, "ok"))
                    .map(|_| ())
            }),
            Err(e) => Err(e),
        },
        Op::BranchUser(index, text) => match node_at(manager, index) {
            Some(node) => manager.branch_at(&node, Message::user(text)).map(|_| ()),
            None => Ok(()),
        },
        Op::Checkout(index) => match node_at(manager, index) {
            Some(node) => manager.checkout(&node).map(|_| ()),
            None => Ok(()),
        },
        Op::Rewind(index) => match node_at(manager, index) {
            Some(node) => manager.rewind(&node),
            None => Ok(()),
        },
    };
}

// ============================================================================
// Well-formedness
// ============================================================================

fn thread_is_well_formed(thread: &Thread) -> Result<(), String> {
    let mut open: HashSet<String> = HashSet::new();
    for (i, msg) in thread.iter().enumerate() {
        if msg.role() == Role::System && i != 0 {
            return Err(format!("system message at position {i}"));
        }
        if i > 0 && msg.role() == Role::User && thread[i - 1].role() == Role::User {
            return Err(format!("adjacent user messages at {i}"));
        }
        match msg.tool_call_id() {
            Some(id) => {
                if !open.remove(id) {
                    return Err(format!("tool message {id} answers nothing open"));
                }
            }
            None => {
                if !open.is_empty() {
                    return Err(format!("{} message with open calls at {i}", msg.role()));
                }
                open = msg.tool_calls().iter().map(|c| c.id.clone()).collect();
            }
        }
    }
    Ok(())
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Every materialized projection obeys the ordering rules
    #[test]
    fn prop_projections_well_formed(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut manager = ConversationManager::seeded(Message::system("s")).unwrap();
        for op in ops {
            apply(&mut manager, op);
        }
        for thread in manager.threads().unwrap() {
            prop_assert!(thread_is_well_formed(&thread).is_ok(), "{:?}", thread_is_well_formed(&thread));
        }
        let current = manager.current_thread().unwrap();
        prop_assert!(thread_is_well_formed(&current).is_ok());
    }

    // A chain of appends projects back in creation order
    #[test]
    fn prop_chain_projects_in_order(texts in proptest::collection::vec(arb_text(), 1..20)) {
        let mut manager = ConversationManager::seeded(Message::system("s")).unwrap();
        let mut expected = vec![manager.current_thread().unwrap()[0].id.clone()];
        for (i, text) in texts.into_iter().enumerate() {
            let msg = if i % 2 == 0 { Message::user(text) } else { Message::assistant(text) };
            expected.push(msg.id.clone());
            manager.add_message(msg).unwrap();
        }
        let leaf = manager.current_leaf_id().unwrap().to_string();
        let ids: Vec<String> = manager.get_thread(&leaf).unwrap().iter().map(|m| m.id.clone()).collect();
        prop_assert_eq!(ids, expected);
    }

    // branch_at only adds one node; every other node and the old thread are untouched
    #[test]
    fn prop_branch_isolation(
        ops in proptest::collection::vec(arb_op(), 1..30),
        index in any::<usize>(),
        text in arb_text(),
    ) {
        let mut manager = ConversationManager::seeded(Message::system("s")).unwrap();
        for op in ops {
            apply(&mut manager, op);
        }
        let old_leaf = manager.current_leaf_id().unwrap().to_string();
        let old_thread = manager.get_thread(&old_leaf).unwrap();
        let before = manager.snapshot();
        let target = node_at(&manager, index).unwrap();

        match manager.branch_at(&target, Message::user(text)) {
            Ok(new_id) => {
                let after = manager.snapshot();
                prop_assert_eq!(after.nodes.len(), before.nodes.len() + 1);
                for record in &before.nodes {
                    prop_assert!(after.nodes.contains(record));
                }
                prop_assert_eq!(manager.node(&new_id).unwrap().parent_id(), Some(target.as_str()));
                prop_assert_eq!(manager.current_leaf_id(), Some(new_id.as_str()));
            }
            Err(_) => prop_assert_eq!(manager.snapshot(), before),
        }
        prop_assert_eq!(manager.get_thread(&old_leaf).unwrap(), old_thread);
    }

    // Snapshots restore to an identical tree
    #[test]
    fn prop_snapshot_restores(ops in proptest::collection::vec(arb_op(), 0..30)) {
        let mut manager = ConversationManager::seeded(Message::system("s")).unwrap();
        for op in ops {
            apply(&mut manager, op);
        }
        let snapshot = manager.snapshot();
        let restored = ConversationManager::restore(snapshot.clone()).unwrap();
        prop_assert_eq!(restored.snapshot(), snapshot);
    }
}
