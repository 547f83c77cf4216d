//! Ordering rules for a projection
//!
//! Every append is checked against the thread it would extend, so any
//! projection materialized from the tree satisfies:
//! - no two adjacent user messages
//! - system messages only at the root
//! - a tool message answers a still-open call of the assistant turn it follows
//! - nothing but tool messages may follow an assistant turn with open calls

use super::ConversationError;
use crate::message::{Message, Role, ToolCall};
use std::collections::HashSet;
use std::sync::Arc;

/// Tool calls of the most recent assistant turn that have no tool message yet
pub fn pending_calls(thread: &[Arc<Message>]) -> Vec<&ToolCall> {
    let trailing = thread
        .iter()
        .rev()
        .take_while(|m| m.role() == Role::Tool)
        .count();
    let Some(turn_index) = thread.len().checked_sub(trailing + 1) else {
        return Vec::new();
    };

    let answered: HashSet<&str> = thread
        .get(turn_index + 1..)
        .unwrap_or_default()
        .iter()
        .filter_map(|m| m.tool_call_id())
        .collect();

    thread[turn_index]
        .tool_calls()
        .iter()
        .filter(|call| !answered.contains(call.id.as_str()))
        .collect()
}

/// Check that `next` may be appended to `thread`
pub(crate) fn check_append(thread: &[Arc<Message>], next: &Message) -> Result<(), ConversationError> {
    let Some(last) = thread.last() else {
        if next.role() == Role::Tool {
            return Err(ConversationError::violation(
                "a tool message cannot start a conversation",
            ));
        }
        return check_call_ids(next);
    };

    if next.role() == Role::System {
        return Err(ConversationError::violation(
            "system messages are only allowed at the root",
        ));
    }

    let pending = pending_calls(thread);
    if !pending.is_empty() {
        return match next.tool_call_id() {
            Some(id) if pending.iter().any(|call| call.id == id) => Ok(()),
            Some(id) => Err(ConversationError::violation(format!(
                "tool message answers unknown or already answered call '{id}'"
            ))),
            None => Err(ConversationError::violation(format!(
                "{} message while {} tool call(s) are unanswered",
                next.role(),
                pending.len()
            ))),
        };
    }

    if let Some(id) = next.tool_call_id() {
        return Err(ConversationError::violation(format!(
            "tool message '{id}' does not answer a pending call"
        )));
    }

    if next.role() == Role::User && last.role() == Role::User {
        return Err(ConversationError::violation(
            "two user messages may not be adjacent",
        ));
    }

    check_call_ids(next)
}

fn check_call_ids(message: &Message) -> Result<(), ConversationError> {
    let mut seen = HashSet::new();
    for call in message.tool_calls() {
        if !seen.insert(call.id.as_str()) {
            return Err(ConversationError::violation(format!(
                "duplicate tool call id '{}'",
                call.id
            )));
        }
    }
    Ok(())
}
