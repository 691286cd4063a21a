//! Conversation context accumulated across turns.

use std::sync::Arc;

use tracing::trace;

use crate::core::frames::{ContextFrame, ContextMessage, Role};
use crate::core::tools::ToolDeclaration;

/// Ordered history plus the static tool set.
///
/// Only the orchestrator mutates it, in frame order, so history order matches
/// conversational order.
#[derive(Debug, Clone)]
pub struct TurnAggregator {
    messages: Vec<ContextMessage>,
    tools: Arc<[ToolDeclaration]>,
}

impl TurnAggregator {
    pub fn new(system_instruction: impl Into<String>, tools: Arc<[ToolDeclaration]>) -> Self {
        let system_instruction = system_instruction.into();
        let mut messages = Vec::new();
        if !system_instruction.trim().is_empty() {
            messages.push(ContextMessage::new(Role::System, system_instruction));
        }
        Self { messages, tools }
    }

    pub fn append_user(&mut self, content: &str) {
        self.append(Role::User, content);
    }

    pub fn append_assistant(&mut self, content: &str) {
        self.append(Role::Assistant, content);
    }

    fn append(&mut self, role: Role, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        trace!(role = %role, "Appending turn ({} chars)", content.len());
        self.messages.push(ContextMessage::new(role, content));
    }

    pub fn snapshot(&self) -> ContextFrame {
        ContextFrame {
            messages: self.messages.clone(),
            tools: self.tools.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ContextMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Arc<[ToolDeclaration]> {
        Arc::from(vec![ToolDeclaration::new("lookup", "Look something up")])
    }

    #[test]
    fn test_snapshot_starts_with_system_instruction() {
        let aggregator = TurnAggregator::new("be helpful", tools());
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].role, Role::System);
        assert_eq!(snapshot.tools.len(), 1);
    }

    #[test]
    fn test_turns_preserve_order() {
        let mut aggregator = TurnAggregator::new("be helpful", tools());
        aggregator.append_user("hi");
        aggregator.append_assistant("hello, how can I help?");
        aggregator.append_user("track my order");

        let roles: Vec<Role> = aggregator.snapshot().messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(aggregator.last().unwrap().content, "track my order");
    }

    #[test]
    fn test_blank_content_ignored() {
        let mut aggregator = TurnAggregator::new("", tools());
        assert!(aggregator.is_empty());
        aggregator.append_user("   ");
        aggregator.append_assistant("");
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut aggregator = TurnAggregator::new("sys", tools());
        let before = aggregator.snapshot();
        aggregator.append_user("later");
        assert_eq!(before.messages.len(), 1);
        assert_eq!(aggregator.len(), 2);
    }
}
