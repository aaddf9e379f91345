//! Shared types for the agent core.
//!
//! Conversation messages and the append-only conversation state owned by a
//! single orchestration run.

use serde::{Deserialize, Serialize};

use crate::inference::types::{Role, ToolCall};

// ─── Messages ───────────────────────────────────────────────────────────────

/// A single turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool calls requested by the assistant, in the order the model wrote them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `tool` role: the ID of the tool call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `tool` role: the name of the tool that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn system(content: &str) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// An assistant message carrying tool-call requests.
    pub fn assistant_with_calls(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// The result of one tool call.
    pub fn tool_result(tool_call_id: &str, tool_name: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            name: Some(tool_name.to_string()),
            ..Self::plain(Role::Tool, content)
        }
    }

    fn plain(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Whether this message asks for at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

// ─── Conversation State ─────────────────────────────────────────────────────

/// Ordered, append-only message history plus the tag of the node that
/// produced the last message.
///
/// Messages are never removed or reordered. New batches are concatenated
/// onto the existing history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    sender: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing history (e.g. a previous turn's state).
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            sender: None,
        }
    }

    /// Append a batch produced by `sender`.
    pub fn append(&mut self, sender: &str, batch: Vec<Message>) {
        if batch.is_empty() {
            return;
        }
        self.messages.extend(batch);
        self.sender = Some(sender.to_string());
    }

    /// Append one message produced by `sender`.
    pub fn push(&mut self, sender: &str, message: Message) {
        self.append(sender, vec![message]);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Messages appended after the first `from` entries.
    pub fn since(&self, from: usize) -> &[Message] {
        &self.messages[from.min(self.messages.len())..]
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
