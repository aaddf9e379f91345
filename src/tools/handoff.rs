//! The handoff tool and the directive read back out of its results.
//!
//! Executing the tool only produces a payload; the session applies the
//! persona switch after the turn completes.

use serde_json::{json, Value};

use super::descriptor::ToolDescriptor;
use super::schema::{ArgSchema, FieldType};
use crate::agent_core::personas;
use crate::agent_core::types::Message;
use crate::inference::types::Role;

pub const HANDOFF_TOOL_NAME: &str = "transfer_to_agent";

/// Build the handoff tool; its target enum is the persona table.
pub fn handoff_tool() -> ToolDescriptor {
    let ids = personas::ids();
    ToolDescriptor::from_fn(
        HANDOFF_TOOL_NAME,
        "Transfer the conversation to another agent persona better suited to the user's request.",
        ArgSchema::new()
            .required_enum("targetAgentId", &ids, "Id of the persona to transfer to")
            .required("reason", FieldType::String, "Why the transfer helps the user"),
        |args| {
            json!({
                "status": "success",
                "type": "handoff",
                "targetAgentId": args["targetAgentId"],
                "reason": args["reason"],
            })
        },
    )
}

/// A request to switch personas for the next turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffDirective {
    pub target: String,
    pub reason: String,
}

impl HandoffDirective {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if payload.get("status")?.as_str()? != "success" || payload.get("type")?.as_str()? != "handoff" {
            return None;
        }
        Some(Self {
            target: payload.get("targetAgentId")?.as_str()?.to_string(),
            reason: payload
                .get("reason")
                .and_then(|r| r.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// The last handoff among the tool results in `messages`, if any.
    pub fn find_in(messages: &[Message]) -> Option<Self> {
        messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Tool && m.name.as_deref() == Some(HANDOFF_TOOL_NAME))
            .find_map(|m| {
                serde_json::from_str::<Value>(&m.content)
                    .ok()
                    .and_then(|v| Self::from_payload(&v))
            })
    }
}
