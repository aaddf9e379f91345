//! The language model seam.
//!
//! The orchestration graph only talks to `dyn LanguageModel`. The HTTP client
//! in `client.rs` is the production implementation; tests script their own.

use async_trait::async_trait;

use crate::agent_core::types::Message;

use super::errors::InferenceError;
use super::types::{ToolCall, ToolDefinition};

/// One inference call: history, bound tools, persona instructions, temperature.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    /// `None` uses the model's configured default.
    pub temperature: Option<f32>,
}

/// The generated assistant message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    /// A plain text answer with no tool calls.
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
        }
    }

    /// A response that only requests tool calls.
    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }
}

/// Anything that can turn a message history into the next assistant message.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError>;
}
