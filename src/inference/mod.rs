//! Inference Client: OpenAI-compatible API client for the reasoning model.
//!
//! This module handles all communication with the model endpoint:
//! - The `LanguageModel` seam the orchestration graph calls through
//! - Non-streaming chat completions with tool binding
//! - Fallback chain management
//! - Model configuration (the `models` section of `companion.yaml`)
//!
//! The client speaks the OpenAI Chat Completions API, so switching models
//! is a config change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod model;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::{ModelConfig, ModelsConfig};
pub use errors::InferenceError;
pub use model::{LanguageModel, ModelRequest, ModelResponse};
pub use types::{ChatMessage, Role, ToolCall, ToolDefinition};
