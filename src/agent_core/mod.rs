//! Agent Core: orchestration layer for the companion.
//!
//! Submodules:
//! - `graph`: reasoning ↔ tool-execution state machine with run bounds
//! - `turn`: one user turn; races the safety classifier against the graph
//! - `session`: per-user conversation, persona switching, memory save
//! - `safety`: safety classifiers (keyword, model) and the session sentinel
//! - `personas`: static persona table
//! - `memory`: per-user summary store (SQLite, in-memory)
//! - `types`: messages and the append-only conversation state
//! - `errors`: run-level error types

pub mod errors;
pub mod graph;
pub mod memory;
pub mod personas;
pub mod safety;
pub mod session;
pub mod turn;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use errors::{AgentError, SafetyError, SpeechError};
pub use graph::{GraphConfig, OrchestrationGraph, RunOutcome, RunResult, StopReason};
pub use memory::{InMemoryStore, MemoryStore, SqliteMemoryStore};
pub use personas::Persona;
pub use safety::{KeywordSafetyClassifier, ModelSafetyClassifier, SafetyClassifier};
pub use session::Session;
pub use turn::{ReplySource, SpeechSink, TurnReply, TurnRunner};
pub use types::{ConversationState, Message};
