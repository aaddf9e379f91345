//! Agent Core error types.
//!
//! Only run-level failures live here. Expected per-call conditions (bad
//! arguments, unknown tools, unavailable services) are tool-result payloads.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that fail an orchestration run or a session operation.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The language model call failed.
    #[error("model inference failed: {source}")]
    ModelInference {
        #[from]
        source: InferenceError,
    },

    /// The language model did not answer within its budget.
    #[error("model call timed out after {timeout_secs}s")]
    ModelTimeout { timeout_secs: u64 },

    /// Memory store operation failed.
    #[error("memory store error: {reason}")]
    Memory { reason: String },

    /// Invalid configuration (unknown persona, missing model).
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::Memory {
            reason: e.to_string(),
        }
    }
}

/// Safety classifier failures. Never fatal: the interceptor fails open.
#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("safety classifier failed: {reason}")]
    ClassifierFailed { reason: String },
}

/// Speech sink failures. Logged; never fail a turn.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech synthesis failed: {reason}")]
    SynthesisFailed { reason: String },
}
