//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The response body could not be interpreted as a chat completion.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        reason: String,
    },

    /// Every model in the fallback chain was unavailable.
    #[error("all models unavailable (tried: {})", attempted.join(", "))]
    AllModelsUnavailable {
        attempted: Vec<String>,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl InferenceError {
    /// Whether this error should move the client to the next fallback model.
    ///
    /// HTTP 404 is included because local runtimes return 404 when a model
    /// isn't installed; the next model in the chain may still be available.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. }
                | InferenceError::Timeout { .. }
                | InferenceError::HttpError { status: 404, .. }
                | InferenceError::HttpError { status: 500, .. }
                | InferenceError::HttpError { status: 502..=504, .. }
        )
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
