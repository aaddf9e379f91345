//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests to the configured model
//! endpoint. Walks the fallback chain when the current model is unavailable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use uuid::Uuid;

use crate::agent_core::types::Message;

use super::config::{attempt_order, resolve_active_model, ModelConfig, ModelsConfig};
use super::errors::InferenceError;
use super::model::{LanguageModel, ModelRequest, ModelResponse};
use super::types::{ChatCompletionRequest, ChatMessage, Role, ToolCall, ToolCallResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout.
///
/// The graph applies its own per-call budget on top of this; this one only
/// keeps a wedged socket from pinning a connection forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the model endpoint(s) described by `ModelsConfig`.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelsConfig,
}

impl InferenceClient {
    /// Create a new inference client from the models configuration.
    ///
    /// Fails if neither the active model nor any fallback is configured.
    /// Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: ModelsConfig) -> Result<Self, InferenceError> {
        let (key, model) = resolve_active_model(&config)?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: model.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        tracing::info!(
            model = %key,
            display_name = %model.display_name,
            fallbacks = config.fallback_chain.len(),
            "inference client ready"
        );

        Ok(Self { http, config })
    }

    /// Send one request to a specific model.
    async fn try_model(
        &self,
        key: &str,
        model: &ModelConfig,
        request: &ModelRequest,
    ) -> Result<ModelResponse, InferenceError> {
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: Role::System,
                content: Some(request.system_prompt.clone()),
                tool_call_id: None,
                tool_calls: None,
            });
        }
        messages.extend(request.messages.iter().map(to_chat_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.clone())
        };

        let body = ChatCompletionRequest {
            model: model.model_name.clone().unwrap_or_else(|| key.to_string()),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: request.temperature.unwrap_or(model.temperature),
            max_tokens: model.max_tokens,
            stream: false,
        };

        // Log the request metadata, not the body
        tracing::debug!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "chat completion request"
        );

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = model.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_response(&body_text)
    }
}

#[async_trait]
impl LanguageModel for InferenceClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError> {
        let order = attempt_order(&self.config);
        let mut attempted = Vec::new();
        let mut last_error: Option<InferenceError> = None;

        for key in order {
            let Some(model) = self.config.models.get(&key) else {
                continue;
            };
            match self.try_model(&key, model, &request).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retriable() => {
                    tracing::warn!(model = %key, error = %e, "model unavailable, trying fallback");
                    attempted.push(key);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(_) if attempted.len() > 1 => Err(InferenceError::AllModelsUnavailable { attempted }),
            Some(e) => Err(e),
            None => Err(InferenceError::AllModelsUnavailable { attempted }),
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Convert a conversation message into its wire form.
fn to_chat_message(msg: &Message) -> ChatMessage {
    let tool_calls = if msg.tool_calls.is_empty() {
        None
    } else {
        Some(msg.tool_calls.iter().map(ToolCallResponse::from).collect())
    };
    ChatMessage {
        role: msg.role,
        content: Some(msg.content.clone()),
        tool_call_id: msg.tool_call_id.clone(),
        tool_calls,
    }
}

/// Parse a non-streaming chat completion body into a `ModelResponse`.
///
/// Tool-call arguments the model failed to emit as valid JSON are passed
/// through as `{"_raw": "..."}` so that schema validation, not the client,
/// rejects them and the model gets a chance to retry.
pub fn parse_completion_response(body: &str) -> Result<ModelResponse, InferenceError> {
    #[derive(Deserialize)]
    struct CompletionResponse {
        choices: Vec<CompletionChoice>,
    }

    #[derive(Deserialize)]
    struct CompletionChoice {
        message: CompletionMessage,
    }

    #[derive(Deserialize)]
    struct CompletionMessage {
        content: Option<String>,
        tool_calls: Option<Vec<CompletionToolCall>>,
    }

    #[derive(Deserialize)]
    struct CompletionToolCall {
        id: Option<String>,
        function: CompletionFunction,
    }

    #[derive(Deserialize)]
    struct CompletionFunction {
        name: String,
        #[serde(default)]
        arguments: String,
    }

    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let content = choice.message.content.filter(|c| !c.is_empty());

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let raw = tc.function.arguments;
            let arguments = if raw.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({ "_raw": raw }))
            };
            ToolCall {
                id: tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
                name: tc.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ModelResponse {
        content,
        tool_calls,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
