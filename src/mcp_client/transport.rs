//! JSON-RPC over HTTP transport ("streamable HTTP").
//!
//! Handles low-level communication with remote capability providers:
//! - POSTing JSON-RPC requests and notifications to the provider endpoint
//! - Reading the reply either as a plain JSON body or as an SSE stream whose
//!   `data:` events carry JSON-RPC messages
//! - Echoing the provider-assigned session id on every request

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse, ProviderConfig};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Header carrying the provider-assigned session id.
const SESSION_HEADER: &str = "mcp-session-id";

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport Seams ─────────────────────────────────────────────────────────

/// A bidirectional JSON-RPC channel to one provider.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Send a request and wait for the response with the matching id.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<serde_json::Value>)
        -> Result<(), McpError>;

    /// Release the session. Best-effort.
    async fn close(&self) {}
}

/// Opens transports. Swapped out in tests to avoid the network.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderTransport>, McpError>;
}

/// Connector for HTTP providers.
#[derive(Debug, Default, Clone)]
pub struct HttpConnector;

#[async_trait]
impl TransportConnector for HttpConnector {
    async fn open(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderTransport>, McpError> {
        Ok(Arc::new(HttpTransport::new(config)?))
    }
}

// ─── HttpTransport ───────────────────────────────────────────────────────────

/// JSON-RPC transport over HTTP POST.
pub struct HttpTransport {
    provider_id: String,
    endpoint: String,
    http: HttpClient,
    headers: HashMap<String, String>,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    /// Create a transport for a provider. Does not touch the network.
    pub fn new(config: &ProviderConfig) -> Result<Self, McpError> {
        reqwest::Url::parse(&config.endpoint).map_err(|e| McpError::ConfigError {
            reason: format!("invalid endpoint for provider '{}': {e}", config.id),
        })?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::ConnectFailed {
                provider: config.id.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            provider_id: config.id.clone(),
            endpoint: config.endpoint.clone(),
            http,
            headers: config.headers.clone(),
            session_id: Mutex::new(None),
        })
    }

    /// The session id assigned by the provider, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            provider: self.provider_id.clone(),
            reason,
        }
    }

    /// Build a POST with the standard headers.
    fn post<T: serde::Serialize>(&self, body: &T) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json, text/event-stream")
            .json(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(session) = self.session_id() {
            req = req.header(SESSION_HEADER, session);
        }
        req
    }

    /// Remember the session id the provider handed out, if any.
    fn capture_session(&self, response: &reqwest::Response) {
        if let Some(value) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut slot = self.session_id.lock().unwrap_or_else(|e| e.into_inner());
            if slot.as_deref() != Some(value) {
                tracing::debug!(provider = %self.provider_id, "provider session established");
                *slot = Some(value.to_string());
            }
        }
    }

    /// Read an SSE body until the response for `id` arrives.
    ///
    /// Events that are not the awaited response (server notifications,
    /// keep-alives, responses to other ids) are skipped.
    async fn read_sse_response(
        &self,
        response: reqwest::Response,
        id: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        loop {
            while let Some(event) = take_event(&mut buffer) {
                if let Some(resp) = event_data(&event).and_then(|d| match_response(&d, id)) {
                    return Ok(resp);
                }
            }

            match byte_stream.next().await {
                Some(Ok(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes).replace("\r\n", "\n"));
                }
                Some(Err(e)) => {
                    return Err(self.transport_error(format!("stream read error: {e}")));
                }
                None => {
                    // Stream ended; the last event may lack its blank-line terminator
                    if let Some(resp) = event_data(buffer.trim()).and_then(|d| match_response(&d, id))
                    {
                        return Ok(resp);
                    }
                    return Err(self.transport_error(
                        "event stream closed before the response arrived".into(),
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl ProviderTransport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let response = self
            .post(&req)
            .send()
            .await
            .map_err(|e| self.transport_error(format!("request failed: {e}")))?;

        self.capture_session(&response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.transport_error(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);

        if is_event_stream {
            return self.read_sse_response(response, id).await;
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(format!("failed to read body: {e}")))?;

        match_response(&body, id).ok_or_else(|| {
            self.transport_error(format!(
                "no JSON-RPC response for request {id} in body: {}",
                body.chars().take(200).collect::<String>()
            ))
        })
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let mut notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            notification["params"] = params;
        }

        let response = self
            .post(&notification)
            .send()
            .await
            .map_err(|e| self.transport_error(format!("failed to send notification: {e}")))?;

        if !response.status().is_success() {
            return Err(self.transport_error(format!(
                "notification rejected with HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        let Some(session) = self.session_id() else {
            return;
        };
        let _ = self
            .http
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session)
            .send()
            .await;
    }
}

// ─── SSE Helpers ─────────────────────────────────────────────────────────────

/// Pop one complete SSE event (terminated by a blank line) off the buffer.
fn take_event(buffer: &mut String) -> Option<String> {
    let end = buffer.find("\n\n")?;
    let event = buffer[..end].to_string();
    buffer.drain(..end + 2);
    Some(event)
}

/// Concatenate the `data:` lines of an event. `None` for keep-alives/comments.
fn event_data(event: &str) -> Option<String> {
    let mut data = String::new();
    for line in event.lines() {
        if let Some(d) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
            data.push_str(d.trim());
        }
    }
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

/// Parse `raw` as a JSON-RPC response and return it if it answers `id`.
fn match_response(raw: &str, id: u64) -> Option<JsonRpcResponse> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    if value.get("id").and_then(|v| v.as_u64()) != Some(id) {
        return None;
    }
    if value.get("result").is_none() && value.get("error").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: super::types::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
