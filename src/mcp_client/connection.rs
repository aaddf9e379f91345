//! A live connection to one capability provider.
//!
//! Wraps a transport with the initialization handshake, paged tool listing,
//! and timed tool calls. A transport-level failure marks the connection
//! unhealthy so discovery can drop it from the table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::errors::McpError;
use super::transport::{extract_result, ProviderTransport, TransportConnector};
use super::types::{
    InitializeResult, ListToolsResult, McpToolDefinition, ProviderConfig, ServerInfo,
    PROTOCOL_VERSION,
};

/// Upper bound on `tools/list` pages, guards against a cursor that never ends.
const MAX_LIST_PAGES: usize = 20;

/// Per-operation time budgets for provider traffic.
#[derive(Debug, Clone, Copy)]
pub struct ProviderTimeouts {
    /// `initialize` + `notifications/initialized`.
    pub handshake: Duration,
    /// One full `tools/list` (all pages).
    pub list: Duration,
    /// One `tools/call`.
    pub call: Duration,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            list: Duration::from_secs(10),
            call: Duration::from_secs(30),
        }
    }
}

/// An initialized session with a capability provider.
pub struct ProviderConnection {
    config: ProviderConfig,
    transport: Arc<dyn ProviderTransport>,
    server_info: Option<ServerInfo>,
    healthy: AtomicBool,
    timeouts: ProviderTimeouts,
}

impl std::fmt::Debug for ProviderConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConnection")
            .field("id", &self.config.id)
            .field("endpoint", &self.config.endpoint)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

impl ProviderConnection {
    /// Open a transport and perform the initialization handshake.
    pub async fn establish(
        config: &ProviderConfig,
        connector: &dyn TransportConnector,
        timeouts: ProviderTimeouts,
    ) -> Result<Self, McpError> {
        let transport = connector.open(config).await?;

        let init = match tokio::time::timeout(
            timeouts.handshake,
            initialize(transport.as_ref(), &config.id),
        )
        .await
        {
            Ok(Ok(init)) => init,
            Ok(Err(e)) => {
                transport.close().await;
                return Err(match e {
                    McpError::InitFailed { .. } => e,
                    other => McpError::InitFailed {
                        provider: config.id.clone(),
                        reason: other.to_string(),
                    },
                });
            }
            Err(_) => {
                transport.close().await;
                return Err(McpError::InitFailed {
                    provider: config.id.clone(),
                    reason: format!(
                        "initialization timed out after {}ms",
                        timeouts.handshake.as_millis()
                    ),
                });
            }
        };

        if let Some(version) = &init.protocol_version {
            if version != PROTOCOL_VERSION {
                tracing::debug!(
                    provider = %config.id,
                    server_version = %version,
                    "provider negotiated a different protocol revision"
                );
            }
        }

        Ok(Self {
            config: config.clone(),
            transport,
            server_info: init.server_info,
            healthy: AtomicBool::new(true),
            timeouts,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// False once a transport-level failure has been seen.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Fetch the provider's full tool catalog, following `nextCursor`.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let fetch = async {
            let mut tools = Vec::new();
            let mut cursor: Option<String> = None;

            for _ in 0..MAX_LIST_PAGES {
                let params = cursor
                    .as_ref()
                    .map(|c| serde_json::json!({ "cursor": c }));
                let result = self.request("tools/list", params).await?;
                let page: ListToolsResult =
                    serde_json::from_value(result).map_err(|e| McpError::MalformedResponse {
                        provider: self.config.id.clone(),
                        method: "tools/list".into(),
                        reason: e.to_string(),
                    })?;

                for entry in page.tools {
                    match serde_json::from_value::<McpToolDefinition>(entry) {
                        Ok(def) => tools.push(def),
                        Err(e) => tracing::warn!(
                            provider = %self.config.id,
                            error = %e,
                            "skipping malformed tool definition"
                        ),
                    }
                }
                match page.next_cursor {
                    Some(next) if !next.is_empty() => cursor = Some(next),
                    _ => return Ok(tools),
                }
            }

            tracing::warn!(
                provider = %self.config.id,
                pages = MAX_LIST_PAGES,
                "tools/list page limit reached, catalog truncated"
            );
            Ok(tools)
        };

        tokio::time::timeout(self.timeouts.list, fetch)
            .await
            .map_err(|_| self.timeout_error("tools/list", self.timeouts.list))?
    }

    /// Invoke a remote tool and return the raw `tools/call` result.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        tokio::time::timeout(self.timeouts.call, self.request("tools/call", Some(params)))
            .await
            .map_err(|_| self.timeout_error("tools/call", self.timeouts.call))?
    }

    /// Release the provider session.
    pub async fn close(&self) {
        self.healthy.store(false, Ordering::Release);
        self.transport.close().await;
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let outcome = match self.transport.request(method, params).await {
            Ok(response) => extract_result(response),
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            if e.is_connection_fault() {
                self.healthy.store(false, Ordering::Release);
            }
        }
        outcome
    }

    fn timeout_error(&self, operation: &str, budget: Duration) -> McpError {
        McpError::Timeout {
            provider: self.config.id.clone(),
            operation: operation.to_string(),
            timeout_ms: budget.as_millis() as u64,
        }
    }
}

/// Perform the initialization handshake.
async fn initialize(
    transport: &dyn ProviderTransport,
    provider_id: &str,
) -> Result<InitializeResult, McpError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let response = transport.request("initialize", Some(params)).await?;
    let result = extract_result(response)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::InitFailed {
            provider: provider_id.to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    transport
        .notify("notifications/initialized", None)
        .await?;

    Ok(init)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
