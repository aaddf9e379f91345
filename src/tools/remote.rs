//! Remote tools: provider catalog entries wrapped as local descriptors.
//!
//! Names are namespaced `{providerId}_{remoteName}`. The declared input schema
//! is translated when possible so bad arguments are rejected locally; other
//! tools take a single opaque `arguments` field.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use super::descriptor::{ToolDescriptor, ToolHandler};
use super::errors::error_payload;
use super::schema::{ArgSchema, OPAQUE_FIELD};
use crate::mcp_client::{CapabilityDiscovery, McpError, McpToolDefinition, ProviderConnection};

/// Calls one tool on one provider connection.
pub struct RemoteTool {
    discovery: Weak<CapabilityDiscovery>,
    connection: Arc<ProviderConnection>,
    local_name: String,
    remote_name: String,
    opaque: bool,
}

impl RemoteTool {
    /// Wrap a catalog entry as a local tool.
    pub fn descriptor(
        discovery: Weak<CapabilityDiscovery>,
        connection: Arc<ProviderConnection>,
        def: McpToolDefinition,
    ) -> ToolDescriptor {
        let local_name = format!("{}_{}", connection.id(), def.name);
        let schema = match ArgSchema::from_json_schema(&def.input_schema) {
            Some(schema) => schema,
            None => {
                tracing::debug!(tool = %local_name, "remote schema not translatable, using opaque arguments");
                ArgSchema::opaque()
            }
        };
        let description = match def.description.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => format!("{} (provided by {})", def.name, connection.id()),
        };

        let handler = Self {
            discovery,
            opaque: schema.is_opaque(),
            connection,
            local_name: local_name.clone(),
            remote_name: def.name,
        };
        ToolDescriptor::new(&local_name, &description, schema, Arc::new(handler))
    }

    /// The arguments to forward, unwrapping the opaque field when present.
    fn remote_arguments(&self, args: Value) -> Value {
        if !self.opaque {
            return match args {
                Value::Null => Value::Object(Default::default()),
                other => other,
            };
        }
        match args.get(OPAQUE_FIELD) {
            Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
            Some(inner) => inner.clone(),
            None => Value::Object(Default::default()),
        }
    }

    fn failure_payload(&self, error: &McpError) -> Value {
        let kind = match error {
            McpError::Timeout { .. } => "tool_timeout",
            McpError::ServerError { .. } | McpError::MalformedResponse { .. } => "remote_error",
            _ => "provider_unavailable",
        };
        error_payload(kind, &self.local_name, &error.to_string())
    }
}

#[async_trait]
impl ToolHandler for RemoteTool {
    async fn call(&self, arguments: Value) -> Value {
        let arguments = self.remote_arguments(arguments);
        tracing::debug!(
            provider = %self.connection.id(),
            tool = %self.remote_name,
            "calling remote tool"
        );

        match self.connection.call_tool(&self.remote_name, arguments).await {
            Ok(result) => Value::String(result.to_string()),
            Err(e) => {
                tracing::warn!(tool = %self.local_name, error = %e, "remote tool call failed");
                if e.is_connection_fault() {
                    if let Some(discovery) = self.discovery.upgrade() {
                        discovery.drop_connection(&self.connection).await;
                    }
                }
                self.failure_payload(&e)
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mcp_client::test_support::{StubConnector, StubProvider};
    use crate::mcp_client::ProviderConfig;

    async fn setup(tools: Vec<Value>) -> (Arc<CapabilityDiscovery>, Arc<StubProvider>, Vec<ToolDescriptor>) {
        let provider = StubProvider::new(tools);
        let connector = Arc::new(StubConnector::new().with("weather", provider.clone()));
        let discovery = Arc::new(CapabilityDiscovery::new(
            connector,
            vec![ProviderConfig::new("weather", "http://stub/weather")],
        ));
        let listed = discovery.list_tools().await;
        (discovery, provider, listed)
    }

    fn forecast_tool() -> Value {
        json!({
            "name": "forecast",
            "description": "Daily forecast",
            "inputSchema": {
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }
        })
    }

    #[tokio::test]
    async fn test_translated_tool_forwards_arguments_and_stringifies_result() {
        let (_d, provider, tools) = setup(vec![forecast_tool()]).await;
        let tool = &tools[0];
        assert_eq!(tool.name(), "weather_forecast");
        assert!(!tool.schema().is_opaque());

        let out = tool.invoke(json!({"city": "Oslo"})).await.unwrap();
        let text = out.as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["isError"], false);
        assert_eq!(provider.calls(), vec![("forecast".to_string(), json!({"city": "Oslo"}))]);
    }

    #[tokio::test]
    async fn test_translated_tool_rejects_before_network() {
        let (_d, provider, tools) = setup(vec![forecast_tool()]).await;
        assert!(tools[0].invoke(json!({"town": "Oslo"})).await.is_err());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_opaque_tool_unwraps_json_string() {
        let (_d, provider, tools) = setup(vec![json!({
            "name": "lookup",
            "inputSchema": {"type": "object", "properties": {"q": {"oneOf": [{"type": "string"}]}}}
        })])
        .await;
        let tool = &tools[0];
        assert!(tool.schema().is_opaque());
        assert_eq!(tool.description(), "lookup (provided by weather)");

        tool.invoke(json!({"arguments": "{\"q\": \"rain\"}"})).await.unwrap();
        assert_eq!(provider.calls(), vec![("lookup".to_string(), json!({"q": "rain"}))]);
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_payload_and_disconnects() {
        let (discovery, provider, tools) = setup(vec![forecast_tool()]).await;
        provider.fail_transport();

        let out = tools[0].invoke(json!({"city": "Oslo"})).await.unwrap();
        assert_eq!(out["status"], "error");
        assert_eq!(out["error"], "provider_unavailable");
        assert!(!discovery.is_connected("weather"));
    }
}
