//! In-process stand-ins for capability providers, used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::errors::McpError;
use super::transport::{ProviderTransport, TransportConnector};
use super::types::{JsonRpcError, JsonRpcResponse, ProviderConfig};

/// A scripted provider: paged tool catalog, recorded calls, injectable faults.
#[derive(Default)]
pub struct StubProvider {
    name: Mutex<String>,
    pages: Mutex<Vec<Vec<Value>>>,
    methods: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Value)>>,
    call_delay: Mutex<Duration>,
    reject_init: AtomicBool,
    transport_down: AtomicBool,
    list_server_error: AtomicBool,
    closed: AtomicBool,
}

impl StubProvider {
    pub fn new(tools: Vec<Value>) -> Arc<Self> {
        let stub = Self::default();
        stub.pages.lock().unwrap().push(tools);
        Arc::new(stub)
    }

    pub fn add_page(&self, tools: Vec<Value>) {
        self.pages.lock().unwrap().push(tools);
    }

    pub fn reject_initialize(&self) {
        self.reject_init.store(true, Ordering::SeqCst);
    }

    pub fn fail_transport(&self) {
        self.transport_down.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.transport_down.store(false, Ordering::SeqCst);
        self.list_server_error.store(false, Ordering::SeqCst);
    }

    pub fn fail_list_with_server_error(&self) {
        self.list_server_error.store(true, Ordering::SeqCst);
    }

    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = delay;
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ok(result: Value) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 0,
            result: Some(result),
            error: None,
        }
    }

    fn list_page(&self, params: Option<&Value>) -> Value {
        let pages = self.pages.lock().unwrap();
        let index = params
            .and_then(|p| p.get("cursor"))
            .and_then(|c| c.as_str())
            .and_then(|c| c.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let tools = pages.get(index).cloned().unwrap_or_default();
        if index + 1 < pages.len() {
            json!({ "tools": tools, "nextCursor": format!("page-{}", index + 1) })
        } else {
            json!({ "tools": tools })
        }
    }
}

#[async_trait]
impl ProviderTransport for StubProvider {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, McpError> {
        self.methods.lock().unwrap().push(method.to_string());
        let name = self.name.lock().unwrap().clone();

        if self.transport_down.load(Ordering::SeqCst) {
            return Err(McpError::TransportError {
                provider: name,
                reason: "connection reset".into(),
            });
        }

        match method {
            "initialize" if self.reject_init.load(Ordering::SeqCst) => Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: 0,
                result: None,
                error: Some(JsonRpcError {
                    code: -32600,
                    message: "unsupported client".into(),
                    data: None,
                }),
            }),
            "initialize" => Ok(Self::ok(json!({
                "protocolVersion": super::types::PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": format!("stub-{name}"), "version": "0.1.0"}
            }))),
            "tools/list" if self.list_server_error.load(Ordering::SeqCst) => Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: 0,
                result: None,
                error: Some(JsonRpcError {
                    code: -32603,
                    message: "catalog unavailable".into(),
                    data: None,
                }),
            }),
            "tools/list" => Ok(Self::ok(self.list_page(params.as_ref()))),
            "tools/call" => {
                let params = params.unwrap_or_default();
                let tool = params["name"].as_str().unwrap_or_default().to_string();
                let args = params["arguments"].clone();
                self.calls.lock().unwrap().push((tool.clone(), args.clone()));

                let delay = *self.call_delay.lock().unwrap();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(Self::ok(json!({
                    "content": [{"type": "text", "text": format!("{tool} -> {args}")}],
                    "isError": false
                })))
            }
            other => Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: 0,
                result: None,
                error: Some(JsonRpcError {
                    code: -32601,
                    message: format!("unknown method {other}"),
                    data: None,
                }),
            }),
        }
    }

    async fn notify(&self, method: &str, _params: Option<Value>) -> Result<(), McpError> {
        self.methods.lock().unwrap().push(method.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out registered stub providers by id; unknown ids fail to connect.
#[derive(Default)]
pub struct StubConnector {
    providers: HashMap<String, Arc<StubProvider>>,
    opens: AtomicUsize,
    delay: Duration,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, provider: Arc<StubProvider>) -> Self {
        *provider.name.lock().unwrap() = id.to_string();
        self.providers.insert(id.to_string(), provider);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many times `open` has been called.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for StubConnector {
    async fn open(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderTransport>, McpError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.providers.get(&config.id) {
            Some(provider) if !provider.transport_down.load(Ordering::SeqCst) => {
                provider.closed.store(false, Ordering::SeqCst);
                Ok(provider.clone() as Arc<dyn ProviderTransport>)
            }
            _ => Err(McpError::ConnectFailed {
                provider: config.id.clone(),
                reason: "connection refused".into(),
            }),
        }
    }
}
