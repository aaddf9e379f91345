//! Capability discovery: the provider connection table.
//!
//! Keeps one connection per provider id, lazily bootstrapped from the
//! configured defaults, and turns every connected provider's catalog into
//! namespaced local tools.
//!
//! Concurrent `connect` calls for the same id share one in-flight attempt:
//! the first caller installs a shared future in `pending`, later callers
//! await the same future, and whoever settles first moves the result into
//! `connections`. Lock order is always `pending` then `connections`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use futures::future::{join_all, BoxFuture, FutureExt, Shared};

use super::connection::{ProviderConnection, ProviderTimeouts};
use super::errors::McpError;
use super::transport::{HttpConnector, TransportConnector};
use super::types::ProviderConfig;
use crate::tools::{RemoteTool, ToolDescriptor};

type ConnectFuture = Shared<BoxFuture<'static, Result<Arc<ProviderConnection>, McpError>>>;

/// Connection table for remote capability providers.
pub struct CapabilityDiscovery {
    connector: Arc<dyn TransportConnector>,
    defaults: Vec<ProviderConfig>,
    timeouts: ProviderTimeouts,
    connections: RwLock<HashMap<String, Arc<ProviderConnection>>>,
    pending: Mutex<HashMap<String, ConnectFuture>>,
    /// Whether the lazy `connect_defaults` has run since creation or `reset`.
    bootstrapped: tokio::sync::Mutex<bool>,
}

impl CapabilityDiscovery {
    pub fn new(connector: Arc<dyn TransportConnector>, defaults: Vec<ProviderConfig>) -> Self {
        Self {
            connector,
            defaults,
            timeouts: ProviderTimeouts::default(),
            connections: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            bootstrapped: tokio::sync::Mutex::new(false),
        }
    }

    /// Discovery over HTTP providers.
    pub fn http(defaults: Vec<ProviderConfig>) -> Self {
        Self::new(Arc::new(HttpConnector), defaults)
    }

    pub fn with_timeouts(mut self, timeouts: ProviderTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    // ─── Connecting ──────────────────────────────────────────────────────

    /// Connect to `endpoint` under `provider_id`. No-op when already connected.
    pub async fn connect(&self, provider_id: &str, endpoint: &str) -> bool {
        self.connect_provider(&ProviderConfig::new(provider_id, endpoint))
            .await
    }

    /// Connect one provider. Returns whether it is connected afterwards.
    ///
    /// Failures are logged, never returned: one provider's outage must not
    /// abort its siblings.
    pub async fn connect_provider(&self, config: &ProviderConfig) -> bool {
        let attempt = {
            let mut pending = lock(&self.pending);
            if self.read_connections().contains_key(&config.id) {
                return true;
            }
            match pending.get(&config.id) {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let fut = establish(self.connector.clone(), config.clone(), self.timeouts)
                        .boxed()
                        .shared();
                    pending.insert(config.id.clone(), fut.clone());
                    fut
                }
            }
        };

        let outcome = attempt.clone().await;

        {
            let mut pending = lock(&self.pending);
            let ours = pending
                .get(&config.id)
                .is_some_and(|f| f.ptr_eq(&attempt));
            if ours {
                pending.remove(&config.id);
                if let Ok(conn) = &outcome {
                    self.write_connections()
                        .entry(config.id.clone())
                        .or_insert_with(|| conn.clone());
                }
            }
        }

        outcome.is_ok() && self.read_connections().contains_key(&config.id)
    }

    /// Connect every configured default provider concurrently.
    ///
    /// Returns how many ended up connected; may be fewer than configured.
    pub async fn connect_defaults(&self) -> usize {
        if self.defaults.is_empty() {
            return 0;
        }
        let results = join_all(self.defaults.iter().map(|c| self.connect_provider(c))).await;
        let connected = results.into_iter().filter(|ok| *ok).count();
        tracing::info!(
            connected,
            configured = self.defaults.len(),
            "default capability providers connected"
        );
        connected
    }

    async fn ensure_bootstrapped(&self) {
        let mut done = self.bootstrapped.lock().await;
        if *done {
            return;
        }
        *done = true;
        self.connect_defaults().await;
    }

    // ─── Tool Listing ────────────────────────────────────────────────────

    /// Query every connected provider and wrap its tools as local descriptors.
    ///
    /// Bootstraps the default providers on first use. A provider whose
    /// listing fails is skipped; if the failure was at the transport level
    /// the provider is also disconnected.
    pub async fn list_tools(self: &Arc<Self>) -> Vec<ToolDescriptor> {
        if self.read_connections().is_empty() {
            self.ensure_bootstrapped().await;
        }
        self.prune_unhealthy().await;

        let mut connections: Vec<Arc<ProviderConnection>> =
            self.read_connections().values().cloned().collect();
        connections.sort_by(|a, b| a.id().cmp(b.id()));

        let listings = join_all(connections.into_iter().map(|conn| async move {
            let listing = conn.list_tools().await;
            (conn, listing)
        }))
        .await;

        let mut tools = Vec::new();
        for (conn, listing) in listings {
            match listing {
                Ok(defs) => {
                    tracing::debug!(provider = %conn.id(), count = defs.len(), "provider tools listed");
                    tools.extend(
                        defs.into_iter()
                            .map(|def| RemoteTool::descriptor(Arc::downgrade(self), conn.clone(), def)),
                    );
                }
                Err(e) => {
                    tracing::warn!(provider = %conn.id(), error = %e, "skipping provider tool listing");
                    if e.is_connection_fault() {
                        self.drop_connection(&conn).await;
                    }
                }
            }
        }
        tools
    }

    // ─── Table Management ────────────────────────────────────────────────

    /// Ids of connected providers, sorted.
    pub fn connected_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_connections().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_connected(&self, provider_id: &str) -> bool {
        self.read_connections().contains_key(provider_id)
    }

    /// Drop a provider's connection. Returns whether one existed.
    pub async fn disconnect(&self, provider_id: &str) -> bool {
        let removed = self.write_connections().remove(provider_id);
        match removed {
            Some(conn) => {
                conn.close().await;
                tracing::info!(provider = %provider_id, "provider disconnected");
                true
            }
            None => false,
        }
    }

    /// Drop and re-establish a provider's connection.
    ///
    /// Uses the config of the live connection, else the matching default.
    pub async fn reconnect(&self, provider_id: &str) -> bool {
        let config = self
            .read_connections()
            .get(provider_id)
            .map(|c| c.config().clone())
            .or_else(|| self.defaults.iter().find(|c| c.id == provider_id).cloned());

        let Some(config) = config else {
            tracing::warn!(provider = %provider_id, "reconnect requested for unknown provider");
            return false;
        };

        self.disconnect(provider_id).await;
        self.connect_provider(&config).await
    }

    /// Close every connection and re-arm auto-bootstrap.
    pub async fn reset(&self) {
        let drained: Vec<Arc<ProviderConnection>> = {
            let mut pending = lock(&self.pending);
            pending.clear();
            self.write_connections().drain().map(|(_, c)| c).collect()
        };
        *self.bootstrapped.lock().await = false;
        for conn in drained {
            conn.close().await;
        }
        tracing::info!("capability discovery reset");
    }

    /// Remove `conn` from the table if it is still the registered connection.
    pub(crate) async fn drop_connection(&self, conn: &Arc<ProviderConnection>) {
        let removed = {
            let mut connections = self.write_connections();
            let current = connections
                .get(conn.id())
                .is_some_and(|c| Arc::ptr_eq(c, conn));
            if current {
                connections.remove(conn.id())
            } else {
                None
            }
        };
        if let Some(conn) = removed {
            tracing::warn!(provider = %conn.id(), "provider connection lost, disconnected");
            conn.close().await;
        }
    }

    async fn prune_unhealthy(&self) {
        let unhealthy: Vec<Arc<ProviderConnection>> = self
            .read_connections()
            .values()
            .filter(|c| !c.is_healthy())
            .cloned()
            .collect();
        for conn in unhealthy {
            self.drop_connection(&conn).await;
        }
    }

    fn read_connections(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ProviderConnection>>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_connections(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ProviderConnection>>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One connection attempt; shared by every concurrent caller for the same id.
async fn establish(
    connector: Arc<dyn TransportConnector>,
    config: ProviderConfig,
    timeouts: ProviderTimeouts,
) -> Result<Arc<ProviderConnection>, McpError> {
    tracing::debug!(provider = %config.id, endpoint = %config.endpoint, "connecting to provider");
    let started = std::time::Instant::now();

    match ProviderConnection::establish(&config, connector.as_ref(), timeouts).await {
        Ok(conn) => {
            tracing::info!(
                provider = %config.id,
                server = conn.server_info().and_then(|s| s.name.as_deref()).unwrap_or("unknown"),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "provider connected"
            );
            Ok(Arc::new(conn))
        }
        Err(e) => {
            tracing::warn!(provider = %config.id, error = %e, "provider unreachable");
            Err(e)
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
