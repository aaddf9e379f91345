pub mod agent_core;
pub mod config;
pub mod inference;
pub mod mcp_client;
pub mod tools;

use std::sync::Arc;

use agent_core::{
    AgentError, KeywordSafetyClassifier, MemoryStore, ModelSafetyClassifier, OrchestrationGraph,
    SafetyClassifier, Session, SqliteMemoryStore, TurnRunner,
};
use config::{CompanionConfig, SafetyMode};
use inference::{InferenceClient, LanguageModel};
use mcp_client::CapabilityDiscovery;
use tools::{ToolAggregator, ToolRegistry};

/// Return the platform-standard data directory for the companion.
///
/// - macOS: `~/Library/Application Support/companion/`
/// - Windows: `{FOLDERID_RoamingAppData}\companion\`
/// - Linux: `$XDG_DATA_HOME/companion/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.companion/` only if none of the above can be resolved.
pub fn data_dir() -> std::path::PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("companion");
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".companion")
}

// ─── Assembly ────────────────────────────────────────────────────────────────

/// Everything a front end needs to hold conversations: the shared turn
/// runner, the memory store and the provider discovery behind the tools.
pub struct Companion {
    runner: Arc<TurnRunner>,
    store: Arc<dyn MemoryStore>,
    discovery: Option<Arc<CapabilityDiscovery>>,
    default_persona: String,
}

impl Companion {
    /// Wire up model, tools, safety and memory from a loaded config.
    ///
    /// Providers are not contacted here; they connect lazily on the first
    /// tool aggregation.
    pub fn from_config(config: &CompanionConfig) -> Result<Self, AgentError> {
        let model: Arc<dyn LanguageModel> =
            Arc::new(InferenceClient::from_config(config.models.clone())?);

        let discovery = if config.providers.is_empty() {
            None
        } else {
            Some(Arc::new(CapabilityDiscovery::http(config.providers.clone())))
        };
        let aggregator =
            ToolAggregator::new(Arc::new(ToolRegistry::with_defaults()), discovery.clone());

        let graph =
            OrchestrationGraph::new(model.clone(), aggregator, config.graph.to_graph_config());
        let mut runner = TurnRunner::new(graph);

        let classifier: Option<Arc<dyn SafetyClassifier>> = match config.safety.mode {
            SafetyMode::Keyword => Some(Arc::new(KeywordSafetyClassifier::new().map_err(|e| {
                AgentError::Config {
                    reason: e.to_string(),
                }
            })?)),
            SafetyMode::Model => Some(Arc::new(ModelSafetyClassifier::new(model))),
            SafetyMode::Off => None,
        };
        if let Some(classifier) = classifier {
            runner = runner.with_safety(classifier);
        }

        let db_path = config.memory.resolved_db_path();
        let store = SqliteMemoryStore::open(&db_path.to_string_lossy())?;
        tracing::info!(
            db_path = %db_path.display(),
            providers = config.providers.len(),
            safety = ?config.safety.mode,
            "companion assembled"
        );

        Ok(Self {
            runner: Arc::new(runner),
            store: Arc::new(store),
            discovery,
            default_persona: config.default_persona.clone(),
        })
    }

    /// Assemble from parts. Used by embedders with their own model or store.
    pub fn from_parts(
        runner: Arc<TurnRunner>,
        store: Arc<dyn MemoryStore>,
        discovery: Option<Arc<CapabilityDiscovery>>,
        default_persona: &str,
    ) -> Self {
        Self {
            runner,
            store,
            discovery,
            default_persona: default_persona.to_string(),
        }
    }

    pub fn runner(&self) -> &Arc<TurnRunner> {
        &self.runner
    }

    pub fn discovery(&self) -> Option<&Arc<CapabilityDiscovery>> {
        self.discovery.as_ref()
    }

    /// Open a session for `user_id`, using the default persona when none is given.
    pub async fn start_session(
        &self,
        user_id: &str,
        persona_id: Option<&str>,
    ) -> Result<Session, AgentError> {
        let persona = persona_id.unwrap_or(&self.default_persona);
        Session::start(self.runner.clone(), self.store.clone(), user_id, persona).await
    }

    /// Close every provider connection.
    pub async fn shutdown(&self) {
        if let Some(discovery) = &self.discovery {
            discovery.reset().await;
        }
    }
}

// ─── Logging ─────────────────────────────────────────────────────────────────

const LOG_FILE_NAME: &str = "companion.log";
const DEFAULT_FILTER: &str = "companion_core=info,warn";

/// Initialize the tracing subscriber, writing plain-text logs to the data directory.
///
/// On each startup:
/// 1. Rotates existing logs (companion.log → .1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh companion.log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the log path for discoverability.
///
/// Returns the log file path.
pub fn init_tracing() -> std::io::Result<std::path::PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== companion starting ==="
    );
    Ok(log_path)
}

/// JSON logs on stderr, for running under a supervisor that collects them.
pub fn init_tracing_json() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_current_span(false)
        .init();
}

/// Rotate log files: `companion.log` → `companion.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &std::path::Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that flushes the log file after every write, so lines survive a crash.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
