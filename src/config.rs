//! `companion.yaml` loading.
//!
//! One YAML file configures models, capability providers, graph limits,
//! safety mode, memory location and the default persona. `${VAR}` and
//! `${VAR:-default}` are interpolated over the raw text before parsing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::graph::GraphConfig;
use crate::agent_core::personas::{self, DEFAULT_PERSONA_ID};
use crate::inference::ModelsConfig;
use crate::mcp_client::ProviderConfig;

/// Config file name searched for when `COMPANION_CONFIG` is unset.
pub const CONFIG_FILE_NAME: &str = "companion.yaml";

/// Env var pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "COMPANION_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found: {reason}")]
    NotFound { reason: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CompanionConfig {
    pub models: ModelsConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub safety: SafetySettings,
    #[serde(default)]
    pub memory: MemorySettings,
    #[serde(default = "default_persona")]
    pub default_persona: String,
}

fn default_persona() -> String {
    DEFAULT_PERSONA_ID.to_string()
}

/// Run bounds for the orchestration graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub max_round_trips: usize,
    pub run_timeout_secs: u64,
    pub model_timeout_secs: u64,
    pub tool_timeout_secs: u64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_round_trips: 8,
            run_timeout_secs: 120,
            model_timeout_secs: 60,
            tool_timeout_secs: 30,
        }
    }
}

impl GraphSettings {
    pub fn to_graph_config(&self) -> GraphConfig {
        GraphConfig {
            max_round_trips: self.max_round_trips,
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            model_timeout: Duration::from_secs(self.model_timeout_secs),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    /// Regex classifier.
    #[default]
    Keyword,
    /// Ask the language model for a verdict.
    Model,
    Off,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafetySettings {
    #[serde(default)]
    pub mode: SafetyMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemorySettings {
    /// SQLite file. Defaults to `{data_dir}/memory.db`.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl MemorySettings {
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(expand_tilde(path)),
            None => crate::data_dir().join("memory.db"),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl CompanionConfig {
    /// Load and validate the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse and validate config text.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        let config: Self = serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.models.models.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "no models configured".into(),
            });
        }
        if personas::find(&self.default_persona).is_none() {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "unknown default_persona '{}' (expected one of: {})",
                    self.default_persona,
                    personas::ids().join(", ")
                ),
            });
        }
        let graph = &self.graph;
        for (key, value) in [
            ("max_round_trips", graph.max_round_trips as u64),
            ("run_timeout_secs", graph.run_timeout_secs),
            ("model_timeout_secs", graph.model_timeout_secs),
            ("tool_timeout_secs", graph.tool_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("graph.{key} must be at least 1"),
                });
            }
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("provider at {} has an empty id", provider.endpoint),
                });
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate provider id '{}'", provider.id),
                });
            }
        }
        Ok(())
    }
}

/// Locate the config file.
///
/// `COMPANION_CONFIG` wins when set; otherwise walks upward from `start`
/// looking for `companion.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.is_file() {
            return Ok(candidate);
        }
        return Err(ConfigError::NotFound {
            reason: format!("{CONFIG_ENV_VAR} points at missing file {}", candidate.display()),
        });
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound {
        reason: format!("no {CONFIG_FILE_NAME} in {} or its parents", start.display()),
    })
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "
models:
  active_model: local
  models:
    local:
      display_name: Local
      base_url: http://localhost:11434/v1
";

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = CompanionConfig::from_yaml_str(MINIMAL).unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(config.graph.max_round_trips, 8);
        assert_eq!(config.graph.run_timeout_secs, 120);
        assert_eq!(config.safety.mode, SafetyMode::Keyword);
        assert_eq!(config.default_persona, "sydney");
        assert!(config.memory.resolved_db_path().ends_with("memory.db"));
    }

    #[test]
    fn test_full_config() {
        std::env::set_var("__COMPANION_TEST_TOKEN__", "secret");
        let raw = format!(
            "{MINIMAL}
providers:
  - id: weather
    endpoint: http://localhost:9000/mcp
    headers:
      Authorization: Bearer ${{__COMPANION_TEST_TOKEN__}}
  - id: calendar
    endpoint: ${{__COMPANION_UNSET_VAR__:-http://localhost:9001/mcp}}
graph:
  max_round_trips: 4
  tool_timeout_secs: 5
safety:
  mode: off
memory:
  db_path: /tmp/companion/memory.db
default_persona: luna
"
        );
        let config = CompanionConfig::from_yaml_str(&raw).unwrap();
        std::env::remove_var("__COMPANION_TEST_TOKEN__");

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].headers["Authorization"], "Bearer secret");
        assert_eq!(config.providers[1].endpoint, "http://localhost:9001/mcp");

        let graph = config.graph.to_graph_config();
        assert_eq!(graph.max_round_trips, 4);
        assert_eq!(graph.tool_timeout, Duration::from_secs(5));
        assert_eq!(graph.model_timeout, Duration::from_secs(60));

        assert_eq!(config.safety.mode, SafetyMode::Off);
        assert_eq!(
            config.memory.resolved_db_path(),
            PathBuf::from("/tmp/companion/memory.db")
        );
        assert_eq!(config.default_persona, "luna");
    }

    #[test]
    fn test_unknown_persona_rejected() {
        let raw = format!("{MINIMAL}default_persona: hal\n");
        let err = CompanionConfig::from_yaml_str(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let raw = format!(
            "{MINIMAL}providers:\n  - id: a\n    endpoint: http://x/mcp\n  - id: a\n    endpoint: http://y/mcp\n"
        );
        let err = CompanionConfig::from_yaml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("duplicate provider id"));
    }

    #[test]
    fn test_zero_graph_bounds_rejected() {
        for key in [
            "max_round_trips",
            "run_timeout_secs",
            "model_timeout_secs",
            "tool_timeout_secs",
        ] {
            let raw = format!("{MINIMAL}graph:\n  {key}: 0\n");
            let err = CompanionConfig::from_yaml_str(&raw).unwrap_err();
            assert!(
                err.to_string().contains(&format!("graph.{key} must be at least 1")),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            CompanionConfig::from_yaml_str("models: [").unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn test_interpolation() {
        std::env::remove_var("__COMPANION_NONEXISTENT__");
        assert_eq!(
            interpolate_env_vars("${__COMPANION_NONEXISTENT__:-/fallback}"),
            "/fallback"
        );
        assert_eq!(interpolate_env_vars("${__COMPANION_NONEXISTENT__}"), "");
        assert_eq!(interpolate_env_vars("plain $text"), "plain $text");
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/companion");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/companion"));
    }

    #[test]
    fn test_find_config_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), MINIMAL).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        // Only meaningful when the env override is absent
        if std::env::var(CONFIG_ENV_VAR).is_err() {
            let found = find_config_path(&nested).unwrap();
            assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
            assert!(CompanionConfig::load(&found).is_ok());
        }
    }
}
