//! Model configuration.
//!
//! The `models` section of `companion.yaml`. Holds model endpoints, sampling
//! defaults, and the fallback chain walked by the inference client.

use std::collections::HashMap;

use serde::Deserialize;

use super::errors::InferenceError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// A single model's runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub display_name: String,
    pub base_url: String,
    /// Name sent in the request body. Defaults to the model key.
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Bearer token for hosted endpoints. Usually `${SOME_API_KEY}`.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

/// Top-level model registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub active_model: String,
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

/// Resolve the active model configuration, respecting the fallback chain.
///
/// Returns `(model_key, ModelConfig)` for the first model present in the
/// config. Connectivity is checked at request time by the client.
pub fn resolve_active_model(config: &ModelsConfig) -> Result<(String, ModelConfig), InferenceError> {
    if let Some(model) = config.models.get(&config.active_model) {
        return Ok((config.active_model.clone(), model.clone()));
    }

    for key in &config.fallback_chain {
        if let Some(model) = config.models.get(key) {
            return Ok((key.clone(), model.clone()));
        }
    }

    Err(InferenceError::ConfigError {
        reason: format!(
            "active model '{}' not found in config and no fallback available",
            config.active_model
        ),
    })
}

/// The ordered list of model keys to try: active model first, then the
/// fallback chain, skipping duplicates and keys with no config entry.
pub fn attempt_order(config: &ModelsConfig) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let candidates = std::iter::once(&config.active_model).chain(config.fallback_chain.iter());
    for key in candidates {
        if config.models.contains_key(key) && !order.contains(key) {
            order.push(key.clone());
        }
    }
    order
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn model(url: &str) -> ModelConfig {
        ModelConfig {
            display_name: "Test".into(),
            base_url: url.into(),
            model_name: None,
            temperature: 0.7,
            max_tokens: 256,
            api_key: None,
        }
    }

    #[test]
    fn test_resolve_active_model_not_found() {
        let config = ModelsConfig {
            active_model: "nonexistent".into(),
            models: HashMap::new(),
            fallback_chain: vec![],
        };
        assert!(resolve_active_model(&config).is_err());
    }

    #[test]
    fn test_resolve_walks_fallback_chain() {
        let mut models = HashMap::new();
        models.insert("backup".to_string(), model("http://backup"));
        let config = ModelsConfig {
            active_model: "missing".into(),
            models,
            fallback_chain: vec!["also-missing".into(), "backup".into()],
        };
        let (key, cfg) = resolve_active_model(&config).unwrap();
        assert_eq!(key, "backup");
        assert_eq!(cfg.base_url, "http://backup");
    }

    #[test]
    fn test_attempt_order_dedupes_and_skips_unknown() {
        let mut models = HashMap::new();
        models.insert("a".to_string(), model("http://a"));
        models.insert("b".to_string(), model("http://b"));
        let config = ModelsConfig {
            active_model: "a".into(),
            models,
            fallback_chain: vec!["a".into(), "ghost".into(), "b".into()],
        };
        assert_eq!(attempt_order(&config), vec!["a", "b"]);
    }

    #[test]
    fn test_sampling_defaults() {
        let yaml = r#"
            active_model: test
            models:
              test:
                display_name: "Test Model"
                base_url: "http://localhost:11434/v1"
        "#;
        let config: ModelsConfig = serde_yaml::from_str(yaml).unwrap();
        let model = config.models.get("test").unwrap();
        assert_eq!(model.max_tokens, 1024);
        assert!((model.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.fallback_chain.is_empty());
    }
}
