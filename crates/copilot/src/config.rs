//! Configuration for the copilot engine.
//!
//! Loads settings from a TOML file or uses defaults. Missing fields fall
//! back individually, so a partial config file is fine.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Generation service (Ollama) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model used for route classification and query drafting.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ollama base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds. On timeout the caller falls back to
    /// its deterministic policy instead of blocking the run.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature. Low by default: drafted SQL should be boring.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Token cap per completion.
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    /// When false, the engine is built with the rule-based policies and
    /// never contacts the generation service.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_timeout() -> u64 {
    90
}

fn default_temperature() -> f32 {
    0.1
}

fn default_num_predict() -> u32 {
    1000
}

fn default_enabled() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
            num_predict: default_num_predict(),
            enabled: default_enabled(),
        }
    }
}

/// Evidence index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Snippets returned per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Relevance floor; 0.0 means no floor.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

fn default_top_k() -> usize {
    3
}

fn default_chunk_size() -> usize {
    500
}

fn default_min_score() -> f64 {
    0.0
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            min_score: default_min_score(),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load config from an optional path, or return defaults.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load_from_path(p).unwrap_or_else(|e| {
                warn!("Config {} not usable, using defaults: {}", p.display(), e);
                Config::default()
            }),
            None => Config::default(),
        }
    }

    /// Load config from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.model, "qwen2.5:7b-instruct");
        assert_eq!(config.llm.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.chunk_size, 500);
        assert!(config.llm.enabled);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
[llm]
model = "phi3.5:3.8b-mini-instruct-q4_K_M"
timeout_secs = 30

[retrieval]
top_k = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.model, "phi3.5:3.8b-mini-instruct-q4_K_M");
        assert_eq!(config.llm.timeout_secs, 30);
        // Defaults for missing fields
        assert_eq!(config.llm.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.min_score, 0.0);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Config::load(Some(Path::new("/nonexistent/copilot.toml")));
        assert_eq!(config.retrieval.top_k, 3);
    }
}
