//! Generation service client.
//!
//! The service is a black-box text completion call. Production uses
//! `OllamaClient` against a local Ollama server; tests use the scripted
//! fakes, which keep the orchestrator exercisable without a network.

use crate::config::LlmConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Text completion seam. All output is untrusted and must be cleaned and
/// validated by the caller before use.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Ollama-backed generator.
pub struct OllamaClient {
    http_client: reqwest::Client,
    model: String,
    base_url: String,
    temperature: f32,
    num_predict: u32,
}

impl OllamaClient {
    pub fn new(cfg: &LlmConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .unwrap_or_default(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.clone(),
            temperature: cfg.temperature,
            num_predict: cfg.num_predict,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.num_predict,
            }
        });

        info!("[>]  LLM CALL [{}] ({} chars)", self.model, prompt.len());
        debug!("prompt: {}", prompt.chars().take(500).collect::<String>());

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama returned error {}: {}", status, error_text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        info!("[<]  LLM RESPONSE ({} chars)", text.len());
        Ok(text)
    }
}

/// Fake generator returning pre-configured responses in order. Errors once
/// the script runs out.
pub struct ScriptedGenerator {
    responses: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: std::sync::Mutex::new(
                responses.into_iter().map(String::from).collect(),
            ),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let mut guard = self
            .responses
            .lock()
            .map_err(|_| anyhow!("scripted generator poisoned"))?;
        guard
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator exhausted"))
    }
}

/// Fake generator that always fails, for exercising fallback paths.
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("generation service unavailable"))
    }
}
