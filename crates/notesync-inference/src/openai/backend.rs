//! OpenAI-compatible generation backend implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use notesync_core::defaults::{
    GEN_MODEL, GEN_TIMEOUT_SECS, OPENAI_URL, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE,
};
use notesync_core::{Error, GenerationBackend, Result};

use super::error::{to_notesync_error, OpenAIErrorCode};
use super::types::*;

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key (optional for local endpoints).
    pub api_key: Option<String>,
    pub gen_model: String,
    pub timeout_seconds: u64,
    /// Completion token cap sent with every request.
    pub max_tokens: Option<u32>,
    /// Sampling temperature sent with every request.
    pub temperature: Option<f32>,
    /// Skip TLS verification (self-signed certs in local environments).
    pub skip_tls_verify: bool,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_URL.to_string(),
            api_key: None,
            gen_model: GEN_MODEL.to_string(),
            timeout_seconds: GEN_TIMEOUT_SECS,
            max_tokens: Some(SUMMARY_MAX_TOKENS),
            temperature: Some(SUMMARY_TEMPERATURE),
            skip_tls_verify: false,
        }
    }
}

impl OpenAIConfig {
    /// Defaults overridden by `OPENAI_*` and `SUMMARY_*` variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            gen_model: std::env::var("OPENAI_GEN_MODEL").unwrap_or(defaults.gen_model),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            max_tokens: std::env::var("SUMMARY_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(defaults.max_tokens),
            temperature: std::env::var("SUMMARY_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(defaults.temperature),
            skip_tls_verify: std::env::var("OPENAI_SKIP_TLS_VERIFY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// OpenAI-compatible generation backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if config.skip_tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            model = %config.gen_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// POST request to `endpoint` with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let (message, error_type) = match response.json::<OpenAIErrorResponse>().await {
            Ok(body) => (body.error.message, body.error.error_type),
            Err(_) => ("Unknown error".to_string(), "unknown".to_string()),
        };
        let code = OpenAIErrorCode::from_response(status.as_u16(), &error_type);
        warn!(
            subsystem = "inference",
            component = "openai",
            status = status.as_u16(),
            error_code = ?code,
            "Generation request rejected"
        );
        to_notesync_error(code, &format!("OpenAI returned {}: {}", status, message))
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let start = Instant::now();
        debug!(
            component = "openai",
            op = "generate",
            model = %self.config.gen_model,
            prompt_len = prompt.len(),
            "Generating"
        );

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            component = "openai",
            op = "generate",
            response_len = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}
