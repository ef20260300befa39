//! HTTP client for the enrichment service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use notesync_core::defaults::{ENRICHMENT_TIMEOUT_SECS, ENRICHMENT_URL};
use notesync_core::{EnrichmentRequest, EnrichmentTrigger, Error, Result};

/// Where and how long to wait for the enrichment service.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Full URL of the summary endpoint.
    pub url: String,
    pub timeout_seconds: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            url: ENRICHMENT_URL.to_string(),
            timeout_seconds: ENRICHMENT_TIMEOUT_SECS,
        }
    }
}

impl EnrichmentConfig {
    /// Defaults overridden by `ENRICHMENT_URL` and `ENRICHMENT_TIMEOUT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("ENRICHMENT_URL").unwrap_or(defaults.url),
            timeout_seconds: std::env::var("ENRICHMENT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Posts `{noteId, title, content}` to the enrichment service.
///
/// The response body is ignored on success; the summary reaches the client
/// through its note subscription.
pub struct HttpEnrichmentClient {
    client: Client,
    config: EnrichmentConfig,
}

impl HttpEnrichmentClient {
    pub fn new(config: EnrichmentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EnrichmentConfig::from_env())
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }
}

#[async_trait]
impl EnrichmentTrigger for HttpEnrichmentClient {
    async fn request_summary(&self, request: EnrichmentRequest) -> Result<()> {
        let start = Instant::now();
        let note_id = request.note_id.clone().unwrap_or_default();

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Enrichment request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => "no error message".to_string(),
            };
            warn!(
                subsystem = "client",
                component = "enrichment",
                note_id = %note_id,
                status = status.as_u16(),
                error = %message,
                "Enrichment service rejected request"
            );
            return Err(Error::Request(format!(
                "Enrichment service returned {}: {}",
                status, message
            )));
        }

        debug!(
            component = "enrichment",
            op = "request_summary",
            note_id = %note_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Summary requested"
        );
        Ok(())
    }
}
