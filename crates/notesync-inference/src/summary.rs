//! Note summarization on top of any [`GenerationBackend`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use notesync_core::defaults::SUMMARY_SYSTEM_PROMPT;
use notesync_core::{Error, GenerationBackend, Result};

/// Produces a short summary of a note's text.
#[derive(Clone)]
pub struct Summarizer {
    backend: Arc<dyn GenerationBackend>,
    system_prompt: String,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Summarize `text`.
    ///
    /// Empty input is rejected before any backend call. A blank completion is
    /// an [`Error::Inference`]; the summary is never empty on success.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("no text to summarize".to_string()));
        }

        let start = Instant::now();
        let raw = self
            .backend
            .generate_with_system(&self.system_prompt, text)
            .await?;
        let summary = raw.trim();

        if summary.is_empty() {
            warn!(
                subsystem = "inference",
                component = "summarizer",
                model = %self.backend.model_name(),
                prompt_len = text.len(),
                "Backend returned an empty summary"
            );
            return Err(Error::Inference("empty summary generated".to_string()));
        }

        debug!(
            component = "summarizer",
            op = "summarize",
            prompt_len = text.len(),
            response_len = summary.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Summary generated"
        );
        Ok(summary.to_string())
    }
}
