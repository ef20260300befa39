//! Mock generation backend for deterministic testing.
//!
//! ```rust,ignore
//! use notesync_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new().with_fixed_response("A short summary.");
//! let out = backend.generate("anything").await.unwrap();
//! assert_eq!(out, "A short summary.");
//! assert_eq!(backend.generate_call_count(), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use notesync_core::{Error, GenerationBackend, Result};

/// Mock generation backend.
///
/// Clones share the call log.
#[derive(Clone)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    model: String,
    fixed_responses: HashMap<String, String>,
    default_response: String,
    failure: Option<String>,
}

/// One recorded generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub system: String,
    pub prompt: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            model: "mock-gen".to_string(),
            fixed_responses: HashMap::new(),
            default_response: "Mock summary.".to_string(),
            failure: None,
        }
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Response returned for any prompt without a mapping.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Response returned for one exact prompt.
    pub fn with_response_mapping(
        mut self,
        prompt: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_responses
            .insert(prompt.into(), output.into());
        self
    }

    /// Fail every call with [`Error::Inference`].
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failure = Some(message.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    pub fn generate_call_count(&self) -> usize {
        self.log().len()
    }

    pub fn clear_calls(&self) {
        self.log().clear()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.log().push(MockCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
        });

        if let Some(message) = &self.config.failure {
            return Err(Error::Inference(message.clone()));
        }

        Ok(self
            .config
            .fixed_responses
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| self.config.default_response.clone()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
