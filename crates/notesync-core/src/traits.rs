//! Adapter traits at the engine's boundaries.
//!
//! The client engine talks to the outside world only through these traits,
//! so every collaborator can be swapped for an in-memory or mock
//! implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REMOTE STORE
// =============================================================================

/// Changes delivered together by one subscription callback.
pub type ChangeBatch = Vec<NoteChange>;

/// Live feed of change batches.
///
/// The first item is the initial snapshot (every matching note as
/// [`NoteChange::Added`]). An `Err` item ends the subscription; dropping the
/// stream unsubscribes.
pub type ChangeStream = BoxStream<'static, Result<ChangeBatch>>;

/// Multi-writer document store holding notes.
///
/// None of the operations retry internally.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Open a live subscription to notes matching `filter`.
    async fn subscribe(&self, filter: NoteFilter) -> Result<ChangeStream>;

    /// Create a note and return its store-assigned id.
    async fn create(&self, note: NewNote) -> Result<Uuid>;

    /// Apply a field mask to an existing note and bump `updated_at`.
    ///
    /// Fails with [`crate::Error::NoteNotFound`] if the note does not exist.
    async fn patch(&self, id: Uuid, patch: NotePatch) -> Result<()>;

    /// Delete a note.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// BLOB STORE
// =============================================================================

/// Object storage for attachment bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` at `path`, replacing any existing object.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Resolve a stable, externally fetchable location for `path`.
    async fn resolve_location(&self, path: &str) -> Result<String>;
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Federated identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Principal already signed in when the process starts, if any.
    async fn current_principal(&self) -> Result<Option<Principal>>;

    /// Interactive sign-in with one of the federated providers.
    async fn sign_in(&self, provider: AuthProvider) -> Result<Principal>;

    async fn sign_out(&self) -> Result<()>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Body of a summary request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentRequest {
    #[serde(default)]
    pub note_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

/// `null` and a missing field both read as empty text.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl EnrichmentRequest {
    pub fn new(note_id: Uuid, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            note_id: Some(note_id.to_string()),
            title: title.into(),
            content: content.into(),
        }
    }

    /// Trimmed text to summarize; empty when there is nothing to say.
    pub fn text(&self) -> String {
        summary_input(&self.title, &self.content)
    }
}

/// Successful summary response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    pub summary: String,
}

/// Client-side hook that asks the enrichment service to summarize a note.
///
/// Delivery is at-most-once; the resulting summary arrives through the note
/// subscription, never through this call's caller.
#[async_trait]
pub trait EnrichmentTrigger: Send + Sync {
    async fn request_summary(&self, request: EnrichmentRequest) -> Result<()>;
}
