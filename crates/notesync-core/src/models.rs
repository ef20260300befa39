//! Data model shared by the adapters, the synchronizer and the lifecycle
//! controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// IDENTITY
// =============================================================================

/// Federated identity providers offered at sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Google,
    GitHub,
}

impl AuthProvider {
    /// Identifier the identity provider reports for accounts linked this way.
    pub fn provider_id(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google.com",
            AuthProvider::GitHub => "github.com",
        }
    }

    /// Human-readable provider name.
    pub fn label(&self) -> &'static str {
        match self {
            AuthProvider::Google => "Google",
            AuthProvider::GitHub => "GitHub",
        }
    }
}

/// Map a provider identifier to its friendly name.
///
/// Known identifiers are normalized; anything else is returned verbatim.
pub fn provider_label(provider_id: &str) -> &str {
    match provider_id {
        "google.com" => AuthProvider::Google.label(),
        "github.com" => AuthProvider::GitHub.label(),
        other => other,
    }
}

/// The authenticated identity currently using the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable unique identifier assigned by the identity provider.
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Identifier of the first linked provider (e.g. `google.com`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
            provider_id: None,
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Friendly name of the provider this principal signed in with.
    pub fn provider_label(&self) -> Option<&str> {
        self.provider_id.as_deref().map(provider_label)
    }
}

// =============================================================================
// NOTES
// =============================================================================

/// A persisted note as observed through the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub attachment_location: Option<String>,
    /// Written only by the enrichment service.
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Text the enrichment service would summarize for this note.
    pub fn summary_input(&self) -> String {
        summary_input(&self.title, &self.body)
    }
}

/// Combine a title and body into the text sent for summarization.
///
/// The title is followed by a blank line when present; the result is trimmed,
/// so an all-whitespace note yields an empty string.
pub fn summary_input(title: &str, body: &str) -> String {
    let mut text = String::with_capacity(title.len() + body.len() + 2);
    if !title.is_empty() {
        text.push_str(title);
        text.push_str("\n\n");
    }
    text.push_str(body);
    text.trim().to_string()
}

/// Fields for creating a note. Attachment and summary always start absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub owner_id: String,
    pub title: String,
    pub body: String,
}

/// Field mask for a partial update. `None` leaves a field untouched.
///
/// Each writer has its own constructor: the lifecycle controller only ever
/// builds [`NotePatch::text`] and [`NotePatch::attachment`], the enrichment
/// service only [`NotePatch::summary`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl NotePatch {
    /// Author edit of the two text fields.
    pub fn text(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Point the note at a freshly uploaded attachment.
    pub fn attachment(location: impl Into<String>) -> Self {
        Self {
            attachment_location: Some(location.into()),
            ..Default::default()
        }
    }

    /// Enrichment write-back.
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.attachment_location.is_none()
            && self.summary.is_none()
    }

    /// Apply the mask to a note and stamp `updated_at`.
    pub fn apply_to(&self, note: &mut Note, updated_at: DateTime<Utc>) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(body) = &self.body {
            note.body = body.clone();
        }
        if let Some(location) = &self.attachment_location {
            note.attachment_location = Some(location.clone());
        }
        if let Some(summary) = &self.summary {
            note.summary = Some(summary.clone());
        }
        note.updated_at = updated_at;
    }
}

// =============================================================================
// CHANGE FEED
// =============================================================================

/// Subscription filter. Owner is the only supported key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteFilter {
    pub owner_id: String,
}

impl NoteFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        note.owner_id == self.owner_id
    }
}

/// Kind of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// A single document change delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "note", rename_all = "snake_case")]
pub enum NoteChange {
    Added(Note),
    Modified(Note),
    Removed(Note),
}

impl NoteChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            NoteChange::Added(_) => ChangeKind::Added,
            NoteChange::Modified(_) => ChangeKind::Modified,
            NoteChange::Removed(_) => ChangeKind::Removed,
        }
    }

    pub fn note(&self) -> &Note {
        match self {
            NoteChange::Added(note) | NoteChange::Modified(note) | NoteChange::Removed(note) => {
                note
            }
        }
    }

    pub fn into_note(self) -> Note {
        match self {
            NoteChange::Added(note) | NoteChange::Modified(note) | NoteChange::Removed(note) => {
                note
            }
        }
    }
}
