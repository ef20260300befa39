//! Client event types, envelope and event bus.
//!
//! Everything the engine reports to the presentation layer flows through one
//! broadcast channel: session transitions, subscription health, save results,
//! reconciliation notices and user-facing errors. Consumers subscribe
//! independently and may lag; lagged receivers lose the oldest envelopes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned envelope around a [`ClientEvent`].
///
/// `event_type` is the dot-namespaced name of the payload (e.g.
/// `"note.saved"`, `"subscription.error"`).
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// Id of the note this event concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Payload schema version.
    pub payload_version: u32,
    pub payload: ClientEvent,
}

impl EventEnvelope {
    pub fn new(event: ClientEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.event_type().to_string(),
            occurred_at: Utc::now(),
            entity_id: event.note_id().map(|id| id.to_string()),
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Client Event (domain payloads)
// ============================================================================

/// Informational outcomes that are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The note being edited was deleted elsewhere; the draft was discarded.
    EditTargetDeleted { note_id: Uuid },
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::EditTargetDeleted { .. } => {
                "The note you were editing was deleted elsewhere. Your draft was discarded."
            }
        }
    }
}

/// Event reported by the client engine.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"NoteSaved","note_id":"...","created":true,"has_attachment":false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Identity changed. `uid` is absent after sign-out.
    SessionChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        uid: Option<String>,
    },
    SubscriptionOpened { owner_id: String, generation: u64 },
    SubscriptionClosed { owner_id: String, generation: u64 },
    /// The live feed failed; the last-known collection is retained.
    SubscriptionError {
        owner_id: String,
        generation: u64,
        error: String,
    },
    NoteSaved {
        note_id: Uuid,
        created: bool,
        has_attachment: bool,
    },
    NoteDeleted { note_id: Uuid },
    Notice { notice: Notice },
    /// A user-facing failure with generic wording; the cause is logged.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note_id: Option<Uuid>,
    },
}

impl ClientEvent {
    /// Dot-namespaced event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionChanged { .. } => "session.changed",
            ClientEvent::SubscriptionOpened { .. } => "subscription.opened",
            ClientEvent::SubscriptionClosed { .. } => "subscription.closed",
            ClientEvent::SubscriptionError { .. } => "subscription.error",
            ClientEvent::NoteSaved { .. } => "note.saved",
            ClientEvent::NoteDeleted { .. } => "note.deleted",
            ClientEvent::Notice { .. } => "notice",
            ClientEvent::Error { .. } => "error",
        }
    }

    pub fn note_id(&self) -> Option<Uuid> {
        match self {
            ClientEvent::NoteSaved { note_id, .. } | ClientEvent::NoteDeleted { note_id } => {
                Some(*note_id)
            }
            ClientEvent::Notice {
                notice: Notice::EditTargetDeleted { note_id },
            } => Some(*note_id),
            ClientEvent::Error { note_id, .. } => *note_id,
            _ => None,
        }
    }

    pub fn error(message: impl Into<String>, note_id: Option<Uuid>) -> Self {
        ClientEvent::Error {
            message: message.into(),
            note_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel for [`ClientEvent`]s.
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Wrap and broadcast an event. Dropped silently without subscribers.
    pub fn emit(&self, event: ClientEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================
