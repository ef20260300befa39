//! Note synchronization: keeps the local collection equal to the remote
//! notes owned by the current principal.
//!
//! At most one subscription is open at a time. Each subscription gets a
//! generation number and its pump applies batches only while the collection
//! still carries that generation, so a pump that is being torn down can never
//! write into a newer collection. Dropping a [`SubscriptionHandle`] aborts its
//! pump, which drops the remote change stream and unsubscribes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use notesync_core::{
    ChangeStream, ClientEvent, EventBus, Note, NoteChange, NoteFilter, Principal, RemoteStore,
    Result,
};

// =============================================================================
// COLLECTION
// =============================================================================

/// The locally known notes of one principal, keyed by id.
///
/// Unordered; use [`NoteCollection::sorted_by_created_at`] for display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteCollection {
    generation: u64,
    owner_id: Option<String>,
    synced: bool,
    notes: HashMap<Uuid, Note>,
}

impl NoteCollection {
    /// Empty collection for `owner_id` at `generation`.
    pub fn new(generation: u64, owner_id: Option<String>) -> Self {
        Self {
            generation,
            owner_id,
            synced: false,
            notes: HashMap::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    /// Whether the subscription's initial snapshot has been applied.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn get(&self, id: &Uuid) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.notes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    /// Newest first; ties broken by id.
    pub fn sorted_by_created_at(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self.notes.values().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        notes
    }

    /// Apply changes in order. Added and modified notes are upserted by id,
    /// removed notes are dropped. Changes for another owner are skipped.
    ///
    /// Returns the number of changes applied.
    pub fn apply(&mut self, batch: &[NoteChange]) -> usize {
        let mut applied = 0;
        for change in batch {
            let note = change.note();
            if let Some(owner) = &self.owner_id {
                if &note.owner_id != owner {
                    warn!(
                        component = "sync",
                        note_id = %note.id,
                        owner_id = %note.owner_id,
                        "Dropping change for foreign owner"
                    );
                    continue;
                }
            }
            trace!(component = "sync", note_id = %note.id, kind = change.kind().as_str(), "Apply change");
            match change {
                NoteChange::Added(note) | NoteChange::Modified(note) => {
                    self.notes.insert(note.id, note.clone());
                }
                NoteChange::Removed(note) => {
                    self.notes.remove(&note.id);
                }
            }
            applied += 1;
        }
        applied
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Owns the pump task of one open subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    generation: u64,
    owner_id: String,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// False once the feed ended or failed.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Default)]
struct SyncState {
    generation: u64,
    principal: Option<Principal>,
    subscription: Option<SubscriptionHandle>,
}

// =============================================================================
// SYNCHRONIZER
// =============================================================================

/// Maintains the live [`NoteCollection`] for the current principal.
pub struct NoteSynchronizer {
    store: Arc<dyn RemoteStore>,
    events: EventBus,
    collection: Arc<watch::Sender<NoteCollection>>,
    state: Mutex<SyncState>,
}

impl NoteSynchronizer {
    pub fn new(store: Arc<dyn RemoteStore>, events: EventBus) -> Self {
        let (collection, _) = watch::channel(NoteCollection::default());
        Self {
            store,
            events,
            collection: Arc::new(collection),
            state: Mutex::new(SyncState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver for the live collection.
    pub fn collection(&self) -> watch::Receiver<NoteCollection> {
        self.collection.subscribe()
    }

    /// Copy of the current collection.
    pub fn snapshot(&self) -> NoteCollection {
        self.collection.borrow().clone()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.collection.borrow().contains(id)
    }

    pub fn is_synced(&self) -> bool {
        self.collection.borrow().is_synced()
    }

    pub fn get(&self, id: &Uuid) -> Option<Note> {
        self.collection.borrow().get(id).cloned()
    }

    /// Whether a subscription is open and its feed still live.
    pub fn is_subscribed(&self) -> bool {
        self.lock()
            .subscription
            .as_ref()
            .is_some_and(SubscriptionHandle::is_active)
    }

    /// Point the collection at `principal`.
    ///
    /// Any previous subscription is torn down and the collection cleared
    /// before a new subscription filtered by the principal's uid is opened.
    /// `None` only tears down. A failure to open is reported and returned;
    /// the collection stays empty until [`NoteSynchronizer::resubscribe`].
    pub async fn set_principal(&self, principal: Option<&Principal>) -> Result<()> {
        let owner_id = principal.map(|p| p.uid.clone());

        let (generation, previous) = {
            let mut state = self.lock();
            state.generation += 1;
            state.principal = principal.cloned();
            let previous = state.subscription.take();
            self.collection
                .send_replace(NoteCollection::new(state.generation, owner_id.clone()));
            (state.generation, previous)
        };

        if let Some(previous) = previous {
            info!(
                subsystem = "client",
                component = "sync",
                op = "unsubscribe",
                owner_id = %previous.owner_id,
                generation = previous.generation,
                "Subscription closed"
            );
            self.events.emit(ClientEvent::SubscriptionClosed {
                owner_id: previous.owner_id.clone(),
                generation: previous.generation,
            });
            drop(previous);
        }

        let Some(owner_id) = owner_id else {
            return Ok(());
        };

        let stream = match self.store.subscribe(NoteFilter::owner(&owner_id)).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    subsystem = "client",
                    component = "sync",
                    op = "subscribe",
                    owner_id = %owner_id,
                    generation,
                    error = %e,
                    "Failed to open subscription"
                );
                self.events.emit(ClientEvent::SubscriptionError {
                    owner_id,
                    generation,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut state = self.lock();
        if state.generation != generation {
            // Superseded while subscribing; dropping the stream unsubscribes
            debug!(component = "sync", generation, "Discarding superseded subscription");
            return Ok(());
        }

        let task = tokio::spawn(pump(
            stream,
            generation,
            owner_id.clone(),
            Arc::clone(&self.collection),
            self.events.clone(),
        ));
        state.subscription = Some(SubscriptionHandle {
            generation,
            owner_id: owner_id.clone(),
            task,
        });
        drop(state);

        info!(
            subsystem = "client",
            component = "sync",
            op = "subscribe",
            owner_id = %owner_id,
            generation,
            "Subscription opened"
        );
        self.events.emit(ClientEvent::SubscriptionOpened {
            owner_id,
            generation,
        });
        Ok(())
    }

    /// Re-open the subscription for the current principal.
    pub async fn resubscribe(&self) -> Result<()> {
        let principal = self.lock().principal.clone();
        self.set_principal(principal.as_ref()).await
    }
}

/// Apply batches from `stream` until it ends, fails, or the collection moves
/// to another generation.
async fn pump(
    mut stream: ChangeStream,
    generation: u64,
    owner_id: String,
    collection: Arc<watch::Sender<NoteCollection>>,
    events: EventBus,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(batch) => {
                let mut stale = false;
                collection.send_if_modified(|current| {
                    if current.generation != generation {
                        stale = true;
                        return false;
                    }
                    let first = !current.synced;
                    current.synced = true;
                    let applied = current.apply(&batch);
                    first || applied > 0
                });
                if stale {
                    debug!(component = "sync", generation, "Pump superseded");
                    return;
                }
                debug!(
                    component = "sync",
                    generation,
                    batch_size = batch.len(),
                    collection_size = collection.borrow().len(),
                    "Applied change batch"
                );
            }
            Err(e) => {
                warn!(
                    subsystem = "client",
                    component = "sync",
                    owner_id = %owner_id,
                    generation,
                    transient = e.is_transient(),
                    error = %e,
                    "Subscription failed; keeping last-known notes"
                );
                if collection.borrow().generation == generation {
                    events.emit(ClientEvent::SubscriptionError {
                        owner_id,
                        generation,
                        error: e.to_string(),
                    });
                }
                return;
            }
        }
    }

    info!(component = "sync", owner_id = %owner_id, generation, "Change feed ended");
    if collection.borrow().generation == generation {
        events.emit(ClientEvent::SubscriptionClosed {
            owner_id,
            generation,
        });
    }
}
