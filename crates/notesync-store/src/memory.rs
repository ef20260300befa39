//! In-process remote store with a real-time change feed.
//!
//! Notes live in a map behind a `std::sync::RwLock`; every mutation is
//! published on a broadcast feed while the write lock is held, and
//! subscriptions snapshot under the read lock after joining the feed, so no
//! change can fall between a subscription's snapshot and its live tail.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info};
use uuid::Uuid;

use notesync_core::defaults::CHANGE_FEED_CAPACITY;
use notesync_core::{
    new_v7, ChangeStream, Error, NewNote, Note, NoteChange, NoteFilter, NotePatch, RemoteStore,
    Result,
};

use crate::fault::{FaultPlan, StoreOp};

#[derive(Debug, Clone)]
enum FeedItem {
    Change(NoteChange),
    /// Terminates every live subscription with `Unavailable`.
    Break(String),
}

/// In-memory [`RemoteStore`].
///
/// Clones share the same notes and feed.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    inner: Arc<Inner>,
}

struct Inner {
    notes: RwLock<HashMap<Uuid, Note>>,
    feed: broadcast::Sender<FeedItem>,
    faults: FaultPlan,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_capacity(CHANGE_FEED_CAPACITY)
    }

    /// Create a store whose change feed buffers `capacity` changes per
    /// subscriber before the subscriber is dropped as lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                notes: RwLock::new(HashMap::new()),
                feed,
                faults: FaultPlan::default(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Note>> {
        self.inner.notes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Note>> {
        self.inner.notes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, change: NoteChange) {
        let _ = self.inner.feed.send(FeedItem::Change(change));
    }

    /// Current state of a note, bypassing subscriptions.
    pub fn get(&self, id: Uuid) -> Option<Note> {
        self.read().get(&id).cloned()
    }

    /// Number of stored notes across all owners.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.feed.receiver_count()
    }
}

#[cfg(any(test, feature = "mock"))]
use crate::fault::Fault;

#[cfg(any(test, feature = "mock"))]
impl MemoryRemoteStore {
    /// Make every subsequent call of `op` fail with `fault`.
    pub fn inject_fault(&self, op: StoreOp, fault: Fault) {
        self.inner.faults.inject(op, fault);
    }

    pub fn clear_fault(&self, op: StoreOp) {
        self.inner.faults.clear(op);
    }

    /// Hold the next call of `op` until the returned handle is notified.
    pub fn gate(&self, op: StoreOp) -> Arc<tokio::sync::Notify> {
        self.inner.faults.gate(op)
    }

    /// How many times `op` has been invoked.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.inner.faults.calls(op)
    }

    /// Fail every open subscription as if the connection dropped.
    pub fn break_subscriptions(&self, reason: impl Into<String>) {
        let _ = self.inner.feed.send(FeedItem::Break(reason.into()));
    }

    /// Write a note as another client would, bypassing fault injection.
    pub fn insert_external(&self, note: Note) {
        let mut notes = self.write();
        let change = if notes.contains_key(&note.id) {
            NoteChange::Modified(note.clone())
        } else {
            NoteChange::Added(note.clone())
        };
        notes.insert(note.id, note);
        self.publish(change);
    }

    /// Delete a note as another client would, bypassing fault injection.
    pub fn remove_external(&self, id: Uuid) -> Option<Note> {
        let mut notes = self.write();
        let removed = notes.remove(&id);
        if let Some(note) = &removed {
            self.publish(NoteChange::Removed(note.clone()));
        }
        removed
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn subscribe(&self, filter: NoteFilter) -> Result<ChangeStream> {
        self.inner.faults.enter(StoreOp::Subscribe).await?;

        let (rx, snapshot) = {
            let notes = self.read();
            let rx = self.inner.feed.subscribe();
            let snapshot: Vec<NoteChange> = notes
                .values()
                .filter(|note| filter.matches(note))
                .cloned()
                .map(NoteChange::Added)
                .collect();
            (rx, snapshot)
        };

        info!(
            subsystem = "store",
            component = "memory_store",
            op = "subscribe",
            owner_id = %filter.owner_id,
            batch_size = snapshot.len(),
            "Subscription opened"
        );

        let live = BroadcastStream::new(rx).filter_map(move |item| {
            let item = match item {
                Ok(FeedItem::Change(change)) if filter.matches(change.note()) => {
                    Some(Ok(vec![change]))
                }
                Ok(FeedItem::Change(_)) => None,
                Ok(FeedItem::Break(reason)) => Some(Err(Error::Unavailable(reason))),
                Err(BroadcastStreamRecvError::Lagged(n)) => Some(Err(Error::Unavailable(
                    format!("change feed lagged by {} changes", n),
                ))),
            };
            futures::future::ready(item)
        });

        Ok(stream::once(futures::future::ready(Ok(snapshot)))
            .chain(live)
            .boxed())
    }

    async fn create(&self, note: NewNote) -> Result<Uuid> {
        self.inner.faults.enter(StoreOp::Create).await?;

        let now = Utc::now();
        let stored = Note {
            id: new_v7(),
            owner_id: note.owner_id,
            title: note.title,
            body: note.body,
            attachment_location: None,
            summary: None,
            created_at: now,
            updated_at: now,
        };
        let id = stored.id;

        let mut notes = self.write();
        notes.insert(id, stored.clone());
        self.publish(NoteChange::Added(stored));
        drop(notes);

        debug!(component = "memory_store", op = "create", note_id = %id, "Note created");
        Ok(id)
    }

    async fn patch(&self, id: Uuid, patch: NotePatch) -> Result<()> {
        self.inner.faults.enter(StoreOp::Patch).await?;

        let mut notes = self.write();
        let note = notes.get_mut(&id).ok_or(Error::NoteNotFound(id))?;
        // Keep updated_at strictly increasing even within one clock tick
        let now = Utc::now().max(note.updated_at + chrono::Duration::microseconds(1));
        patch.apply_to(note, now);
        let updated = note.clone();
        self.publish(NoteChange::Modified(updated));
        drop(notes);

        debug!(component = "memory_store", op = "patch", note_id = %id, "Note patched");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.inner.faults.enter(StoreOp::Delete).await?;

        let mut notes = self.write();
        match notes.remove(&id) {
            Some(note) => {
                self.publish(NoteChange::Removed(note));
                debug!(component = "memory_store", op = "delete", note_id = %id, "Note deleted");
            }
            None => {
                debug!(component = "memory_store", op = "delete", note_id = %id, "Delete of absent note ignored");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_note(owner: &str, title: &str) -> NewNote {
        NewNote {
            owner_id: owner.to_string(),
            title: title.to_string(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_delivers_snapshot_first() {
        let store = MemoryRemoteStore::new();
        let a = store.create(new_note("alice", "a")).await.unwrap();
        store.create(new_note("bob", "b")).await.unwrap();

        let mut feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        let snapshot = feed.next().await.unwrap().unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0], NoteChange::Added(store.get(a).unwrap()));
    }

    #[tokio::test]
    async fn test_live_changes_filtered_by_owner() {
        let store = MemoryRemoteStore::new();
        let mut feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        store.create(new_note("bob", "not mine")).await.unwrap();
        let id = store.create(new_note("alice", "mine")).await.unwrap();

        let batch = feed.next().await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].note().id, id);
        assert_eq!(batch[0].kind(), notesync_core::ChangeKind::Added);
    }

    #[tokio::test]
    async fn test_patch_emits_modified_and_bumps_updated_at() {
        let store = MemoryRemoteStore::new();
        let id = store.create(new_note("alice", "t")).await.unwrap();
        let before = store.get(id).unwrap();

        let mut feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        feed.next().await.unwrap().unwrap();

        store.patch(id, NotePatch::summary("short")).await.unwrap();

        let batch = feed.next().await.unwrap().unwrap();
        let NoteChange::Modified(after) = &batch[0] else {
            panic!("expected Modified, got {:?}", batch[0]);
        };
        assert_eq!(after.summary.as_deref(), Some("short"));
        assert_eq!(after.title, before.title);
        assert!(after.updated_at > before.updated_at);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_patch_missing_note() {
        let store = MemoryRemoteStore::new();
        let missing = Uuid::now_v7();
        let err = store.patch(missing, NotePatch::text("a", "b")).await.unwrap_err();
        assert!(matches!(err, Error::NoteNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_delete_emits_removed_and_is_idempotent() {
        let store = MemoryRemoteStore::new();
        let id = store.create(new_note("alice", "t")).await.unwrap();
        let mut feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        feed.next().await.unwrap().unwrap();

        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();

        let batch = feed.next().await.unwrap().unwrap();
        assert_eq!(batch[0].kind(), notesync_core::ChangeKind::Removed);
        assert!(store.get(id).is_none());
    }

    #[tokio::test]
    async fn test_break_subscriptions_ends_with_unavailable() {
        let store = MemoryRemoteStore::new();
        let mut feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        feed.next().await.unwrap().unwrap();

        store.break_subscriptions("network lost");
        let err = feed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Unavailable(msg) if msg == "network lost"));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_unavailable() {
        let store = MemoryRemoteStore::with_capacity(2);
        let mut feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        feed.next().await.unwrap().unwrap();

        for i in 0..5 {
            store.create(new_note("alice", &i.to_string())).await.unwrap();
        }
        let err = feed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_injected_subscribe_fault() {
        let store = MemoryRemoteStore::new();
        store.inject_fault(StoreOp::Subscribe, Fault::PermissionDenied);
        assert!(matches!(
            store.subscribe(NoteFilter::owner("alice")).await,
            Err(Error::PermissionDenied(_))
        ));
        assert_eq!(store.calls(StoreOp::Subscribe), 1);
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let store = MemoryRemoteStore::new();
        let feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(feed);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_external_writes_publish() {
        let store = MemoryRemoteStore::new();
        let mut feed = store.subscribe(NoteFilter::owner("alice")).await.unwrap();
        feed.next().await.unwrap().unwrap();

        let now = Utc::now();
        let note = Note {
            id: new_v7(),
            owner_id: "alice".into(),
            title: "elsewhere".into(),
            body: String::new(),
            attachment_location: None,
            summary: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_external(note.clone());
        store.remove_external(note.id);

        assert_eq!(feed.next().await.unwrap().unwrap()[0].kind(), notesync_core::ChangeKind::Added);
        assert_eq!(feed.next().await.unwrap().unwrap()[0].kind(), notesync_core::ChangeKind::Removed);
    }
}
