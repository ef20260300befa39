//! Shared fixtures for the client integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use notesync_client::{AppContext, AppDependencies};
use notesync_core::{
    AuthProvider, EnrichmentRequest, EnrichmentTrigger, Error, EventBus, EventEnvelope,
    IdentityProvider, Principal, Result,
};
use notesync_store::{MemoryBlobStore, MemoryRemoteStore};

/// Minimal PNG header; enough for content sniffing.
pub const PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

/// Identity provider that signs everyone in as a fixed uid.
#[derive(Default)]
pub struct MockIdentityProvider {
    initial: Option<Principal>,
    uid: Mutex<String>,
    fail: Mutex<bool>,
}

impl MockIdentityProvider {
    pub fn signed_in_as(uid: &str) -> Self {
        Self {
            initial: Some(Principal::new(uid)),
            uid: Mutex::new(uid.to_string()),
            fail: Mutex::new(false),
        }
    }

    pub fn set_uid(&self, uid: &str) {
        *self.uid.lock().unwrap() = uid.to_string();
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn current_principal(&self) -> Result<Option<Principal>> {
        Ok(self.initial.clone())
    }

    async fn sign_in(&self, provider: AuthProvider) -> Result<Principal> {
        if *self.fail.lock().unwrap() {
            return Err(Error::Identity("sign-in cancelled".into()));
        }
        let uid = self.uid.lock().unwrap().clone();
        Ok(Principal::new(uid).with_provider(provider.provider_id()))
    }

    async fn sign_out(&self) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(Error::Identity("offline".into()));
        }
        Ok(())
    }
}

/// Enrichment trigger that records requests instead of sending them.
#[derive(Default)]
pub struct RecordingEnrichmentTrigger {
    requests: Mutex<Vec<EnrichmentRequest>>,
}

impl RecordingEnrichmentTrigger {
    pub fn requests(&self) -> Vec<EnrichmentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnrichmentTrigger for RecordingEnrichmentTrigger {
    async fn request_summary(&self, request: EnrichmentRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

pub struct Harness {
    pub ctx: AppContext,
    pub store: MemoryRemoteStore,
    pub blobs: Arc<MemoryBlobStore>,
    pub identity: Arc<MockIdentityProvider>,
    pub enrichment: Arc<RecordingEnrichmentTrigger>,
    pub events: EventBus,
}

impl Harness {
    pub fn new(identity: MockIdentityProvider) -> Self {
        let store = MemoryRemoteStore::new();
        let blobs = Arc::new(MemoryBlobStore::default());
        let identity = Arc::new(identity);
        let enrichment = Arc::new(RecordingEnrichmentTrigger::default());
        let events = EventBus::new(64);

        let ctx = AppContext::new(AppDependencies {
            remote_store: Arc::new(store.clone()),
            blob_store: blobs.clone(),
            identity: identity.clone(),
            enrichment: Some(enrichment.clone()),
            events: events.clone(),
        });

        Self {
            ctx,
            store,
            blobs,
            identity,
            enrichment,
            events,
        }
    }

    /// Wait until the collection has applied its initial snapshot.
    pub async fn synced(&self) {
        let sync = self.ctx.sync().clone();
        wait_until(move || sync.is_synced() && sync.is_subscribed()).await;
    }
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}

/// Drain every envelope currently buffered.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope);
    }
    out
}

/// Run `fut` with a deadline.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}
