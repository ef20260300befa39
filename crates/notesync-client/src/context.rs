//! Application context: wires the session tracker, synchronizer and
//! lifecycle controller together and drives them from one task.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use notesync_core::{
    BlobStore, EnrichmentTrigger, Error, EventBus, IdentityProvider, RemoteStore, Result,
};

use crate::lifecycle::LifecycleController;
use crate::session::{SessionSnapshot, SessionTracker};
use crate::sync::{NoteCollection, NoteSynchronizer};

/// External collaborators the engine is built from.
pub struct AppDependencies {
    pub remote_store: Arc<dyn RemoteStore>,
    pub blob_store: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub enrichment: Option<Arc<dyn EnrichmentTrigger>>,
    pub events: EventBus,
}

/// Owns the client engine's components.
pub struct AppContext {
    events: EventBus,
    session: Arc<SessionTracker>,
    sync: Arc<NoteSynchronizer>,
    lifecycle: Arc<LifecycleController>,
}

impl AppContext {
    pub fn new(deps: AppDependencies) -> Self {
        let session = Arc::new(SessionTracker::new(deps.identity, deps.events.clone()));
        let sync = Arc::new(NoteSynchronizer::new(
            Arc::clone(&deps.remote_store),
            deps.events.clone(),
        ));
        let mut lifecycle = LifecycleController::new(
            deps.remote_store,
            deps.blob_store,
            Arc::clone(&session),
            Arc::clone(&sync),
            deps.events.clone(),
        );
        if let Some(trigger) = deps.enrichment {
            lifecycle = lifecycle.with_enrichment(trigger);
        }

        Self {
            events: deps.events,
            session,
            sync,
            lifecycle: Arc::new(lifecycle),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session(&self) -> &Arc<SessionTracker> {
        &self.session
    }

    pub fn sync(&self) -> &Arc<NoteSynchronizer> {
        &self.sync
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// Spawn the driver and resolve the initial session.
    ///
    /// The driver is listening before the session is resolved, so the first
    /// transition already opens the subscription.
    pub async fn start(&self) -> DriverHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let driver = Driver {
            session_rx: self.session.subscribe(),
            collection_rx: self.sync.collection(),
            sync: Arc::clone(&self.sync),
            lifecycle: Arc::clone(&self.lifecycle),
            epoch: 0,
        };
        let task = tokio::spawn(driver.run(shutdown_rx));

        if let Err(e) = self.session.init().await {
            warn!(
                subsystem = "client",
                component = "context",
                error = %e,
                "Starting signed out"
            );
        }

        info!(subsystem = "client", component = "context", "Client engine started");
        DriverHandle { shutdown_tx, task }
    }
}

/// Handle to the running driver task.
pub struct DriverHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// Stop the driver and close the subscription.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Driver task failed: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

struct Driver {
    session_rx: watch::Receiver<SessionSnapshot>,
    collection_rx: watch::Receiver<NoteCollection>,
    sync: Arc<NoteSynchronizer>,
    lifecycle: Arc<LifecycleController>,
    /// Session epoch the synchronizer currently points at.
    epoch: u64,
}

impl Driver {
    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        let initial = self.session_rx.borrow_and_update().clone();
        self.on_session(initial).await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "client", component = "context", "Driver shutting down");
                    break;
                }
                changed = self.session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = self.session_rx.borrow_and_update().clone();
                    self.on_session(state).await;
                }
                changed = self.collection_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let collection = self.collection_rx.borrow_and_update().clone();
                    self.lifecycle.reconcile(&collection);
                }
            }
        }

        if let Err(e) = self.sync.set_principal(None).await {
            warn!(component = "context", error = %e, "Failed to close subscription");
        }
    }

    async fn on_session(&mut self, snapshot: SessionSnapshot) {
        if snapshot.state.is_loading() || snapshot.epoch == self.epoch {
            return;
        }
        let principal = snapshot.state.principal();

        debug!(
            component = "context",
            from = self.epoch,
            to = snapshot.epoch,
            uid = ?principal.map(|p| p.uid.as_str()),
            "Principal changed"
        );
        self.epoch = snapshot.epoch;
        self.lifecycle.reset();
        // Errors are already reported on the event bus
        let _ = self.sync.set_principal(principal).await;
    }
}
