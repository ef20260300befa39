//! Session tracking: who is signed in.
//!
//! The tracker mirrors the identity provider into a `watch` channel. A `watch`
//! receiver only sees the latest value, so every snapshot carries an epoch
//! that advances whenever the signed-in uid changes (sign-out included). A
//! subscriber that compares epochs notices a sign-out followed by a sign-in
//! as the same uid even when it never saw the intermediate state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use notesync_core::{AuthProvider, ClientEvent, EventBus, IdentityProvider, Principal, Result};

/// Current authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet resolved from the identity provider.
    Loading,
    SignedOut,
    SignedIn(Principal),
}

impl SessionState {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::SignedIn(principal) => Some(principal),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    fn uid(&self) -> Option<&str> {
        self.principal().map(|p| p.uid.as_str())
    }
}

/// Session state plus the principal epoch it was published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Advances on every change of signed-in uid.
    pub epoch: u64,
}

/// Tracks the signed-in principal.
pub struct SessionTracker {
    identity: Arc<dyn IdentityProvider>,
    state: watch::Sender<SessionSnapshot>,
    events: EventBus,
}

impl SessionTracker {
    pub fn new(identity: Arc<dyn IdentityProvider>, events: EventBus) -> Self {
        let (state, _) = watch::channel(SessionSnapshot {
            state: SessionState::Loading,
            epoch: 0,
        });
        Self {
            identity,
            state,
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().state.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.state.borrow().state.principal().cloned()
    }

    /// Receiver of the latest snapshot. Compare epochs to detect principal
    /// changes that were coalesced away.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Resolve the initial state from the identity provider.
    ///
    /// A provider failure is reported and leaves the session signed out, so
    /// the app never stays in `Loading`.
    pub async fn init(&self) -> Result<()> {
        match self.identity.current_principal().await {
            Ok(Some(principal)) => {
                self.transition(SessionState::SignedIn(principal));
                Ok(())
            }
            Ok(None) => {
                self.transition(SessionState::SignedOut);
                Ok(())
            }
            Err(e) => {
                error!(
                    subsystem = "client",
                    component = "session",
                    op = "init",
                    error = %e,
                    "Failed to resolve current principal"
                );
                self.events
                    .emit(ClientEvent::error("Could not restore your session.", None));
                self.transition(SessionState::SignedOut);
                Err(e)
            }
        }
    }

    /// Interactive sign-in. On failure the prior state is kept.
    pub async fn sign_in(&self, provider: AuthProvider) -> Result<Principal> {
        match self.identity.sign_in(provider).await {
            Ok(principal) => {
                info!(
                    subsystem = "client",
                    component = "session",
                    op = "sign_in",
                    owner_id = %principal.uid,
                    provider = provider.label(),
                    "Signed in"
                );
                self.transition(SessionState::SignedIn(principal.clone()));
                Ok(principal)
            }
            Err(e) => {
                error!(
                    subsystem = "client",
                    component = "session",
                    op = "sign_in",
                    provider = provider.label(),
                    error = %e,
                    "Sign-in failed"
                );
                self.events.emit(ClientEvent::error(
                    format!("Sign-in with {} failed.", provider.label()),
                    None,
                ));
                Err(e)
            }
        }
    }

    /// Sign out. On failure the prior state is kept.
    pub async fn sign_out(&self) -> Result<()> {
        match self.identity.sign_out().await {
            Ok(()) => {
                info!(subsystem = "client", component = "session", op = "sign_out", "Signed out");
                self.transition(SessionState::SignedOut);
                Ok(())
            }
            Err(e) => {
                error!(
                    subsystem = "client",
                    component = "session",
                    op = "sign_out",
                    error = %e,
                    "Sign-out failed"
                );
                self.events.emit(ClientEvent::error("Sign-out failed.", None));
                Err(e)
            }
        }
    }

    fn transition(&self, next: SessionState) {
        let uid = next.uid().map(str::to_string);
        let mut epoch = 0;
        let changed = self.state.send_if_modified(|snapshot| {
            if snapshot.state == next {
                return false;
            }
            if snapshot.state.uid() != next.uid() {
                snapshot.epoch += 1;
            }
            snapshot.state = next;
            epoch = snapshot.epoch;
            true
        });
        if changed {
            debug!(component = "session", uid = ?uid, epoch, "Session transition");
            self.events.emit(ClientEvent::SessionChanged { uid });
        }
    }
}
