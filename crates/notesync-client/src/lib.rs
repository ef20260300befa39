//! # notesync-client
//!
//! Client engine for notesync: tracks the signed-in principal, keeps a live
//! collection of the principal's notes, and persists the single edit session
//! through the remote store and blob store adapters.
//!
//! Build an [`AppContext`] from [`AppDependencies`], call
//! [`AppContext::start`], then drive the [`LifecycleController`] from the
//! presentation layer. Outcomes are reported on the shared
//! [`notesync_core::EventBus`].

pub mod context;
pub mod enrichment;
pub mod lifecycle;
pub mod session;
pub mod sync;

pub use context::{AppContext, AppDependencies, DriverHandle};
pub use enrichment::{EnrichmentConfig, HttpEnrichmentClient};
pub use lifecycle::{
    EditMode, EditSession, LifecycleController, LifecycleError, PendingAttachment, SubmitError,
    SubmitOutcome,
};
pub use session::{SessionSnapshot, SessionState, SessionTracker};
pub use sync::{NoteCollection, NoteSynchronizer, SubscriptionHandle};
