//! Note lifecycle: the single edit session and the create/update/attach/delete
//! sequences that persist it.
//!
//! The edit session lives in a `watch` channel written only by
//! [`LifecycleController`]. Every session carries a token; any write that
//! follows an `.await` first checks that the session which started the
//! operation is still current, so completions that arrive after a cancel,
//! logout or reconciliation leave local state untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notesync_core::defaults::MAX_ATTACHMENT_BYTES;
use notesync_core::file_safety::detect_mime;
use notesync_core::{
    attachment_path, is_image, BlobStore, ClientEvent, EnrichmentRequest, EnrichmentTrigger,
    Error, EventBus, NewNote, Notice, NotePatch, RemoteStore,
};

use crate::session::SessionTracker;
use crate::sync::{NoteCollection, NoteSynchronizer};

// =============================================================================
// ERRORS
// =============================================================================

/// Failure of a session entry, draft or delete operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("note {0} is not in the collection")]
    NoteNotInCollection(Uuid),

    #[error("no edit session is open")]
    NoSession,

    #[error("not signed in")]
    NotSignedIn,

    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error(transparent)]
    Store(#[from] Error),
}

impl LifecycleError {
    /// Wording suitable for the user; causes stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            LifecycleError::NoteNotInCollection(_) => "That note is no longer available.",
            LifecycleError::NoSession => "There is no note being edited.",
            LifecycleError::NotSignedIn => "Sign in to manage your notes.",
            LifecycleError::InvalidAttachment(_) => "Only image files can be attached.",
            LifecycleError::Store(_) => "Something went wrong. Please try again.",
        }
    }
}

/// Failure of [`LifecycleController::submit`].
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no edit session is open")]
    NoSession,

    #[error("not signed in")]
    NotSignedIn,

    #[error("a submit is already in flight for this session")]
    InProgress,

    /// The create or text update failed; nothing was written.
    #[error("nothing saved: {0}")]
    NothingSaved(#[source] Error),

    /// The note was saved but its attachment was not.
    #[error("note {note_id} saved without its attachment: {source}")]
    AttachmentFailed {
        note_id: Uuid,
        #[source]
        source: Error,
    },
}

impl SubmitError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "Add a title, some text or an image before saving.",
            SubmitError::NoSession => "There is no note being edited.",
            SubmitError::NotSignedIn => "Sign in to save notes.",
            SubmitError::InProgress => "This note is already being saved.",
            SubmitError::NothingSaved(_) => {
                "Your note could not be saved. Your changes are still here, try again."
            }
            SubmitError::AttachmentFailed { .. } => {
                "Your note was saved, but the image could not be uploaded. Save again to retry."
            }
        }
    }

    /// Id of the note that now exists remotely despite the failure.
    pub fn saved_note_id(&self) -> Option<Uuid> {
        match self {
            SubmitError::AttachmentFailed { note_id, .. } => Some(*note_id),
            _ => None,
        }
    }
}

/// Result of a submit that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Every step succeeded and the session was cleared.
    Saved {
        note_id: Uuid,
        created: bool,
        attachment_location: Option<String>,
    },
    /// The edit target was deleted elsewhere; nothing was sent.
    Reconciled { note_id: Uuid },
    /// The remote writes succeeded after the session had already gone.
    Detached { note_id: Uuid },
}

// =============================================================================
// EDIT SESSION
// =============================================================================

/// Image bytes waiting to be uploaded with the next submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    file_name: String,
    content_type: &'static str,
    bytes: Arc<[u8]>,
}

impl PendingAttachment {
    /// Accepts non-empty image payloads up to the attachment size limit.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self, LifecycleError> {
        let bytes: Vec<u8> = bytes.into();
        if bytes.is_empty() {
            return Err(LifecycleError::InvalidAttachment("file is empty".to_string()));
        }
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(LifecycleError::InvalidAttachment(format!(
                "file is {} bytes, limit is {}",
                bytes.len(),
                MAX_ATTACHMENT_BYTES
            )));
        }
        if !is_image(&bytes) {
            return Err(LifecycleError::InvalidAttachment(
                "file is not an image".to_string(),
            ));
        }
        let content_type = detect_mime(&bytes).unwrap_or("application/octet-stream");
        Ok(Self {
            file_name: file_name.into(),
            content_type,
            bytes: bytes.into(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Whether the open session creates a note or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Composing,
    Editing(Uuid),
}

/// The single open form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    token: u64,
    mode: EditMode,
    /// Set once the edit target has been observed in a synced collection.
    target_confirmed: bool,
    title: String,
    body: String,
    attachment: Option<PendingAttachment>,
    submitting: bool,
}

impl EditSession {
    fn new(token: u64, mode: EditMode, title: String, body: String) -> Self {
        Self {
            token,
            target_confirmed: matches!(mode, EditMode::Editing(_)),
            mode,
            title,
            body,
            attachment: None,
            submitting: false,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn target(&self) -> Option<Uuid> {
        match self.mode {
            EditMode::Editing(id) => Some(id),
            EditMode::Composing => None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachment(&self) -> Option<&PendingAttachment> {
        self.attachment.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    fn is_blank(&self) -> bool {
        self.title.is_empty() && self.body.is_empty() && self.attachment.is_none()
    }

    /// Confirmed target that a synced collection no longer holds.
    fn lost_target(&self, collection: &NoteCollection) -> Option<Uuid> {
        match self.mode {
            EditMode::Editing(id)
                if self.target_confirmed && collection.is_synced() && !collection.contains(&id) =>
            {
                Some(id)
            }
            _ => None,
        }
    }
}

/// Everything a submit needs, captured when it starts.
struct SubmitPlan {
    token: u64,
    mode: EditMode,
    owner_id: String,
    title: String,
    body: String,
    attachment: Option<PendingAttachment>,
}

enum SubmitStart {
    Run(SubmitPlan),
    Reconciled(Uuid),
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Owns the edit session and persists it through the adapters.
pub struct LifecycleController {
    store: Arc<dyn RemoteStore>,
    blobs: Arc<dyn BlobStore>,
    session: Arc<SessionTracker>,
    sync: Arc<NoteSynchronizer>,
    enrichment: Option<Arc<dyn EnrichmentTrigger>>,
    events: EventBus,
    edit: watch::Sender<Option<EditSession>>,
    next_token: AtomicU64,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStore>,
        session: Arc<SessionTracker>,
        sync: Arc<NoteSynchronizer>,
        events: EventBus,
    ) -> Self {
        let (edit, _) = watch::channel(None);
        Self {
            store,
            blobs,
            session,
            sync,
            enrichment: None,
            events,
            edit,
            next_token: AtomicU64::new(1),
        }
    }

    /// Request a summary after every successful save with text.
    pub fn with_enrichment(mut self, trigger: Arc<dyn EnrichmentTrigger>) -> Self {
        self.enrichment = Some(trigger);
        self
    }

    /// Current edit session, if any.
    pub fn current(&self) -> Option<EditSession> {
        self.edit.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<EditSession>> {
        self.edit.subscribe()
    }

    fn open(&self, mode: EditMode, title: String, body: String) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.edit
            .send_replace(Some(EditSession::new(token, mode, title, body)));
        debug!(component = "lifecycle", token, mode = ?mode, "Edit session opened");
        token
    }

    /// Open an empty session for a new note, replacing any open one.
    pub fn start_compose(&self) -> Result<(), LifecycleError> {
        if self.session.current_principal().is_none() {
            return Err(LifecycleError::NotSignedIn);
        }
        self.open(EditMode::Composing, String::new(), String::new());
        Ok(())
    }

    /// Open a session on a note from the collection, seeded with its text.
    pub fn start_edit(&self, id: Uuid) -> Result<(), LifecycleError> {
        if self.session.current_principal().is_none() {
            return Err(LifecycleError::NotSignedIn);
        }
        let note = self
            .sync
            .get(&id)
            .ok_or(LifecycleError::NoteNotInCollection(id))?;
        self.open(EditMode::Editing(id), note.title, note.body);
        Ok(())
    }

    fn update_draft(&self, f: impl FnOnce(&mut EditSession)) -> Result<(), LifecycleError> {
        let mut found = false;
        self.edit.send_if_modified(|slot| match slot {
            Some(session) => {
                found = true;
                f(session);
                true
            }
            None => false,
        });
        if found {
            Ok(())
        } else {
            Err(LifecycleError::NoSession)
        }
    }

    pub fn set_title(&self, title: impl Into<String>) -> Result<(), LifecycleError> {
        let title = title.into();
        self.update_draft(|session| session.title = title)
    }

    pub fn set_body(&self, body: impl Into<String>) -> Result<(), LifecycleError> {
        let body = body.into();
        self.update_draft(|session| session.body = body)
    }

    /// Replace the pending attachment.
    pub fn attach(&self, attachment: PendingAttachment) -> Result<(), LifecycleError> {
        self.update_draft(|session| session.attachment = Some(attachment))
    }

    pub fn clear_attachment(&self) -> Result<(), LifecycleError> {
        self.update_draft(|session| session.attachment = None)
    }

    /// Discard the open session.
    pub fn cancel(&self) {
        self.clear("cancel");
    }

    /// Discard the open session on a principal change.
    pub fn reset(&self) {
        self.clear("reset");
    }

    fn clear(&self, op: &'static str) {
        let cleared = self.edit.send_if_modified(|slot| slot.take().is_some());
        if cleared {
            debug!(component = "lifecycle", op, "Edit session cleared");
        }
    }

    /// Collapse an edit session whose target left the collection.
    ///
    /// Returns the id of the lost target when the session was discarded.
    pub fn reconcile(&self, collection: &NoteCollection) -> Option<Uuid> {
        let mut lost = None;
        self.edit.send_if_modified(|slot| {
            let Some(session) = slot.as_mut() else {
                return false;
            };
            if let Some(id) = session.lost_target(collection) {
                lost = Some(id);
                *slot = None;
                return true;
            }
            if let EditMode::Editing(id) = session.mode {
                if !session.target_confirmed && collection.contains(&id) {
                    session.target_confirmed = true;
                    return true;
                }
            }
            false
        });
        if let Some(note_id) = lost {
            self.report_target_deleted(note_id);
        }
        lost
    }

    fn report_target_deleted(&self, note_id: Uuid) {
        info!(
            subsystem = "client",
            component = "lifecycle",
            op = "reconcile",
            note_id = %note_id,
            "Edit target deleted elsewhere; draft discarded"
        );
        self.events.emit(ClientEvent::Notice {
            notice: Notice::EditTargetDeleted { note_id },
        });
    }

    fn begin_submit(&self) -> Result<SubmitStart, SubmitError> {
        let principal = self
            .session
            .current_principal()
            .ok_or(SubmitError::NotSignedIn)?;
        let collection = self.sync.snapshot();

        let mut start = Err(SubmitError::NoSession);
        self.edit.send_if_modified(|slot| {
            let Some(session) = slot.as_mut() else {
                return false;
            };
            if session.submitting {
                start = Err(SubmitError::InProgress);
                return false;
            }
            if let Some(id) = session.lost_target(&collection) {
                start = Ok(SubmitStart::Reconciled(id));
                *slot = None;
                return true;
            }
            if session.is_blank() {
                start = Err(SubmitError::Validation(
                    "title, body and attachment are all empty".to_string(),
                ));
                return false;
            }
            session.submitting = true;
            start = Ok(SubmitStart::Run(SubmitPlan {
                token: session.token,
                mode: session.mode,
                owner_id: principal.uid.clone(),
                title: session.title.clone(),
                body: session.body.clone(),
                attachment: session.attachment.clone(),
            }));
            true
        });
        start
    }

    /// Persist the open session.
    ///
    /// The text is written first (create or patch). A pending attachment is
    /// uploaded only after that succeeds, then linked with a second patch.
    /// On failure the draft is kept and the error says whether anything was
    /// saved.
    pub async fn submit(&self) -> Result<SubmitOutcome, SubmitError> {
        let plan = match self.begin_submit()? {
            SubmitStart::Run(plan) => plan,
            SubmitStart::Reconciled(note_id) => {
                self.report_target_deleted(note_id);
                return Ok(SubmitOutcome::Reconciled { note_id });
            }
        };
        let token = plan.token;
        let start = Instant::now();

        let (note_id, created) = match self.write_text(&plan).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(
                    subsystem = "client",
                    component = "lifecycle",
                    op = "submit",
                    owner_id = %plan.owner_id,
                    transient = e.is_transient(),
                    error = %e,
                    "Note text not saved"
                );
                let err = SubmitError::NothingSaved(e);
                self.fail_submit(token, None, &err);
                return Err(err);
            }
        };

        let mut attachment_location = None;
        if let Some(attachment) = &plan.attachment {
            match self.upload(&plan.owner_id, note_id, attachment).await {
                Ok(location) => attachment_location = Some(location),
                Err(e) => {
                    error!(
                        subsystem = "client",
                        component = "lifecycle",
                        op = "submit",
                        note_id = %note_id,
                        size_bytes = attachment.len(),
                        transient = e.is_transient(),
                        error = %e,
                        "Attachment not saved"
                    );
                    let err = SubmitError::AttachmentFailed { note_id, source: e };
                    self.fail_submit(token, Some(note_id), &err);
                    return Err(err);
                }
            }
        }

        self.request_enrichment(note_id, &plan.title, &plan.body);

        let cleared = self.edit.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|session| session.token == token) {
                *slot = None;
                true
            } else {
                false
            }
        });

        info!(
            subsystem = "client",
            component = "lifecycle",
            op = "submit",
            note_id = %note_id,
            created,
            has_attachment = attachment_location.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Note saved"
        );

        if !cleared {
            debug!(component = "lifecycle", note_id = %note_id, token, "Submit completed after session ended");
            return Ok(SubmitOutcome::Detached { note_id });
        }

        self.events.emit(ClientEvent::NoteSaved {
            note_id,
            created,
            has_attachment: attachment_location.is_some(),
        });
        Ok(SubmitOutcome::Saved {
            note_id,
            created,
            attachment_location,
        })
    }

    async fn write_text(&self, plan: &SubmitPlan) -> Result<(Uuid, bool), Error> {
        match plan.mode {
            EditMode::Composing => {
                let id = self
                    .store
                    .create(NewNote {
                        owner_id: plan.owner_id.clone(),
                        title: plan.title.clone(),
                        body: plan.body.clone(),
                    })
                    .await?;
                Ok((id, true))
            }
            EditMode::Editing(id) => {
                self.store
                    .patch(id, NotePatch::text(plan.title.clone(), plan.body.clone()))
                    .await?;
                Ok((id, false))
            }
        }
    }

    async fn upload(
        &self,
        owner_id: &str,
        note_id: Uuid,
        attachment: &PendingAttachment,
    ) -> Result<String, Error> {
        let path = attachment_path(owner_id, note_id, attachment.file_name());
        debug!(
            component = "lifecycle",
            op = "upload",
            blob_path = %path,
            size_bytes = attachment.len(),
            content_type = attachment.content_type(),
            "Uploading attachment"
        );
        self.blobs.write(&path, attachment.bytes()).await?;
        let location = self.blobs.resolve_location(&path).await?;
        self.store
            .patch(note_id, NotePatch::attachment(location.clone()))
            .await?;
        Ok(location)
    }

    /// Keep the draft, release the submit flag and report, if the session
    /// that started the submit is still open.
    fn fail_submit(&self, token: u64, saved: Option<Uuid>, err: &SubmitError) {
        let current = self.edit.send_if_modified(|slot| match slot {
            Some(session) if session.token == token => {
                session.submitting = false;
                if let (EditMode::Composing, Some(id)) = (session.mode, saved) {
                    // Retry must patch the saved note, not create a duplicate
                    session.mode = EditMode::Editing(id);
                    session.target_confirmed = false;
                }
                true
            }
            _ => false,
        });
        if current {
            self.events
                .emit(ClientEvent::error(err.user_message(), saved));
        } else {
            debug!(component = "lifecycle", token, "Submit failed after session ended");
        }
    }

    fn request_enrichment(&self, note_id: Uuid, title: &str, body: &str) {
        let Some(trigger) = self.enrichment.clone() else {
            return;
        };
        let request = EnrichmentRequest::new(note_id, title, body);
        if request.text().is_empty() {
            return;
        }
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = trigger.request_summary(request).await {
                warn!(
                    subsystem = "client",
                    component = "lifecycle",
                    op = "enrich",
                    note_id = %note_id,
                    error = %e,
                    "Summary request failed"
                );
                events.emit(ClientEvent::error(
                    "Could not generate a summary for this note.",
                    Some(note_id),
                ));
            }
        });
    }

    /// Delete a note of the current principal.
    pub async fn delete(&self, id: Uuid) -> Result<(), LifecycleError> {
        if self.session.current_principal().is_none() {
            return Err(LifecycleError::NotSignedIn);
        }
        if !self.sync.contains(&id) {
            return Err(LifecycleError::NoteNotInCollection(id));
        }

        if let Err(e) = self.store.delete(id).await {
            error!(
                subsystem = "client",
                component = "lifecycle",
                op = "delete",
                note_id = %id,
                error = %e,
                "Delete failed"
            );
            self.events
                .emit(ClientEvent::error("Could not delete the note.", Some(id)));
            return Err(e.into());
        }

        self.edit.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|session| session.target() == Some(id)) {
                *slot = None;
                true
            } else {
                false
            }
        });
        info!(subsystem = "client", component = "lifecycle", op = "delete", note_id = %id, "Note deleted");
        self.events.emit(ClientEvent::NoteDeleted { note_id: id });
        Ok(())
    }
}
