//! PostgreSQL remote store.
//!
//! Notes live in the `notes` table. A row trigger publishes every insert,
//! update and delete on the `notesync_changes` channel; subscriptions LISTEN
//! on that channel before reading their snapshot, so a change racing the
//! snapshot is delivered twice rather than lost. Re-delivery is harmless
//! because the synchronizer applies changes by id.
//!
//! Notifications sent while the listener is disconnected are gone, so a lost
//! connection ends the stream with [`Error::Unavailable`] instead of quietly
//! reconnecting. The subscriber reopens and receives a fresh snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notesync_core::defaults::PG_NOTIFY_CHANNEL;
use notesync_core::{
    new_v7, ChangeStream, Error, NewNote, Note, NoteChange, NoteFilter, NotePatch, RemoteStore,
    Result,
};

use crate::pool::{create_pool, PoolConfig};

const NOTE_COLUMNS: &str =
    "id, owner_id, title, body, attachment_location, summary, created_at, updated_at";

/// Payload published by the `notes_notify_change` trigger.
#[derive(Debug, Clone, Deserialize)]
struct ChangeNotification {
    op: String,
    id: Uuid,
    owner_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// [`RemoteStore`] backed by PostgreSQL LISTEN/NOTIFY.
#[derive(Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the given pool configuration.
    pub async fn connect(database_url: &str, config: PoolConfig) -> Result<Self> {
        Ok(Self::new(create_pool(database_url, config).await?))
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetch one note by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Note>> {
        fetch_note(&self.pool, id).await
    }
}

fn note_from_row(row: &PgRow) -> Result<Note> {
    Ok(Note {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        attachment_location: row.try_get("attachment_location")?,
        summary: row.try_get("summary")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn fetch_note(pool: &PgPool, id: Uuid) -> Result<Option<Note>> {
    let row = sqlx::query(&format!("SELECT {} FROM notes WHERE id = $1", NOTE_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(note_from_row).transpose()
}

/// Turn a trigger notification into a change for `filter`.
///
/// Inserts and updates are re-read so the change carries the current row; a
/// row already deleted again yields nothing. Removals carry identity and
/// timestamps only.
async fn change_from_notification(
    pool: &PgPool,
    filter: &NoteFilter,
    notification: ChangeNotification,
) -> Result<Option<NoteChange>> {
    if notification.owner_id != filter.owner_id {
        return Ok(None);
    }
    match notification.op.as_str() {
        "DELETE" => Ok(Some(NoteChange::Removed(Note {
            id: notification.id,
            owner_id: notification.owner_id,
            title: String::new(),
            body: String::new(),
            attachment_location: None,
            summary: None,
            created_at: notification.created_at,
            updated_at: notification.updated_at,
        }))),
        "INSERT" => Ok(fetch_note(pool, notification.id)
            .await?
            .map(NoteChange::Added)),
        "UPDATE" => Ok(fetch_note(pool, notification.id)
            .await?
            .map(NoteChange::Modified)),
        other => {
            warn!(component = "pg_store", op = other, "Unknown change operation ignored");
            Ok(None)
        }
    }
}

#[async_trait]
impl RemoteStore for PgRemoteStore {
    async fn subscribe(&self, filter: NoteFilter) -> Result<ChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(PG_NOTIFY_CHANNEL).await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM notes WHERE owner_id = $1",
            NOTE_COLUMNS
        ))
        .bind(&filter.owner_id)
        .fetch_all(&self.pool)
        .await?;
        let snapshot = rows
            .iter()
            .map(|row| note_from_row(row).map(NoteChange::Added))
            .collect::<Result<Vec<_>>>()?;

        info!(
            subsystem = "store",
            component = "pg_store",
            op = "subscribe",
            owner_id = %filter.owner_id,
            batch_size = snapshot.len(),
            "Subscription opened"
        );

        let owner_id = filter.owner_id.clone();
        let notifications = stream::unfold(Some(listener), move |listener| {
            let owner_id = owner_id.clone();
            async move {
                let mut listener = listener?;
                match listener.try_recv().await {
                    Ok(Some(notification)) => Some((Ok(notification), Some(listener))),
                    Ok(None) => {
                        warn!(
                            subsystem = "store",
                            component = "pg_store",
                            owner_id = %owner_id,
                            "Change feed connection lost"
                        );
                        Some((
                            Err(Error::Unavailable("change feed connection lost".into())),
                            None,
                        ))
                    }
                    Err(e) => Some((Err(Error::Database(e)), None)),
                }
            }
        });

        let pool = self.pool.clone();
        let live = notifications.filter_map(move |item| {
            let pool = pool.clone();
            let filter = filter.clone();
            async move {
                let notification = match item {
                    Ok(notification) => notification,
                    Err(e) => return Some(Err(e)),
                };
                let parsed: ChangeNotification = match serde_json::from_str(notification.payload()) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(component = "pg_store", error = %e, "Malformed change notification ignored");
                        return None;
                    }
                };
                match change_from_notification(&pool, &filter, parsed).await {
                    Ok(Some(change)) => Some(Ok(vec![change])),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            }
        });

        Ok(stream::once(futures::future::ready(Ok(snapshot)))
            .chain(live)
            .boxed())
    }

    async fn create(&self, note: NewNote) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO notes (id, owner_id, title, body, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)",
        )
        .bind(id)
        .bind(&note.owner_id)
        .bind(&note.title)
        .bind(&note.body)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(component = "pg_store", op = "create", note_id = %id, "Note created");
        Ok(id)
    }

    async fn patch(&self, id: Uuid, patch: NotePatch) -> Result<()> {
        let result = sqlx::query(
            "UPDATE notes SET
                title = COALESCE($2, title),
                body = COALESCE($3, body),
                attachment_location = COALESCE($4, attachment_location),
                summary = COALESCE($5, summary),
                updated_at = GREATEST($6, updated_at + interval '1 microsecond')
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch.title)
        .bind(patch.body)
        .bind(patch.attachment_location)
        .bind(patch.summary)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(id));
        }
        debug!(component = "pg_store", op = "patch", note_id = %id, "Note patched");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!(
            component = "pg_store",
            op = "delete",
            note_id = %id,
            deleted = result.rows_affected() > 0,
            "Note delete"
        );
        Ok(())
    }
}
