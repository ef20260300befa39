//! PostgreSQL remote store against a live database.
//!
//! Skipped unless `DATABASE_URL` is set.

use futures::StreamExt;
use notesync_core::{ChangeKind, Error, NewNote, NoteFilter, NotePatch, RemoteStore};
use notesync_store::{PgRemoteStore, PoolConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::time::Duration;

async fn setup_store() -> Option<PgRemoteStore> {
    let _ = dotenvy::dotenv();
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let store = PgRemoteStore::connect(&database_url, PoolConfig::default().max_connections(4))
        .await
        .expect("Failed to connect to test database");
    store.migrate().await.expect("Failed to run migrations");
    Some(store)
}

fn unique_owner() -> String {
    format!("test-owner-{}", uuid::Uuid::now_v7())
}

#[tokio::test]
async fn test_pg_create_patch_delete_feed() {
    let Some(store) = setup_store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let owner = unique_owner();

    let existing = store
        .create(NewNote {
            owner_id: owner.clone(),
            title: "before".into(),
            body: String::new(),
        })
        .await
        .unwrap();

    let mut feed = store.subscribe(NoteFilter::owner(&owner)).await.unwrap();
    let snapshot = feed.next().await.unwrap().unwrap();
    assert!(snapshot.iter().any(|c| c.note().id == existing));

    store
        .patch(existing, NotePatch::summary("summarized"))
        .await
        .unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("no notification")
        .unwrap()
        .unwrap();
    assert_eq!(batch[0].kind(), ChangeKind::Modified);
    assert_eq!(batch[0].note().summary.as_deref(), Some("summarized"));
    assert_eq!(batch[0].note().title, "before");

    store.delete(existing).await.unwrap();
    let batch = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("no notification")
        .unwrap()
        .unwrap();
    assert_eq!(batch[0].kind(), ChangeKind::Removed);
    assert_eq!(batch[0].note().id, existing);
}

#[tokio::test]
async fn test_pg_patch_missing_note() {
    let Some(store) = setup_store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let missing = uuid::Uuid::now_v7();
    let err = store
        .patch(missing, NotePatch::text("a", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoteNotFound(id) if id == missing));
}

#[tokio::test]
async fn test_pg_feed_ignores_other_owners() {
    let Some(store) = setup_store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let owner = unique_owner();
    let mut feed = store.subscribe(NoteFilter::owner(&owner)).await.unwrap();
    feed.next().await.unwrap().unwrap();

    store
        .create(NewNote {
            owner_id: unique_owner(),
            title: "someone else".into(),
            body: String::new(),
        })
        .await
        .unwrap();
    let mine = store
        .create(NewNote {
            owner_id: owner.clone(),
            title: "mine".into(),
            body: String::new(),
        })
        .await
        .unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("no notification")
        .unwrap()
        .unwrap();
    assert_eq!(batch[0].note().id, mine);
    assert_eq!(batch[0].kind(), ChangeKind::Added);
}

#[tokio::test]
async fn test_pg_feed_ends_with_error_when_listener_connection_dies() {
    let Some(admin) = setup_store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let database_url = std::env::var("DATABASE_URL").unwrap();
    let app_name = format!("notesync-feed-{}", uuid::Uuid::now_v7().simple());
    let options = database_url
        .parse::<PgConnectOptions>()
        .unwrap()
        .application_name(&app_name);
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .unwrap();
    let store = PgRemoteStore::new(pool);

    let owner = unique_owner();
    let mut feed = store.subscribe(NoteFilter::owner(&owner)).await.unwrap();
    feed.next().await.unwrap().unwrap();

    let terminated: Vec<bool> = sqlx::query_scalar(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity
         WHERE application_name = $1 AND query ILIKE 'LISTEN%'",
    )
    .bind(&app_name)
    .fetch_all(admin.pool())
    .await
    .unwrap();
    assert_eq!(terminated, vec![true]);

    let item = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("feed did not notice the lost connection");
    assert!(matches!(item, Some(Err(_))));
    let end = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("feed did not end");
    assert!(end.is_none());
}
