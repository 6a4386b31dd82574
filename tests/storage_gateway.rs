//! The ingestion gateway as the core sees it: through the `FeedStore` trait.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use siphon::feed::CanonicalItem;
use siphon::storage::{Database, FeedStatus, FeedStore};

async fn store() -> (Database, Arc<dyn FeedStore>) {
    let db = Database::open(":memory:").await.unwrap();
    let store: Arc<dyn FeedStore> = Arc::new(db.clone());
    (db, store)
}

fn item(key: &str) -> CanonicalItem {
    CanonicalItem {
        title: format!("Item {}", key),
        link: format!("https://example.com/{}", key),
        summary: "summary".to_string(),
        dedupe_key: key.to_string(),
        published_at: None,
    }
}

#[tokio::test]
async fn test_due_selection_respects_feed_interval() {
    let (db, store) = store().await;
    let stale = db
        .insert_feed("stale", "https://stale.example/feed", 60)
        .await
        .unwrap();
    let fresh = db
        .insert_feed("fresh", "https://fresh.example/feed", 60)
        .await
        .unwrap();

    let now = Utc::now();
    db.record_fetch_outcome_at(stale, FeedStatus::Success, None, now - Duration::minutes(61))
        .await
        .unwrap();
    db.record_fetch_outcome_at(fresh, FeedStatus::Success, None, now - Duration::minutes(30))
        .await
        .unwrap();

    assert_eq!(store.list_due_feeds().await.unwrap(), vec![stale]);
    assert_eq!(store.list_all_feeds().await.unwrap(), vec![stale, fresh]);
}

#[tokio::test]
async fn test_never_fetched_feed_is_due() {
    let (db, store) = store().await;
    let id = db
        .insert_feed("new", "https://new.example/feed", 1440)
        .await
        .unwrap();
    assert_eq!(store.list_due_feeds().await.unwrap(), vec![id]);
}

#[tokio::test]
async fn test_get_feed_url_reports_missing() {
    let (db, store) = store().await;
    let id = db
        .insert_feed("a", "https://a.example/feed", 60)
        .await
        .unwrap();

    assert_eq!(
        store.get_feed_url(id).await.unwrap().as_deref(),
        Some("https://a.example/feed")
    );
    assert_eq!(store.get_feed_url(id + 100).await.unwrap(), None);
}

#[tokio::test]
async fn test_upsert_item_is_conflict_free() {
    let (db, store) = store().await;
    let id = db
        .insert_feed("a", "https://a.example/feed", 60)
        .await
        .unwrap();

    assert!(store.upsert_item(id, &item("k")).await.unwrap());
    assert!(!store.upsert_item(id, &item("k")).await.unwrap());
    assert!(store.upsert_item(id, &item("other")).await.unwrap());
    assert_eq!(db.count_items(id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_record_fetch_outcome_stamps_now() {
    let (db, store) = store().await;
    let id = db
        .insert_feed("a", "https://a.example/feed", 60)
        .await
        .unwrap();
    let before = Utc::now().timestamp();

    store
        .record_fetch_outcome(id, FeedStatus::Error, Some("feed status: 500 Internal Server Error"))
        .await
        .unwrap();
    let feed = db.get_feed(id).await.unwrap().unwrap();
    assert_eq!(feed.last_status, FeedStatus::Error);
    assert_eq!(
        feed.last_error.as_deref(),
        Some("feed status: 500 Internal Server Error")
    );
    assert!(feed.last_fetched_at.unwrap().timestamp() >= before);

    store
        .record_fetch_outcome(id, FeedStatus::Success, None)
        .await
        .unwrap();
    let feed = db.get_feed(id).await.unwrap().unwrap();
    assert_eq!(feed.last_status, FeedStatus::Success);
    assert_eq!(feed.last_error, None);
}

#[tokio::test]
async fn test_record_outcome_for_deleted_feed_is_harmless() {
    let (_db, store) = store().await;
    store
        .record_fetch_outcome(404, FeedStatus::Success, None)
        .await
        .unwrap();
}
