use async_trait::async_trait;
use chrono::Utc;

use super::schema::Database;
use super::types::{DatabaseError, FeedStatus};
use crate::feed::CanonicalItem;

/// What the ingestion core needs from persistence.
///
/// The fetcher and scheduler only talk to this trait, so they can run
/// against a test double as easily as against SQLite.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Feeds never fetched or whose own interval has elapsed, in id order.
    async fn list_due_feeds(&self) -> Result<Vec<i64>, DatabaseError>;

    /// Every feed, in id order.
    async fn list_all_feeds(&self) -> Result<Vec<i64>, DatabaseError>;

    /// `None` when the feed has been deleted.
    async fn get_feed_url(&self, feed_id: i64) -> Result<Option<String>, DatabaseError>;

    /// Insert unless `(feed_id, dedupe_key)` exists; `true` if inserted.
    async fn upsert_item(&self, feed_id: i64, item: &CanonicalItem)
        -> Result<bool, DatabaseError>;

    /// Stamp the feed with the current time, `status` and `error`.
    async fn record_fetch_outcome(
        &self,
        feed_id: i64,
        status: FeedStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn list_due_feeds(&self) -> Result<Vec<i64>, DatabaseError> {
        self.list_due_feeds_at(Utc::now()).await
    }

    async fn list_all_feeds(&self) -> Result<Vec<i64>, DatabaseError> {
        self.list_all_feed_ids().await
    }

    async fn get_feed_url(&self, feed_id: i64) -> Result<Option<String>, DatabaseError> {
        self.feed_url(feed_id).await
    }

    async fn upsert_item(
        &self,
        feed_id: i64,
        item: &CanonicalItem,
    ) -> Result<bool, DatabaseError> {
        Database::upsert_item(self, feed_id, item).await
    }

    async fn record_fetch_outcome(
        &self,
        feed_id: i64,
        status: FeedStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .record_fetch_outcome_at(feed_id, status, error, Utc::now())
            .await?;
        if !updated {
            tracing::debug!(feed_id, "Feed deleted before its outcome was recorded");
        }
        Ok(())
    }
}
