use chrono::Utc;

use super::schema::Database;
use super::types::{DatabaseError, ItemDbRow, StoredItem};
use crate::feed::CanonicalItem;

/// Maximum number of items returned by a single listing query.
const MAX_ITEMS: i64 = 2000;

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Insert `item` for `feed_id` unless `(feed_id, dedupe_key)` is already
    /// stored. An existing row is never touched.
    ///
    /// Returns `true` when a new row was written.
    pub async fn upsert_item(
        &self,
        feed_id: i64,
        item: &CanonicalItem,
    ) -> Result<bool, DatabaseError> {
        debug_assert!(!item.dedupe_key.is_empty(), "dedupe key must be resolved");

        let summary = (!item.summary.is_empty()).then_some(item.summary.as_str());
        let result = sqlx::query(
            "INSERT INTO items (feed_id, title, link, summary, dedupe_key, published_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(feed_id, dedupe_key) DO NOTHING",
        )
        .bind(feed_id)
        .bind(&item.title)
        .bind(&item.link)
        .bind(summary)
        .bind(&item.dedupe_key)
        .bind(item.published_at.map(|t| t.timestamp()))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Items for one feed, newest first. Undated items sort last.
    pub async fn items_for_feed(&self, feed_id: i64) -> Result<Vec<StoredItem>, DatabaseError> {
        let rows: Vec<ItemDbRow> = sqlx::query_as(
            "SELECT id, feed_id, title, link, summary, dedupe_key, published_at,
                    is_read, is_favorite, created_at
             FROM items
             WHERE feed_id = ?
             ORDER BY published_at IS NULL, published_at DESC, id
             LIMIT ?",
        )
        .bind(feed_id)
        .bind(MAX_ITEMS)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ItemDbRow::into_item).collect()
    }

    pub async fn count_items(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
