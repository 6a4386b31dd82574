use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, FeedDbRow, FeedRecord, FeedStatus};
use crate::util::validate_url;

const FEED_COLUMNS: &str = "id, name, url, fetch_interval_minutes, last_fetched_at, \
                            last_status, last_error, created_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe to a feed. Returns the new feed's id.
    ///
    /// The URL must parse and use http or https. The feed starts with no
    /// fetch history, so the next due pass picks it up.
    pub async fn insert_feed(
        &self,
        name: &str,
        url: &str,
        fetch_interval_minutes: i64,
    ) -> Result<i64, DatabaseError> {
        let url = validate_url(url.trim())?;
        if fetch_interval_minutes <= 0 {
            return Err(DatabaseError::InvalidInterval(fetch_interval_minutes));
        }

        let name = match name.trim() {
            "" => url.as_str(),
            trimmed => trimmed,
        };

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO feeds (name, url, fetch_interval_minutes, created_at)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(url.as_str())
        .bind(fetch_interval_minutes)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(feed_id = id, url = %url, "Feed added");
        Ok(id)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<FeedRecord>, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {} FROM feeds WHERE id = ?", FEED_COLUMNS))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(FeedDbRow::into_record).transpose()
    }

    /// All feeds in id order.
    pub async fn list_feeds(&self) -> Result<Vec<FeedRecord>, DatabaseError> {
        let rows: Vec<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {} FROM feeds ORDER BY id", FEED_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(FeedDbRow::into_record).collect()
    }

    /// Remove a feed and, through the foreign key, all of its items.
    /// Returns `false` if no such feed existed.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Point a feed at a new URL. Fetch history is left as is.
    pub async fn update_feed_url(&self, feed_id: i64, url: &str) -> Result<bool, DatabaseError> {
        let url = validate_url(url.trim())?;
        let result = sqlx::query("UPDATE feeds SET url = ? WHERE id = ?")
            .bind(url.as_str())
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn feed_url(&self, feed_id: i64) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT url FROM feeds WHERE id = ?")
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(url,)| url))
    }

    pub async fn list_all_feed_ids(&self) -> Result<Vec<i64>, DatabaseError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM feeds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ========================================================================
    // Fetch Health
    // ========================================================================

    /// Ids of feeds never fetched, or last fetched at least their own
    /// interval before `now`. Id order.
    pub async fn list_due_feeds_at(&self, now: DateTime<Utc>) -> Result<Vec<i64>, DatabaseError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM feeds
             WHERE last_fetched_at IS NULL
                OR last_fetched_at <= ? - fetch_interval_minutes * 60
             ORDER BY id",
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Record the outcome of a fetch attempt made at `at`.
    ///
    /// `error` is kept only for [`FeedStatus::Error`]; any other status
    /// clears it. Returns `false` if the feed no longer exists.
    pub async fn record_fetch_outcome_at(
        &self,
        feed_id: i64,
        status: FeedStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let error = match status {
            FeedStatus::Error => error,
            _ => None,
        };
        let result = sqlx::query(
            "UPDATE feeds SET last_fetched_at = ?, last_status = ?, last_error = ? WHERE id = ?",
        )
        .bind(at.timestamp())
        .bind(status.as_db_str())
        .bind(error)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
