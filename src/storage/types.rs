use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::util::UrlValidationError;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Feed URL rejected before it reached the database
    #[error("Invalid feed URL: {0}")]
    InvalidFeedUrl(#[from] UrlValidationError),

    /// Fetch interval must be a positive number of minutes
    #[error("Invalid fetch interval: {0} minutes")]
    InvalidInterval(i64),

    /// Stored value could not be mapped back onto a record
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Feed Status
// ============================================================================

/// Outcome of the most recent fetch attempt for a feed.
///
/// Any status may follow any other; there are no transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    /// Never fetched.
    #[default]
    Unset,
    Success,
    Error,
}

impl FeedStatus {
    /// Column value, `None` for [`FeedStatus::Unset`].
    pub fn as_db_str(&self) -> Option<&'static str> {
        match self {
            FeedStatus::Unset => None,
            FeedStatus::Success => Some("success"),
            FeedStatus::Error => Some("error"),
        }
    }

    pub(crate) fn from_db(value: Option<&str>) -> Result<Self, DatabaseError> {
        match value {
            None => Ok(FeedStatus::Unset),
            Some("success") => Ok(FeedStatus::Success),
            Some("error") => Ok(FeedStatus::Error),
            Some(other) => Err(DatabaseError::Corrupt(format!(
                "unknown feed status '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// A subscribed feed and its fetch health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub fetch_interval_minutes: i64,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_status: FeedStatus,
    /// Present only when `last_status` is [`FeedStatus::Error`].
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An item as persisted for one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub dedupe_key: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Helper Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub fetch_interval_minutes: i64,
    pub last_fetched_at: Option<i64>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub created_at: i64,
}

impl FeedDbRow {
    pub(crate) fn into_record(self) -> Result<FeedRecord, DatabaseError> {
        Ok(FeedRecord {
            id: self.id,
            name: self.name,
            url: self.url,
            fetch_interval_minutes: self.fetch_interval_minutes,
            last_fetched_at: self.last_fetched_at.map(from_unix).transpose()?,
            last_status: FeedStatus::from_db(self.last_status.as_deref())?,
            last_error: self.last_error,
            created_at: from_unix(self.created_at)?,
        })
    }
}

/// Internal row type for item queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub dedupe_key: String,
    pub published_at: Option<i64>,
    pub is_read: bool,
    pub is_favorite: bool,
    pub created_at: i64,
}

impl ItemDbRow {
    pub(crate) fn into_item(self) -> Result<StoredItem, DatabaseError> {
        Ok(StoredItem {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            link: self.link,
            summary: self.summary,
            dedupe_key: self.dedupe_key,
            published_at: self.published_at.map(from_unix).transpose()?,
            is_read: self.is_read,
            is_favorite: self.is_favorite,
            created_at: from_unix(self.created_at)?,
        })
    }
}

/// Timestamps are stored as unix seconds.
pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DatabaseError::Corrupt(format!("timestamp out of range: {}", secs)))
}
