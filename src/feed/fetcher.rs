use chrono::SecondsFormat;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::decoder::decode;
use super::normalizer::normalize;
use super::types::{CanonicalItem, DecodeError};
use crate::config::Config;
use crate::storage::{FeedStatus, FeedStore};

/// Largest feed body accepted (10 MiB).
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;

/// Errors that end one feed's fetch cycle.
///
/// The `Display` form is what gets recorded as the feed's last error.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body stream failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-2xx response
    #[error("feed status: {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("response exceeds {} bytes", MAX_FEED_SIZE)]
    ResponseTooLarge,
    /// Fewer bytes arrived than Content-Length announced
    #[error("incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("storage error: {0}")]
    Storage(String),
    /// The feed was deleted before or during the cycle. Never recorded.
    #[error("feed {0} not found")]
    FeedNotFound(i64),
}

/// Result of a single feed fetch cycle.
#[derive(Debug)]
pub struct FetchResult {
    pub feed_id: i64,
    /// Number of newly stored items, or the error that ended the cycle
    pub result: Result<usize, FetchError>,
}

/// HTTP client shared by every fetch, with the configured timeout and
/// user agent.
pub fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.as_str())
        .build()
}

/// Run fetch cycles for `feed_ids`, at most `max_concurrent` at a time.
///
/// Feeds start in the given order and a new one starts as soon as any
/// running cycle finishes. `shutdown` is checked before each feed starts;
/// cycles already running are allowed to finish. Results come back in input
/// order.
pub async fn refresh_feeds<S>(
    store: &S,
    client: &reqwest::Client,
    feed_ids: Vec<i64>,
    max_concurrent: usize,
    shutdown: &CancellationToken,
) -> Vec<FetchResult>
where
    S: FeedStore + ?Sized,
{
    let max_concurrent = max_concurrent.max(1);
    let mut pending = feed_ids.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut results = Vec::with_capacity(pending.len());

    loop {
        while in_flight.len() < max_concurrent && !shutdown.is_cancelled() {
            match pending.next() {
                Some((index, feed_id)) => in_flight.push(async move {
                    (index, refresh_one(store, client, feed_id).await)
                }),
                None => break,
            }
        }

        match in_flight.next().await {
            Some(done) => results.push(done),
            None => break,
        }
    }

    if shutdown.is_cancelled() && pending.len() > 0 {
        tracing::info!(remaining = pending.len(), "Shutdown requested, feeds left for next run");
    }

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Run one fetch, decode, store and record cycle for `feed_id`.
///
/// Every outcome except [`FetchError::FeedNotFound`] is recorded on the
/// feed before this returns.
pub async fn refresh_one<S>(store: &S, client: &reqwest::Client, feed_id: i64) -> FetchResult
where
    S: FeedStore + ?Sized,
{
    let result = fetch_one(store, client, feed_id).await;

    match &result {
        Ok(0) => tracing::debug!(feed_id, "Feed refreshed, nothing new"),
        Ok(inserted) => tracing::info!(feed_id, inserted, "Feed refreshed"),
        Err(FetchError::FeedNotFound(_)) => {
            tracing::debug!(feed_id, "Feed no longer exists, skipping");
        }
        Err(e) => tracing::warn!(feed_id, error = %e, "Feed refresh failed"),
    }

    if !matches!(result, Err(FetchError::FeedNotFound(_))) {
        record_fetch_result(store, feed_id, &result).await;
    }

    FetchResult { feed_id, result }
}

async fn record_fetch_result<S>(store: &S, feed_id: i64, result: &Result<usize, FetchError>)
where
    S: FeedStore + ?Sized,
{
    let (status, error) = match result {
        Ok(_) => (FeedStatus::Success, None),
        Err(e) => (FeedStatus::Error, Some(e.to_string())),
    };

    if let Err(e) = store
        .record_fetch_outcome(feed_id, status, error.as_deref())
        .await
    {
        tracing::error!(feed_id, error = %e, "Failed to record fetch outcome");
    }
}

async fn fetch_one<S>(
    store: &S,
    client: &reqwest::Client,
    feed_id: i64,
) -> Result<usize, FetchError>
where
    S: FeedStore + ?Sized,
{
    let url = store
        .get_feed_url(feed_id)
        .await
        .map_err(|e| FetchError::Storage(e.to_string()))?
        .ok_or(FetchError::FeedNotFound(feed_id))?;

    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    let feed = decode(&bytes)?;
    tracing::debug!(
        feed_id,
        format = feed.format.as_str(),
        entries = feed.entries.len(),
        "Decoded feed"
    );

    let mut inserted = 0;
    for entry in &feed.entries {
        let mut item = normalize(entry);
        if item.dedupe_key.is_empty() {
            item.dedupe_key = synthesize_key(&item);
            tracing::debug!(
                feed_id,
                format = entry.format().as_str(),
                key = %item.dedupe_key,
                "Entry has no identifier or link, synthesized key"
            );
        }

        // First failure aborts the rest of the batch.
        let is_new = store
            .upsert_item(feed_id, &item)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        if is_new {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Key for items with neither an identifier nor a link.
///
/// Built from the title and the parsed publication time, so it only stays
/// stable while the feed keeps publishing the same title and date.
pub fn synthesize_key(item: &CanonicalItem) -> String {
    let published = item
        .published_at
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "none".to_string());
    format!("{}-{}", item.title, published)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    collect_limited(response.bytes_stream(), expected_length, limit).await
}

/// Drain a body stream, failing once it passes `limit` or if it ends short
/// of `expected_length`.
async fn collect_limited<St, B>(
    stream: St,
    expected_length: Option<u64>,
    limit: usize,
) -> Result<Vec<u8>, FetchError>
where
    St: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut bytes = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
