//! Periodic and on-demand fetch driving.
//!
//! The [`Scheduler`] owns no mutable state of its own. Everything it needs to
//! know about feeds lives in the store, so periodic passes and on-demand
//! refreshes can run side by side.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::feed::{refresh_feeds, refresh_one, FetchError, FetchResult};
use crate::storage::{DatabaseError, FeedStore};

pub struct Scheduler<S: ?Sized> {
    store: Arc<S>,
    client: reqwest::Client,
    cadence: Duration,
    max_concurrent: usize,
}

impl<S: ?Sized> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            client: self.client.clone(),
            cadence: self.cadence,
            max_concurrent: self.max_concurrent,
        }
    }
}

impl<S> Scheduler<S>
where
    S: FeedStore + ?Sized + 'static,
{
    pub fn new(
        store: Arc<S>,
        client: reqwest::Client,
        cadence: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            client,
            cadence,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn from_config(store: Arc<S>, client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            store,
            client,
            config.fetch_interval(),
            config.max_concurrent_fetches,
        )
    }

    /// Run due passes until `shutdown` fires: once immediately, then every
    /// cadence. A slow pass delays the next tick instead of causing a burst.
    ///
    /// Shutdown is observed between passes and between feeds; a feed already
    /// being fetched is finished first.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            cadence_secs = self.cadence.as_secs(),
            max_concurrent = self.max_concurrent,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    self.run_due_pass(&shutdown).await;
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Spawn [`Scheduler::run`] as a background task.
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    }

    /// Fetch every due feed once, in id order.
    ///
    /// A failure to list due feeds is logged and yields an empty pass; the
    /// next tick tries again.
    pub async fn run_due_pass(&self, shutdown: &CancellationToken) -> Vec<FetchResult> {
        let due = match self.store.list_due_feeds().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list due feeds");
                return Vec::new();
            }
        };

        if due.is_empty() {
            tracing::debug!("No feeds due");
            return Vec::new();
        }

        let results = refresh_feeds(
            &*self.store,
            &self.client,
            due,
            self.max_concurrent,
            shutdown,
        )
        .await;
        log_pass_summary("due", &results);
        results
    }

    /// Fetch one feed now, regardless of when it was last fetched.
    pub async fn refresh_feed(&self, feed_id: i64) -> FetchResult {
        refresh_one(&*self.store, &self.client, feed_id).await
    }

    /// Fetch every feed now, regardless of when each was last fetched.
    pub async fn refresh_all(&self) -> Result<Vec<FetchResult>, DatabaseError> {
        let ids = self.store.list_all_feeds().await?;
        let results = refresh_feeds(
            &*self.store,
            &self.client,
            ids,
            self.max_concurrent,
            &CancellationToken::new(),
        )
        .await;
        log_pass_summary("all", &results);
        Ok(results)
    }

    /// Fire-and-forget [`Scheduler::refresh_feed`], e.g. right after a feed
    /// is created. The caller may drop the handle.
    pub fn spawn_refresh(&self, feed_id: i64) -> JoinHandle<FetchResult> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.refresh_feed(feed_id).await })
    }

    /// Fire-and-forget [`Scheduler::refresh_all`].
    pub fn spawn_refresh_all(&self) -> JoinHandle<Result<Vec<FetchResult>, DatabaseError>> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let result = scheduler.refresh_all().await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Failed to list feeds for refresh");
            }
            result
        })
    }
}

fn log_pass_summary(pass: &str, results: &[FetchResult]) {
    let mut failed = 0;
    let mut skipped = 0;
    let mut inserted = 0;
    for r in results {
        match &r.result {
            Ok(n) => inserted += n,
            Err(FetchError::FeedNotFound(_)) => skipped += 1,
            Err(_) => failed += 1,
        }
    }
    tracing::info!(
        pass,
        attempted = results.len(),
        failed,
        skipped,
        inserted,
        "Fetch pass complete"
    );
}
