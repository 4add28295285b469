//! Remote task feed.
//!
//! Polls the remote service for task snapshots, keeps the [`TaskCache`]
//! current, and projects every snapshot that changed into its linked note.
//! The first poll fills the cache and projects everything, which also picks
//! up remote changes made while the bridge was not running.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::TaskCache;
use crate::error::Result;
use crate::projector::{ProjectionOutcome, StatusProjector};
use crate::remote::TaskFeed;

/// Tally of one feed poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub fetched: usize,
    /// Snapshots that were new or differed from the cache.
    pub changed: usize,
    /// Notes whose body was rewritten.
    pub projected: usize,
    pub failed: usize,
}

/// Keeps the cache and the notes in step with the remote service.
pub struct RemoteFeed {
    source: Arc<dyn TaskFeed>,
    cache: TaskCache,
    projector: StatusProjector,
}

impl RemoteFeed {
    #[must_use]
    pub fn new(source: Arc<dyn TaskFeed>, cache: TaskCache, projector: StatusProjector) -> Self {
        Self {
            source,
            cache,
            projector,
        }
    }

    /// Fetches all remote tasks once and applies the changed ones.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Remote` if the snapshots cannot be fetched.
    /// Projection failures are logged and counted instead.
    pub async fn poll_once(&self) -> Result<FeedReport> {
        let tasks = self.source.fetch_tasks().await?;
        let mut report = FeedReport {
            fetched: tasks.len(),
            ..FeedReport::default()
        };

        for task in tasks {
            let Some(id) = task.id.clone() else {
                continue;
            };
            if self.cache.get(&id).await.as_ref() == Some(&task) {
                continue;
            }

            report.changed += 1;
            self.cache.ingest(task.clone()).await;

            match self.projector.apply_remote_status(&task).await {
                Ok(ProjectionOutcome::Updated { .. }) => report.projected += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(task_id = %id, error = %e, "Failed to project remote status");
                    report.failed += 1;
                }
            }
        }

        debug!(
            fetched = report.fetched,
            changed = report.changed,
            projected = report.projected,
            "Feed poll finished"
        );

        Ok(report)
    }

    /// Polls forever at `interval`. Poll errors are logged and retried on the
    /// next tick.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs(), "Remote feed started");

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Remote feed poll failed");
            }
        }
    }
}
