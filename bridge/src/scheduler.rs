//! Drives the reconciler from host activity.
//!
//! Two triggers exist:
//!
//! - **Interactive**: [`ScanScheduler::note_changed`] feeds edit signals into a
//!   trailing debouncer. Once a burst has been quiet for the configured window,
//!   one sync runs. With [`DebounceTarget::SelectedNote`] all signals share one
//!   window and the note open in the host is synced; with
//!   [`DebounceTarget::ChangedNote`] each edited note gets its own window.
//! - **Bulk sweep**: [`ScanScheduler::check_all_notes`] pages through every
//!   note matching the checklist search and syncs them one by one.
//!   [`ScanScheduler::refresh_and_sweep`] fills the remote cache first and
//!   does not sweep when that fails, since linked notes would otherwise look
//!   orphaned and get duplicate tasks.
//!
//! Interactive syncs run one at a time on a dedicated worker task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::checklist::SEARCH_QUERY;
use crate::config::{DebounceTarget, EngineConfig};
use crate::error::Result;
use crate::feed::RemoteFeed;
use crate::reconcile::{Reconciler, SyncOutcome};
use crate::utils::Debouncer;

/// Capacity of the channel between the debouncer and the sync worker.
const WORKER_QUEUE: usize = 64;

/// Debounce key for edit signals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncKey {
    /// Sync whatever note is selected when the window closes.
    Selected,
    /// Sync this note.
    Note(String),
}

/// Tally of a bulk sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pages: u32,
    pub notes: usize,
    pub created: usize,
    pub updated: usize,
    pub in_sync: usize,
    pub skipped: usize,
    pub ignored: usize,
    /// Remote calls that failed or returned nothing.
    pub unchanged: usize,
    /// Notes whose sync returned an error.
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Created { .. } => self.created += 1,
            SyncOutcome::Updated { .. } => self.updated += 1,
            SyncOutcome::InSync { .. } => self.in_sync += 1,
            SyncOutcome::Skipped(_) => self.skipped += 1,
            SyncOutcome::Ignored => self.ignored += 1,
            SyncOutcome::NoChange => self.unchanged += 1,
        }
    }
}

/// Schedules note syncs.
pub struct ScanScheduler {
    reconciler: Reconciler,
    debouncer: Debouncer<SyncKey>,
    target: DebounceTarget,
    cooldown: Duration,
    worker: JoinHandle<()>,
}

impl ScanScheduler {
    /// Starts the debouncer and the interactive sync worker.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(reconciler: Reconciler, config: &EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel(WORKER_QUEUE);
        let debouncer = Debouncer::new(config.debounce, tx);
        let worker = tokio::spawn(run_sync_worker(reconciler.clone(), rx));

        info!(
            debounce_ms = config.debounce.as_millis(),
            target = ?config.debounce_target,
            "Scan scheduler started"
        );

        Self {
            reconciler,
            debouncer,
            target: config.debounce_target,
            cooldown: config.sweep_cooldown,
            worker,
        }
    }

    /// Records a host change signal for `note_id`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Debounce` if the debouncer has stopped.
    pub async fn note_changed(&self, note_id: &str) -> Result<()> {
        let key = match self.target {
            DebounceTarget::ChangedNote => SyncKey::Note(note_id.to_string()),
            DebounceTarget::SelectedNote => SyncKey::Selected,
        };
        self.debouncer.signal(key).await?;
        Ok(())
    }

    /// Syncs every note matching the checklist search, page by page.
    ///
    /// A note that fails to sync is counted and skipped. After the last page
    /// the sweep pauses for the configured cooldown before returning.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Host` if a search page cannot be fetched.
    pub async fn check_all_notes(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut page = 0;

        loop {
            page += 1;
            let results = self.reconciler.store().search(SEARCH_QUERY, page).await?;
            report.pages += 1;

            debug!(page, notes = results.items.len(), "Sweeping search page");

            for note in &results.items {
                report.notes += 1;
                match self.reconciler.sync_note(note).await {
                    Ok(outcome) => report.record(&outcome),
                    Err(e) => {
                        warn!(note_id = %note.id, error = %e, "Sync failed during sweep");
                        report.failed += 1;
                    }
                }
            }

            if !results.has_more {
                tokio::time::sleep(self.cooldown).await;
                break;
            }
        }

        info!(
            pages = report.pages,
            notes = report.notes,
            created = report.created,
            updated = report.updated,
            in_sync = report.in_sync,
            skipped = report.skipped,
            failed = report.failed,
            "Sweep finished"
        );

        Ok(report)
    }

    /// Fills the remote cache from `feed`, then sweeps every note.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Remote` if the remote tasks cannot be fetched, in
    /// which case no note is touched, or `BridgeError::Host` if a search page
    /// cannot be fetched.
    pub async fn refresh_and_sweep(&self, feed: &RemoteFeed) -> Result<SweepReport> {
        let filled = feed.poll_once().await?;
        debug!(tasks = filled.fetched, "Remote task cache filled, starting sweep");
        self.check_all_notes().await
    }

    /// Flushes pending edit signals and waits for the worker to drain them.
    pub async fn shutdown(self) {
        drop(self.debouncer);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Sync worker ended abnormally");
        }
        debug!("Scan scheduler stopped");
    }
}

async fn run_sync_worker(reconciler: Reconciler, mut rx: mpsc::Receiver<SyncKey>) {
    while let Some(key) = rx.recv().await {
        let Some(note_id) = resolve(&reconciler, &key).await else {
            continue;
        };

        match reconciler.sync_note_by_id(&note_id).await {
            Ok(outcome) => {
                debug!(note_id = %note_id, outcome = ?outcome, "Interactive sync done");
            }
            Err(e) => warn!(note_id = %note_id, error = %e, "Interactive sync failed"),
        }
    }
}

/// Finds the id of the note a debounce key stands for.
async fn resolve(reconciler: &Reconciler, key: &SyncKey) -> Option<String> {
    let result = match key {
        SyncKey::Selected => reconciler
            .store()
            .selected_note()
            .await
            .map(|note| note.map(|n| n.id)),
        SyncKey::Note(id) => Ok(Some(id.clone())),
    };

    match result {
        Ok(Some(note_id)) => Some(note_id),
        Ok(None) => {
            debug!(key = ?key, "No note to sync");
            None
        }
        Err(e) => {
            warn!(key = ?key, error = %e, "Failed to look up selected note");
            None
        }
    }
}
