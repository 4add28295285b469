//! Note to remote task reconciliation.
//!
//! [`Reconciler::sync_note`] turns a note's checklist into a [`Task`] and
//! decides whether the remote copy has to be created, updated, or left alone:
//!
//! | Link | Cache | Local state | Action |
//! |------|-------|-------------|--------|
//! | none or orphaned | miss | finished or no items | skip |
//! | none or orphaned | miss | open items | create |
//! | present | hit | equal to snapshot | nothing |
//! | present | hit | differs | update |
//!
//! After a successful call the note is re-linked when the id changed, and the
//! note's to-do flag follows the checklist state.
//!
//! Remote failures never reach the caller. They are logged and the note is
//! left as it was. Note store failures are returned.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::TaskCache;
use crate::config::{EngineConfig, IgnoreTagScope};
use crate::error::Result;
use crate::host::{Note, NoteStore, NoteUpdate};
use crate::link::{self, DIDA_PREFIX};
use crate::remote::TaskService;
use crate::task::Task;

/// Why a create candidate was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every checklist item is already done.
    AlreadyFinished,
    /// The note has no checklist lines.
    NoChecklist,
}

/// Result of a single [`Reconciler::sync_note`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The note carries the ignore tag.
    Ignored,
    /// No remote task exists and none was created.
    Skipped(SkipReason),
    /// The cached snapshot already matches the note.
    InSync { task_id: String },
    /// A remote task was created.
    Created { task_id: String },
    /// The remote task was updated.
    Updated { task_id: String },
    /// The remote call failed or returned nothing.
    NoChange,
}

impl SyncOutcome {
    /// Remote task id the note is linked to after this outcome.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::InSync { task_id } | Self::Created { task_id } | Self::Updated { task_id } => {
                Some(task_id)
            }
            _ => None,
        }
    }

    /// Returns true if a remote call succeeded.
    #[must_use]
    pub fn is_remote_write(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::Updated { .. })
    }
}

/// Mirrors notes into remote tasks.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn NoteStore>,
    remote: Arc<dyn TaskService>,
    cache: TaskCache,
    ignore_tag: String,
    ignore_scope: IgnoreTagScope,
}

impl Reconciler {
    /// Creates a reconciler over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn NoteStore>,
        remote: Arc<dyn TaskService>,
        cache: TaskCache,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            remote,
            cache,
            ignore_tag: config.ignore_tag.to_lowercase(),
            ignore_scope: config.ignore_tag_scope,
        }
    }

    /// The note store this reconciler reads from.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn NoteStore> {
        &self.store
    }

    /// Loads a note by id and syncs it.
    ///
    /// The note is read while its note lock is held, so a concurrent sync of
    /// the same note sees the link written by the one before it.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Host` if the note cannot be read or written.
    pub async fn sync_note_by_id(&self, note_id: &str) -> Result<SyncOutcome> {
        let _note_guard = self.cache.lock_note(note_id).await;
        let note = self.store.note(note_id).await?;
        self.sync_locked(&note).await
    }

    /// Syncs one note to the remote service.
    ///
    /// Only the id of `note` is trusted; the note is re-read under its lock.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Host` if the note or its tags cannot be read or
    /// the note cannot be updated.
    pub async fn sync_note(&self, note: &Note) -> Result<SyncOutcome> {
        self.sync_note_by_id(&note.id).await
    }

    /// Body of a sync. The caller holds the note lock.
    async fn sync_locked(&self, note: &Note) -> Result<SyncOutcome> {
        if self.is_ignored(&note.id).await? {
            debug!(note_id = %note.id, "Note carries the ignore tag, skipping");
            return Ok(SyncOutcome::Ignored);
        }

        let mut task = Task::from_note(&note.id, &note.title, &note.body);
        let all_finished = task.all_finished();
        let prior_id = link::task_id(&note.source_url);
        task.id.clone_from(&prior_id);

        // Held until the link field is written. Lock order is note, then task.
        let _task_guard = match &prior_id {
            Some(id) => Some(self.cache.lock(id).await),
            None => None,
        };

        let outcome = self.reconcile(task).await;

        if let Some(task_id) = outcome.task_id() {
            if prior_id.as_deref() != Some(task_id) {
                info!(note_id = %note.id, task_id = %task_id, "Linking note to remote task");
                let source_url = link::encode(&note.source_url, DIDA_PREFIX, task_id);
                self.store
                    .update_note(&note.id, NoteUpdate::source_url(source_url))
                    .await?;
            }
        }

        if note.is_todo == all_finished {
            debug!(note_id = %note.id, is_todo = !all_finished, "Flipping note to-do flag");
            self.store
                .update_note(&note.id, NoteUpdate::is_todo(!all_finished))
                .await?;
        }

        Ok(outcome)
    }

    async fn is_ignored(&self, note_id: &str) -> Result<bool> {
        let tags = self.store.note_tags(note_id).await?;
        let limit = match self.ignore_scope {
            IgnoreTagScope::FirstTag => 1,
            IgnoreTagScope::AllTags => tags.len(),
        };
        Ok(tags
            .iter()
            .take(limit)
            .any(|tag| tag.title.to_lowercase() == self.ignore_tag))
    }

    /// Chooses and performs the remote call for a freshly built task.
    async fn reconcile(&self, task: Task) -> SyncOutcome {
        let cached = match task.id.as_deref() {
            Some(id) => self.cache.get(id).await,
            None => None,
        };

        match cached {
            None => self.create(task).await,
            Some(cached) if task.content_equals(&cached) => {
                let task_id = cached.id.or(task.id).unwrap_or_default();
                debug!(task_id = %task_id, "Remote task already in sync");
                SyncOutcome::InSync { task_id }
            }
            Some(_) => self.update(task).await,
        }
    }

    async fn create(&self, mut task: Task) -> SyncOutcome {
        if task.items.is_empty() {
            debug!(title = %task.title, "No checklist items, not creating a remote task");
            return SyncOutcome::Skipped(SkipReason::NoChecklist);
        }
        if task.status.is_done() {
            debug!(title = %task.title, "All items finished, not creating a remote task");
            return SyncOutcome::Skipped(SkipReason::AlreadyFinished);
        }

        if let Some(orphan) = task.id.take() {
            debug!(task_id = %orphan, "Linked task is not cached, creating a new one");
        }

        match self.remote.create_task(&task).await {
            Ok(Some(created)) => match created.id.clone() {
                Some(task_id) => {
                    info!(task_id = %task_id, title = %task.title, "Created remote task");
                    self.cache.insert(created).await;
                    SyncOutcome::Created { task_id }
                }
                None => {
                    warn!(title = %task.title, "Remote create returned a task without id");
                    SyncOutcome::NoChange
                }
            },
            Ok(None) => {
                warn!(title = %task.title, "Remote create returned nothing");
                SyncOutcome::NoChange
            }
            Err(e) => {
                warn!(title = %task.title, error = %e, "Remote create failed");
                SyncOutcome::NoChange
            }
        }
    }

    async fn update(&self, task: Task) -> SyncOutcome {
        match self.remote.update_task(&task).await {
            Ok(Some(mut updated)) => {
                if updated.id.is_none() {
                    updated.id.clone_from(&task.id);
                }
                let task_id = updated.id.clone().unwrap_or_default();
                info!(task_id = %task_id, title = %task.title, "Updated remote task");
                self.cache.insert(updated).await;
                SyncOutcome::Updated { task_id }
            }
            Ok(None) => {
                warn!(task_id = ?task.id, "Remote update returned nothing");
                SyncOutcome::NoChange
            }
            Err(e) => {
                warn!(task_id = ?task.id, error = %e, "Remote update failed");
                SyncOutcome::NoChange
            }
        }
    }
}
