//! Snapshot cache of remote tasks.
//!
//! The cache is a cheap-to-clone handle shared by the reconciler, the status
//! projector and the remote feed. Snapshots may lag behind the remote service.
//!
//! # Per-task exclusivity
//!
//! A sync step reads the cache, awaits a remote call and then writes the note.
//! [`TaskCache::lock`] hands out a per-task-id guard that is held across that
//! whole sequence. [`TaskCache::ingest`] takes the same guard, so a feed
//! update for a task waits until an in-flight sync of that task is done.
//! [`TaskCache::lock_note`] does the same for a note, covering syncs of notes
//! that have no task yet. Lock slots are dropped once nobody holds them.
//!
//! # Example
//!
//! ```
//! use dida_bridge::cache::TaskCache;
//! use dida_bridge::task::Task;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = TaskCache::new();
//! let task = Task { id: Some("t1".to_string()), ..Task::default() };
//!
//! cache.ingest(task.clone()).await;
//! assert_eq!(cache.get("t1").await, Some(task));
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{trace, warn};

use crate::task::Task;

/// Lock slots by key. Only touched synchronously, never across an await.
type LockTable = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Guard returned by [`TaskCache::lock`] and [`TaskCache::lock_note`].
///
/// Dropping the guard releases the lock and frees the slot once nobody else
/// holds or waits for it.
#[derive(Debug)]
pub struct TaskGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    slot: Arc<Mutex<()>>,
    locks: LockTable,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference is the table's, the other is ours.
        if Arc::strong_count(&self.slot) == 2
            && locks
                .get(&self.key)
                .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
        {
            locks.remove(&self.key);
        }
    }
}

/// Shared snapshot store keyed by remote task id.
#[derive(Debug, Clone, Default)]
pub struct TaskCache {
    entries: Arc<RwLock<HashMap<String, Task>>>,
    locks: LockTable,
}

impl TaskCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the snapshot for `id`.
    pub async fn get(&self, id: &str) -> Option<Task> {
        self.entries.read().await.get(id).cloned()
    }

    /// Stores a snapshot without taking its task lock.
    ///
    /// Used by callers that already hold the guard for the task. Snapshots
    /// without an id are ignored.
    pub async fn insert(&self, task: Task) {
        let Some(id) = task.id.clone() else {
            warn!(title = %task.title, "Ignoring task snapshot without id");
            return;
        };
        trace!(task_id = %id, "Caching task snapshot");
        self.entries.write().await.insert(id, task);
    }

    /// Takes the task lock, then stores the snapshot.
    pub async fn ingest(&self, task: Task) {
        let Some(id) = task.id.clone() else {
            warn!(title = %task.title, "Ignoring task snapshot without id");
            return;
        };
        let _guard = self.lock(&id).await;
        self.insert(task).await;
    }

    /// Acquires the exclusive guard for a task id.
    pub async fn lock(&self, id: &str) -> TaskGuard {
        self.acquire(id.to_string()).await
    }

    /// Acquires the exclusive guard for a note that has no remote task yet.
    ///
    /// Note keys live in their own namespace and never collide with task ids.
    pub async fn lock_note(&self, note_id: &str) -> TaskGuard {
        self.acquire(format!("note:{note_id}")).await
    }

    async fn acquire(&self, key: String) -> TaskGuard {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;

        TaskGuard {
            guard: Some(guard),
            key,
            slot,
            locks: Arc::clone(&self.locks),
        }
    }

    /// Returns the number of cached snapshots.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if no snapshot is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    #[cfg(test)]
    fn lock_slots(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
