//! Remote task service interface.
//!
//! [`crate::dida`] implements these traits over the Dida365 web API.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::task::Task;

/// Create and update calls against the remote task service.
///
/// `Ok(None)` means the service accepted the call but returned no task, which
/// callers treat the same as "nothing changed".
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Creates a remote task and returns the stored snapshot.
    async fn create_task(&self, task: &Task) -> Result<Option<Task>, RemoteError>;

    /// Updates the remote task identified by `task.id`.
    async fn update_task(&self, task: &Task) -> Result<Option<Task>, RemoteError>;
}

/// Source of remote task snapshots for the cache feed.
#[async_trait]
pub trait TaskFeed: Send + Sync {
    /// Fetches the current snapshot of every remote task.
    async fn fetch_tasks(&self) -> Result<Vec<Task>, RemoteError>;
}
