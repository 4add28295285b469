//! dida-bridge - mirrors Joplin note checklists as Dida365 tasks.
//!
//! Every note whose body contains a Markdown checklist becomes one remote task,
//! with one subtask per checklist line. Edits in Joplin are pushed to Dida365,
//! and subtasks completed in Dida365 are ticked off in the note.
//!
//! # Overview
//!
//! The link between a note and its task lives in the note's `source_url`
//! field, next to any links other tools keep there. The engine is stateless
//! apart from an in-memory [`TaskCache`] of remote snapshots, which is filled
//! by the [`feed`] and by the engine's own writes.
//!
//! # Modules
//!
//! - [`link`]: Encoding of remote ids in the note link field
//! - [`checklist`]: Checklist line tokenizer
//! - [`task`]: Task model built from a note
//! - [`cache`]: Shared snapshot cache with per-task locks
//! - [`reconcile`]: Note to remote task reconciliation
//! - [`projector`]: Remote status back into note checklists
//! - [`scheduler`]: Debounced and bulk sync triggers
//! - [`feed`]: Remote snapshot polling
//! - [`host`]: Note store interface
//! - [`remote`]: Remote task service interface
//! - [`joplin`]: Joplin Data API client
//! - [`dida`]: Dida365 web API client
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types
//! - [`utils`]: Shared utilities (debouncing)

pub mod cache;
pub mod checklist;
pub mod config;
pub mod dida;
pub mod error;
pub mod feed;
pub mod host;
pub mod joplin;
pub mod link;
pub mod projector;
pub mod reconcile;
pub mod remote;
pub mod scheduler;
pub mod task;
pub mod utils;

pub use cache::TaskCache;
pub use checklist::{Checklist, ChecklistItem};
pub use config::{Config, EngineConfig};
pub use dida::DidaClient;
pub use error::{BridgeError, HostError, RemoteError, Result};
pub use feed::{FeedReport, RemoteFeed};
pub use host::{Note, NoteStore, NoteUpdate, Page, Tag};
pub use joplin::{ChangeBatch, JoplinClient};
pub use projector::{ProjectionOutcome, StatusProjector};
pub use reconcile::{Reconciler, SkipReason, SyncOutcome};
pub use remote::{TaskFeed, TaskService};
pub use scheduler::{ScanScheduler, SweepReport};
pub use task::{Subtask, Task, TaskStatus};
pub use utils::{Debouncer, DebouncerError};
