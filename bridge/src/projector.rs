//! Projects remote completion state back into note checklists.
//!
//! When a subtask is ticked off remotely, the linked note's matching checklist
//! line gets its marker flipped. The note body is written only when at least
//! one marker actually changed, so replaying the same snapshot is free.

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::cache::TaskCache;
use crate::checklist::{Checklist, DONE_MARKER, OPEN_MARKER};
use crate::error::Result;
use crate::host::{NoteStore, NoteUpdate};
use crate::link::{self, DIDA_PREFIX};
use crate::task::{Subtask, Task};

/// Result of [`StatusProjector::apply_remote_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// No note is linked to the remote task.
    NoLinkedNote,
    /// The note already reflects the remote state.
    Unchanged { note_id: String },
    /// Markers were flipped and the body was written.
    Updated { note_id: String, flipped: usize },
}

/// Writes remote subtask status into linked notes.
#[derive(Clone)]
pub struct StatusProjector {
    store: Arc<dyn NoteStore>,
    cache: TaskCache,
}

impl StatusProjector {
    #[must_use]
    pub fn new(store: Arc<dyn NoteStore>, cache: TaskCache) -> Self {
        Self { store, cache }
    }

    /// Rewrites the linked note's markers to match `remote`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Host` if the note store cannot be searched, read
    /// or written.
    pub async fn apply_remote_status(&self, remote: &Task) -> Result<ProjectionOutcome> {
        let Some(task_id) = remote.id.as_deref() else {
            return Ok(ProjectionOutcome::NoLinkedNote);
        };

        let _guard = self.cache.lock(task_id).await;

        let Some(note_id) = self.find_linked_note(task_id).await? else {
            debug!(task_id = %task_id, "No note linked to remote task");
            return Ok(ProjectionOutcome::NoLinkedNote);
        };

        let note = self.store.note(&note_id).await?;
        let (body, flipped) = project_markers(&note.body, &remote.items);

        if body == note.body {
            debug!(note_id = %note_id, task_id = %task_id, "Note already matches remote status");
            return Ok(ProjectionOutcome::Unchanged { note_id });
        }

        self.store
            .update_note(&note_id, NoteUpdate::body(body))
            .await?;
        info!(
            note_id = %note_id,
            task_id = %task_id,
            flipped,
            "Note updated from remote task status"
        );

        Ok(ProjectionOutcome::Updated { note_id, flipped })
    }

    /// Finds the note whose link field points at `task_id`.
    ///
    /// The host search is a substring match, so hits are confirmed against the
    /// decoded link field.
    async fn find_linked_note(&self, task_id: &str) -> Result<Option<String>> {
        let query = format!("sourceurl:*{DIDA_PREFIX}{task_id}*");
        let page = self.store.search(&query, 1).await?;

        Ok(page
            .items
            .into_iter()
            .find(|note| link::task_id(&note.source_url).as_deref() == Some(task_id))
            .map(|note| note.id))
    }
}

/// Flips checklist markers in `body` to agree with `items`.
///
/// Each checklist line is matched against the first subtask whose title occurs
/// in the line. Returns the new body and the number of flipped markers.
#[must_use]
pub fn project_markers(body: &str, items: &[Subtask]) -> (String, usize) {
    let mut projected = body.to_string();
    let mut flipped = 0;

    for line in Checklist::new(body) {
        let text = &body[line.span.clone()];
        let Some(subtask) = items
            .iter()
            .find(|s| !s.title.is_empty() && text.contains(s.title.as_str()))
        else {
            continue;
        };

        let done = subtask.status.is_done();
        if done == line.done {
            continue;
        }

        trace!(line = %text, done, "Flipping checklist marker");
        // Both markers are three bytes long, so later spans stay valid.
        projected.replace_range(line.marker, if done { DONE_MARKER } else { OPEN_MARKER });
        flipped += 1;
    }

    (projected, flipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn subtask(title: &str, status: TaskStatus) -> Subtask {
        Subtask {
            title: title.to_string(),
            status,
            ..Subtask::default()
        }
    }

    #[test]
    fn flips_open_marker_to_done() {
        let (body, flipped) =
            project_markers("- [ ] Buy milk", &[subtask("Buy milk", TaskStatus::Done)]);
        assert_eq!(body, "- [x] Buy milk");
        assert_eq!(flipped, 1);
    }

    #[test]
    fn flips_done_marker_to_open() {
        let (body, flipped) =
            project_markers("- [X] Buy milk", &[subtask("Buy milk", TaskStatus::Open)]);
        assert_eq!(body, "- [ ] Buy milk");
        assert_eq!(flipped, 1);
    }

    #[test]
    fn agreeing_markers_are_left_alone() {
        let body = "- [x] Buy milk\n- [ ] Walk dog";
        let items = [
            subtask("Buy milk", TaskStatus::Done),
            subtask("Walk dog", TaskStatus::Open),
        ];
        let (projected, flipped) = project_markers(body, &items);
        assert_eq!(projected, body);
        assert_eq!(flipped, 0);
    }

    #[test]
    fn only_matching_lines_change() {
        let body = "# List\n- [ ] eggs\nprose\n- [ ] flour\n  - [ ] sugar +baking";
        let items = [
            subtask("sugar", TaskStatus::Done),
            subtask("eggs", TaskStatus::Done),
        ];
        let (projected, flipped) = project_markers(body, &items);
        assert_eq!(
            projected,
            "# List\n- [x] eggs\nprose\n- [ ] flour\n  - [x] sugar +baking"
        );
        assert_eq!(flipped, 2);
    }

    #[test]
    fn first_matching_subtask_decides() {
        // "milk" matches first and agrees, so the later "Buy milk" is not consulted
        let items = [
            subtask("milk", TaskStatus::Open),
            subtask("Buy milk", TaskStatus::Done),
        ];
        let (projected, _) = project_markers("- [ ] Buy milk", &items);
        assert_eq!(projected, "- [ ] Buy milk");
    }

    #[test]
    fn empty_titles_never_match() {
        let (projected, flipped) =
            project_markers("- [ ] anything", &[subtask("", TaskStatus::Done)]);
        assert_eq!(projected, "- [ ] anything");
        assert_eq!(flipped, 0);
    }

    #[test]
    fn projection_is_idempotent() {
        let items = [subtask("Buy milk", TaskStatus::Done)];
        let (once, _) = project_markers("- [ ] Buy milk", &items);
        let (twice, flipped) = project_markers(&once, &items);
        assert_eq!(once, twice);
        assert_eq!(flipped, 0);
    }
}
