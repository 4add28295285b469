//! Task model shared by the reconciler, the projector and the remote adapters.
//!
//! A [`Task`] is rebuilt from a note's body on every sync and is never stored
//! on its own. Its JSON form matches the Dida365 task shape, so the same type
//! is used for the cached remote snapshots.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::checklist::{parse_start_date, Checklist};

/// Completion state of a task or subtask.
///
/// Serialized as the Dida365 integer status: `0` for open, `2` for done.
/// Any nonzero value reads back as done, including `-1` ("won't do").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "i64", into = "u8")]
pub enum TaskStatus {
    #[default]
    Open,
    Done,
}

impl TaskStatus {
    /// Status for a checklist marker.
    #[must_use]
    pub fn from_done(done: bool) -> Self {
        if done {
            Self::Done
        } else {
            Self::Open
        }
    }

    /// Returns true for [`TaskStatus::Done`].
    #[must_use]
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl From<i64> for TaskStatus {
    fn from(value: i64) -> Self {
        if value == 0 {
            Self::Open
        } else {
            Self::Done
        }
    }
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Open => 0,
            TaskStatus::Done => 2,
        }
    }
}

/// One checklist item of a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Local id, `"{note_id}-{index}"`.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "dida_date"
    )]
    pub start_date: Option<DateTime<Utc>>,
}

/// A note's aggregate to-do state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Remote id, absent until the task has been created remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Subtask>,
    /// Union of the tags of all open subtasks.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeSet<String>,
}

impl Task {
    /// Builds a task from a note's title and body.
    ///
    /// Subtask ids are derived from `note_id` and the line's position, so they
    /// stay stable only while the line order does not change. Unparseable date
    /// tokens leave `start_date` unset.
    #[must_use]
    pub fn from_note(note_id: &str, title: &str, body: &str) -> Self {
        let mut items = Vec::new();
        let mut tags = BTreeSet::new();

        for (index, line) in Checklist::new(body).enumerate() {
            if !line.done {
                tags.extend(line.tags.iter().cloned());
            }

            items.push(Subtask {
                id: format!("{note_id}-{index}"),
                title: line.message,
                status: TaskStatus::from_done(line.done),
                start_date: line.date.as_deref().and_then(parse_start_date),
            });
        }

        let status = status_of(&items);
        Self {
            id: None,
            title: title.to_string(),
            status,
            items,
            tags,
        }
    }

    /// Returns true when no subtask is open. Vacuously true without subtasks.
    #[must_use]
    pub fn all_finished(&self) -> bool {
        self.items.iter().all(|item| item.status.is_done())
    }

    /// Structural comparison against a cached snapshot.
    ///
    /// Two tasks are equal when they share the title and the status and carry
    /// the same items by title and status, in any order. Ids, tags and dates
    /// are not compared.
    #[must_use]
    pub fn content_equals(&self, other: &Task) -> bool {
        self.title == other.title
            && self.status == other.status
            && item_keys(&self.items) == item_keys(&other.items)
    }
}

/// Derives the task status from its items.
#[must_use]
pub fn status_of(items: &[Subtask]) -> TaskStatus {
    TaskStatus::from_done(items.iter().all(|item| item.status.is_done()))
}

fn item_keys(items: &[Subtask]) -> Vec<(&str, TaskStatus)> {
    let mut keys: Vec<_> = items
        .iter()
        .map(|item| (item.title.as_str(), item.status))
        .collect();
    keys.sort_unstable();
    keys
}

/// Treats an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Dida365 timestamps, e.g. `2024-05-01T00:00:00.000+0000`.
mod dida_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    /// Unreadable timestamps decode as `None` rather than failing the task.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|s| {
            DateTime::parse_from_str(&s, FORMAT)
                .or_else(|_| DateTime::parse_from_rfc3339(&s))
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }
}
