//! Host note store interface.
//!
//! The engine never talks to Joplin directly. It goes through [`NoteStore`],
//! which the [`crate::joplin`] module implements over the Joplin Data API and
//! tests implement in memory.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::HostError;

/// Fields requested whenever a note is read.
pub const NOTE_FIELDS: &str = "id,title,parent_id,body,source_url,is_todo";

/// A host note.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub body: String,
    /// Link field holding the remote task id (see [`crate::link`]).
    #[serde(default)]
    pub source_url: String,
    #[serde(default, with = "int_bool")]
    pub is_todo: bool,
}

/// A tag attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: String,
    pub title: String,
}

/// Partial note update. Unset fields are left untouched by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "int_bool::serialize_option"
    )]
    pub is_todo: Option<bool>,
}

impl NoteUpdate {
    /// Update that rewrites the link field.
    #[must_use]
    pub fn source_url(value: String) -> Self {
        Self {
            source_url: Some(value),
            ..Self::default()
        }
    }

    /// Update that rewrites the body.
    #[must_use]
    pub fn body(value: String) -> Self {
        Self {
            body: Some(value),
            ..Self::default()
        }
    }

    /// Update that sets the to-do flag.
    #[must_use]
    pub fn is_todo(value: bool) -> Self {
        Self {
            is_todo: Some(value),
            ..Self::default()
        }
    }
}

/// One page of a paginated host listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

/// Host note storage and search.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Reads a note with the fields in [`NOTE_FIELDS`].
    async fn note(&self, id: &str) -> Result<Note, HostError>;

    /// Lists the tags attached to a note, in host order.
    async fn note_tags(&self, id: &str) -> Result<Vec<Tag>, HostError>;

    /// Applies a partial update to a note.
    async fn update_note(&self, id: &str, update: NoteUpdate) -> Result<(), HostError>;

    /// Runs a search query and returns the requested page, starting at 1.
    async fn search(&self, query: &str, page: u32) -> Result<Page<Note>, HostError>;

    /// Returns the note currently open in the host UI, if any.
    async fn selected_note(&self) -> Result<Option<Note>, HostError>;
}

/// Joplin stores booleans as `0`/`1`; accept both forms.
mod int_bool {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn serialize_option<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(flag) => serialize(flag, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Flag>::deserialize(deserializer)? {
            Some(Flag::Bool(flag)) => flag,
            Some(Flag::Int(n)) => n != 0,
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_accepts_integer_flags() {
        let note: Note =
            serde_json::from_str(r#"{"id": "n1", "title": "T", "body": "", "is_todo": 1}"#)
                .unwrap();
        assert!(note.is_todo);
        assert_eq!(note.source_url, "");

        let note: Note = serde_json::from_str(r#"{"id": "n2", "is_todo": false}"#).unwrap();
        assert!(!note.is_todo);

        let note: Note = serde_json::from_str(r#"{"id": "n3", "is_todo": null}"#).unwrap();
        assert!(!note.is_todo);
    }

    #[test]
    fn note_update_serializes_only_set_fields() {
        let value = serde_json::to_value(NoteUpdate::is_todo(true)).unwrap();
        assert_eq!(value, serde_json::json!({"is_todo": 1}));

        let value = serde_json::to_value(NoteUpdate::source_url("dida_x".to_string())).unwrap();
        assert_eq!(value, serde_json::json!({"source_url": "dida_x"}));
    }

    #[test]
    fn page_defaults() {
        let page: Page<Tag> = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }
}
