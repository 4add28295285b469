//! Joplin Data API client.
//!
//! Implements [`NoteStore`] over the REST service the Joplin desktop app
//! exposes (by default on `http://localhost:41184`). Every request carries the
//! API token as the `token` query parameter.
//!
//! The Data API has no notion of the note currently open in the editor, so
//! [`NoteStore::selected_note`] always fails with [`HostError::Unsupported`].
//! Change detection uses the `/events` change log instead, see
//! [`JoplinClient::poll_changes`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::HostError;
use crate::host::{Note, NoteStore, NoteUpdate, Page, Tag, NOTE_FIELDS};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// `item_type` of notes in the change log.
const ITEM_TYPE_NOTE: u8 = 1;

/// Change log `type` for deletions.
const CHANGE_TYPE_DELETE: u8 = 3;

/// Notes changed since a change log cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Created or updated notes, oldest first, without duplicates.
    pub note_ids: Vec<String>,
    /// Cursor to pass to the next call.
    pub cursor: String,
    /// More changes are waiting behind `cursor`.
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
struct EventPage {
    #[serde(default)]
    items: Vec<ChangeEvent>,
    cursor: Cursor,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ChangeEvent {
    item_type: u8,
    item_id: String,
    #[serde(rename = "type")]
    change: u8,
}

/// Joplin returns the cursor as a string, older versions as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Cursor {
    Text(String),
    Number(u64),
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        match cursor {
            Cursor::Text(text) => text,
            Cursor::Number(n) => n.to_string(),
        }
    }
}

/// Client for the Joplin Data API.
#[derive(Debug, Clone)]
pub struct JoplinClient {
    client: Client,
    base_url: String,
    token: String,
}

impl JoplinClient {
    /// Creates a client for the Data API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, HostError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Returns the notes created or updated after `cursor`.
    ///
    /// Without a cursor, Joplin only reports the current position of the log,
    /// so the first call yields no ids and a cursor to start from.
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the request fails or the host rejects it.
    pub async fn poll_changes(&self, cursor: Option<&str>) -> Result<ChangeBatch, HostError> {
        let mut request = self.get("/events");
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let page: EventPage = read_json(request.send().await?, "events").await?;

        let mut note_ids: Vec<String> = Vec::new();
        for event in page.items {
            if event.item_type != ITEM_TYPE_NOTE || event.change == CHANGE_TYPE_DELETE {
                continue;
            }
            if !note_ids.contains(&event.item_id) {
                note_ids.push(event.item_id);
            }
        }

        trace!(changed = note_ids.len(), "Polled Joplin change log");

        Ok(ChangeBatch {
            note_ids,
            cursor: page.cursor.into(),
            has_more: page.has_more,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .query(&[("token", self.token.as_str())])
    }
}

#[async_trait]
impl NoteStore for JoplinClient {
    async fn note(&self, id: &str) -> Result<Note, HostError> {
        let response = self
            .get(&format!("/notes/{id}"))
            .query(&[("fields", NOTE_FIELDS)])
            .send()
            .await?;
        read_json(response, id).await
    }

    async fn note_tags(&self, id: &str) -> Result<Vec<Tag>, HostError> {
        let response = self.get(&format!("/notes/{id}/tags")).send().await?;
        let page: Page<Tag> = read_json(response, id).await?;
        Ok(page.items)
    }

    async fn update_note(&self, id: &str, update: NoteUpdate) -> Result<(), HostError> {
        debug!(note_id = %id, "Updating Joplin note");
        let response = self
            .client
            .put(self.url(&format!("/notes/{id}")))
            .query(&[("token", self.token.as_str())])
            .json(&update)
            .send()
            .await?;
        check_status(response, id).await.map(drop)
    }

    async fn search(&self, query: &str, page: u32) -> Result<Page<Note>, HostError> {
        let response = self
            .get("/search")
            .query(&[("query", query), ("fields", NOTE_FIELDS)])
            .query(&[("page", page)])
            .send()
            .await?;
        read_json(response, query).await
    }

    async fn selected_note(&self) -> Result<Option<Note>, HostError> {
        Err(HostError::Unsupported("selected note"))
    }
}

async fn check_status(response: Response, subject: &str) -> Result<Response, HostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(HostError::NotFound(subject.to_string()));
    }

    let message = response.text().await.unwrap_or_default();
    Err(HostError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response, subject: &str) -> Result<T, HostError> {
    let response = check_status(response, subject).await?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_page_accepts_numeric_cursor() {
        let page: EventPage = serde_json::from_str(
            r#"{"items": [{"item_type": 1, "item_id": "n1", "type": 2}], "cursor": 42}"#,
        )
        .unwrap();
        assert_eq!(String::from(page.cursor), "42");
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more);
    }

    #[test]
    fn base_url_is_normalized() {
        let client = JoplinClient::new("http://localhost:41184/", "t").unwrap();
        assert_eq!(client.url("/notes/a"), "http://localhost:41184/notes/a");
    }
}
