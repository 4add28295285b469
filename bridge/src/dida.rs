//! Dida365 web API client.
//!
//! Implements [`TaskService`] and [`TaskFeed`] with the session cookie of a
//! logged-in web client. The cookie is sent as-is on every request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::remote::{TaskFeed, TaskService};
use crate::task::Task;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Full-state sync endpoint; checkpoint `0` returns every open task.
const BATCH_CHECK_PATH: &str = "/api/v2/batch/check/0";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchCheck {
    #[serde(default)]
    sync_task_bean: SyncTaskBean,
}

#[derive(Debug, Default, Deserialize)]
struct SyncTaskBean {
    #[serde(default)]
    update: Vec<Task>,
}

/// Client for the Dida365 web API.
#[derive(Debug, Clone)]
pub struct DidaClient {
    client: Client,
    base_url: String,
}

impl DidaClient {
    /// Creates a client for the API at `base_url`, authenticated by `cookie`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::InvalidHeader` if the cookie is not a valid
    /// header value, or `RemoteError::Http` if the client cannot be built.
    pub fn new(base_url: impl Into<String>, cookie: &str) -> Result<Self, RemoteError> {
        let mut cookie = HeaderValue::from_str(cookie)?;
        cookie.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie);

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_task(&self, path: &str, task: &Task) -> Result<Option<Task>, RemoteError> {
        debug!(url = %path, title = %task.title, "Sending task");
        let response = self.client.post(self.url(path)).json(task).send().await?;
        read_optional_task(response).await
    }
}

#[async_trait]
impl TaskService for DidaClient {
    async fn create_task(&self, task: &Task) -> Result<Option<Task>, RemoteError> {
        self.post_task("/api/v2/task", task).await
    }

    async fn update_task(&self, task: &Task) -> Result<Option<Task>, RemoteError> {
        let Some(id) = task.id.as_deref() else {
            warn!(title = %task.title, "Cannot update a task without id");
            return Ok(None);
        };
        self.post_task(&format!("/api/v2/task/{id}"), task).await
    }
}

#[async_trait]
impl TaskFeed for DidaClient {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, RemoteError> {
        let response = self.client.get(self.url(BATCH_CHECK_PATH)).send().await?;
        let body = success_body(response).await?;
        let batch: BatchCheck = serde_json::from_str(&body)?;
        Ok(batch.sync_task_bean.update)
    }
}

async fn success_body(response: Response) -> Result<String, RemoteError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(RemoteError::Status {
            status: status.as_u16(),
            message: body,
        })
    }
}

/// Decodes a task reply. An empty or `null` body means no task came back.
async fn read_optional_task(response: Response) -> Result<Option<Task>, RemoteError> {
    let body = success_body(response).await?;
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(body)?))
}
