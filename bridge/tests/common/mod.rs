//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dida_bridge::checklist::SEARCH_QUERY;
use dida_bridge::config::EngineConfig;
use dida_bridge::error::{HostError, RemoteError};
use dida_bridge::host::{Note, NoteStore, NoteUpdate, Page, Tag};
use dida_bridge::remote::{TaskFeed, TaskService};
use dida_bridge::task::Task;

/// Engine settings with short windows for tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        debounce: Duration::from_millis(50),
        sweep_cooldown: Duration::ZERO,
        ..EngineConfig::default()
    }
}

pub fn note(id: &str, title: &str, body: &str, source_url: &str) -> Note {
    Note {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        source_url: source_url.to_string(),
        ..Note::default()
    }
}

pub fn tag(title: &str) -> Tag {
    Tag {
        id: title.to_lowercase(),
        title: title.to_string(),
    }
}

/// Note store backed by a map.
///
/// Search understands the checklist query and `sourceurl:*...*` patterns, and
/// pages results `page_size` at a time in id order.
pub struct FakeStore {
    notes: Mutex<BTreeMap<String, Note>>,
    tags: Mutex<HashMap<String, Vec<Tag>>>,
    updates: Mutex<Vec<(String, NoteUpdate)>>,
    selected: Mutex<Option<String>>,
    broken_notes: Mutex<HashSet<String>>,
    page_size: AtomicUsize,
    fail_search: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            notes: Mutex::new(BTreeMap::new()),
            tags: Mutex::new(HashMap::new()),
            updates: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
            broken_notes: Mutex::new(HashSet::new()),
            page_size: AtomicUsize::new(100),
            fail_search: AtomicBool::new(false),
        })
    }

    pub fn put(&self, note: Note) {
        self.notes.lock().unwrap().insert(note.id.clone(), note);
    }

    pub fn get(&self, id: &str) -> Note {
        self.notes.lock().unwrap()[id].clone()
    }

    pub fn set_tags(&self, id: &str, tags: Vec<Tag>) {
        self.tags.lock().unwrap().insert(id.to_string(), tags);
    }

    pub fn set_body(&self, id: &str, body: &str) {
        if let Some(note) = self.notes.lock().unwrap().get_mut(id) {
            note.body = body.to_string();
        }
    }

    pub fn select(&self, id: &str) {
        *self.selected.lock().unwrap() = Some(id.to_string());
    }

    /// Makes every tag lookup for `id` fail.
    pub fn break_note(&self, id: &str) {
        self.broken_notes.lock().unwrap().insert(id.to_string());
    }

    pub fn set_page_size(&self, size: usize) {
        self.page_size.store(size, Ordering::SeqCst);
    }

    pub fn fail_search(&self) {
        self.fail_search.store(true, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<(String, NoteUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn body_writes(&self) -> usize {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, update)| update.body.is_some())
            .count()
    }

    pub fn link_writes(&self) -> usize {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, update)| update.source_url.is_some())
            .count()
    }

    fn matches(query: &str, note: &Note) -> bool {
        if query == SEARCH_QUERY {
            return note.body.contains("- [");
        }
        match query.strip_prefix("sourceurl:") {
            Some(pattern) => note.source_url.contains(pattern.trim_matches('*')),
            None => note.body.contains(query),
        }
    }
}

#[async_trait]
impl NoteStore for FakeStore {
    async fn note(&self, id: &str) -> Result<Note, HostError> {
        self.notes
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(id.to_string()))
    }

    async fn note_tags(&self, id: &str) -> Result<Vec<Tag>, HostError> {
        if self.broken_notes.lock().unwrap().contains(id) {
            return Err(HostError::Status {
                status: 500,
                message: "tag lookup failed".to_string(),
            });
        }
        Ok(self.tags.lock().unwrap().get(id).cloned().unwrap_or_default())
    }

    async fn update_note(&self, id: &str, update: NoteUpdate) -> Result<(), HostError> {
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get_mut(id)
            .ok_or_else(|| HostError::NotFound(id.to_string()))?;
        if let Some(source_url) = &update.source_url {
            note.source_url.clone_from(source_url);
        }
        if let Some(body) = &update.body {
            note.body.clone_from(body);
        }
        if let Some(is_todo) = update.is_todo {
            note.is_todo = is_todo;
        }
        self.updates.lock().unwrap().push((id.to_string(), update));
        Ok(())
    }

    async fn search(&self, query: &str, page: u32) -> Result<Page<Note>, HostError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(HostError::Status {
                status: 500,
                message: "search failed".to_string(),
            });
        }

        let size = self.page_size.load(Ordering::SeqCst);
        let hits: Vec<Note> = self
            .notes
            .lock()
            .unwrap()
            .values()
            .filter(|note| Self::matches(query, note))
            .cloned()
            .collect();

        let start = (page as usize - 1) * size;
        let items: Vec<Note> = hits.iter().skip(start).take(size).cloned().collect();
        Ok(Page {
            has_more: start + items.len() < hits.len(),
            items,
        })
    }

    async fn selected_note(&self) -> Result<Option<Note>, HostError> {
        let selected = self.selected.lock().unwrap().clone();
        Ok(selected.and_then(|id| self.notes.lock().unwrap().get(&id).cloned()))
    }
}

/// Remote task service that assigns ids `task-1`, `task-2`, ...
pub struct FakeService {
    creates: AtomicUsize,
    updates: AtomicUsize,
    fail: AtomicBool,
    empty: AtomicBool,
    delay: Mutex<Duration>,
    sent: Mutex<Vec<Task>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            empty: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.creates() + self.updates()
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    /// Accepts calls but answers with an empty body.
    pub fn reply_empty(&self) {
        self.empty.store(true, Ordering::SeqCst);
    }

    /// Makes every create take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn last_sent(&self) -> Option<Task> {
        self.sent.lock().unwrap().last().cloned()
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TaskService for FakeService {
    async fn create_task(&self, task: &Task) -> Result<Option<Task>, RemoteError> {
        self.check()?;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(task.clone());
        if self.empty.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut created = task.clone();
        created.id = Some(format!("task-{n}"));
        Ok(Some(created))
    }

    async fn update_task(&self, task: &Task) -> Result<Option<Task>, RemoteError> {
        self.check()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(task.clone());
        if self.empty.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(task.clone()))
    }
}

/// Task feed returning a fixed list.
pub struct FakeFeed {
    tasks: Mutex<Vec<Task>>,
    fail: AtomicBool,
}

impl FakeFeed {
    pub fn new(tasks: Vec<Task>) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            fail: AtomicBool::new(false),
        })
    }

    pub fn set(&self, tasks: Vec<Task>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskFeed for FakeFeed {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, RemoteError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 401,
                message: "login required".to_string(),
            });
        }
        Ok(self.tasks.lock().unwrap().clone())
    }
}
