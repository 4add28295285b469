//! Integration tests for debounced and bulk sync scheduling.

mod common;

use std::time::Duration;

use common::{fast_config, note, FakeFeed, FakeService, FakeStore};
use dida_bridge::cache::TaskCache;
use dida_bridge::config::{DebounceTarget, EngineConfig};
use dida_bridge::feed::RemoteFeed;
use dida_bridge::projector::StatusProjector;
use dida_bridge::reconcile::Reconciler;
use dida_bridge::scheduler::ScanScheduler;
use dida_bridge::task::Task;
use tokio::time::sleep;

fn scheduler(
    store: &std::sync::Arc<FakeStore>,
    remote: &std::sync::Arc<FakeService>,
    config: &EngineConfig,
) -> ScanScheduler {
    let reconciler = Reconciler::new(store.clone(), remote.clone(), TaskCache::new(), config);
    ScanScheduler::new(reconciler, config)
}

// =============================================================================
// Bulk sweep
// =============================================================================

#[tokio::test]
async fn test_sweep_walks_every_page() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.set_page_size(2);
    store.put(note("a", "A", "- [ ] one", ""));
    store.put(note("b", "B", "- [ ] two", ""));
    store.put(note("c", "C", "- [x] three", ""));
    store.put(note("d", "D", "no checklist here", ""));
    store.put(note("e", "E", "- [ ] five", ""));

    let scheduler = scheduler(&store, &remote, &fast_config());
    let report = scheduler.check_all_notes().await.unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.notes, 4);
    assert_eq!(report.created, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(remote.creates(), 3);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_sweep_continues_past_failing_note() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("a", "A", "- [ ] one", ""));
    store.put(note("b", "B", "- [ ] two", ""));
    store.break_note("a");

    let scheduler = scheduler(&store, &remote, &fast_config());
    let report = scheduler.check_all_notes().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.created, 1);
    assert_eq!(store.get("b").source_url, "dida_task-1");

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_sweep_stops_on_search_failure() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.fail_search();

    let scheduler = scheduler(&store, &remote, &fast_config());

    assert!(scheduler.check_all_notes().await.is_err());
    assert_eq!(remote.calls(), 0);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_second_sweep_is_idempotent() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("a", "A", "- [ ] one", ""));

    let scheduler = scheduler(&store, &remote, &fast_config());
    scheduler.check_all_notes().await.unwrap();
    let report = scheduler.check_all_notes().await.unwrap();

    assert_eq!(report.in_sync, 1);
    assert_eq!(remote.calls(), 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_refreshed_sweep_recognizes_linked_notes() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("a", "A", "- [ ] one", "dida_t1"));

    let mut linked = Task::from_note("a", "A", "- [ ] one");
    linked.id = Some("t1".to_string());
    let source = FakeFeed::new(vec![linked]);

    let cache = TaskCache::new();
    let feed = RemoteFeed::new(
        source.clone(),
        cache.clone(),
        StatusProjector::new(store.clone(), cache.clone()),
    );
    let reconciler = Reconciler::new(store.clone(), remote.clone(), cache, &fast_config());
    let scheduler = ScanScheduler::new(reconciler, &fast_config());

    let report = scheduler.refresh_and_sweep(&feed).await.unwrap();

    assert_eq!(report.in_sync, 1);
    assert_eq!(remote.calls(), 0);
    assert_eq!(store.get("a").source_url, "dida_t1");

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_sweep_skipped_when_remote_fetch_fails() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("a", "A", "- [ ] one", "dida_t1"));
    store.put(note("b", "B", "- [ ] two", ""));

    let source = FakeFeed::new(Vec::new());
    source.fail();
    let cache = TaskCache::new();
    let feed = RemoteFeed::new(
        source.clone(),
        cache.clone(),
        StatusProjector::new(store.clone(), cache.clone()),
    );
    let reconciler = Reconciler::new(store.clone(), remote.clone(), cache, &fast_config());
    let scheduler = ScanScheduler::new(reconciler, &fast_config());

    assert!(scheduler.refresh_and_sweep(&feed).await.is_err());
    assert_eq!(remote.calls(), 0, "linked notes must not be recreated");
    assert_eq!(store.link_writes(), 0);
    assert_eq!(store.get("a").source_url, "dida_t1");

    scheduler.shutdown().await;
}

// =============================================================================
// Debounced trigger
// =============================================================================

#[tokio::test]
async fn test_burst_of_edits_syncs_once() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("n1", "T", "- [ ] a", ""));

    let scheduler = scheduler(&store, &remote, &fast_config());
    for _ in 0..10 {
        scheduler.note_changed("n1").await.unwrap();
    }

    sleep(Duration::from_millis(20)).await;
    assert_eq!(remote.calls(), 0, "nothing runs before the window closes");

    sleep(Duration::from_millis(300)).await;
    assert_eq!(remote.creates(), 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_changed_note_target_syncs_each_note() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("n1", "One", "- [ ] a", ""));
    store.put(note("n2", "Two", "- [ ] b", ""));

    let scheduler = scheduler(&store, &remote, &fast_config());
    scheduler.note_changed("n1").await.unwrap();
    scheduler.note_changed("n2").await.unwrap();

    sleep(Duration::from_millis(300)).await;

    assert_eq!(remote.creates(), 2);
    assert!(!store.get("n1").source_url.is_empty());
    assert!(!store.get("n2").source_url.is_empty());

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_selected_note_target_syncs_open_note() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("n1", "One", "- [ ] a", ""));
    store.put(note("n2", "Two", "- [ ] b", ""));
    store.select("n2");

    let config = EngineConfig {
        debounce_target: DebounceTarget::SelectedNote,
        ..fast_config()
    };
    let scheduler = scheduler(&store, &remote, &config);
    scheduler.note_changed("n1").await.unwrap();
    scheduler.note_changed("n2").await.unwrap();

    sleep(Duration::from_millis(300)).await;

    assert_eq!(remote.creates(), 1);
    assert_eq!(store.get("n1").source_url, "");
    assert_eq!(store.get("n2").source_url, "dida_task-1");

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_flushes_pending_edits() {
    let store = FakeStore::new();
    let remote = FakeService::new();
    store.put(note("n1", "T", "- [ ] a", ""));

    let config = EngineConfig {
        debounce: Duration::from_secs(60),
        ..fast_config()
    };
    let scheduler = scheduler(&store, &remote, &config);
    scheduler.note_changed("n1").await.unwrap();

    scheduler.shutdown().await;

    assert_eq!(remote.creates(), 1);
}
