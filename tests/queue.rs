//! Queue Integration Tests
//!
//! Edits flowing through the scheduler's work queue into the orchestrator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{StubFetcher, PNG_A};
use medialoc::adapters::TracingNotifier;
use medialoc::config::Settings;
use medialoc::ingest::{EditObserver, PushResult, Scheduler, WorkQueue};
use medialoc::{DocumentId, MemoryStorage, Orchestrator};
use tokio_test::assert_ok;

fn setup(settings: Settings) -> (Arc<Scheduler>, Arc<MemoryStorage>, Arc<StubFetcher>) {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = Arc::new(StubFetcher::new());
    let orchestrator = Orchestrator::new(
        storage.clone(),
        fetcher.clone(),
        Arc::new(TracingNotifier),
        settings,
    );
    let scheduler = Arc::new(assert_ok!(Scheduler::new(Arc::new(orchestrator))));
    (scheduler, storage, fetcher)
}

#[test]
fn test_queue_dedups_and_evicts() {
    let mut queue = WorkQueue::new();
    let a = DocumentId::new("a.md");
    let b = DocumentId::new("b.md");

    assert_eq!(queue.push(a.clone(), 1), PushResult::Queued);
    assert_eq!(queue.push(b.clone(), 3), PushResult::Queued);
    assert_eq!(queue.push(b.clone(), 2), PushResult::Reset);
    assert_eq!(queue.len(), 2);

    let drained: Vec<_> = queue.drain().collect();
    assert_eq!(drained, vec![a.clone(), b.clone()]);
    assert!(!queue.contains(&a));
    assert_eq!(queue.remaining(&b), Some(1));
}

#[test]
fn test_invalid_include_is_rejected() {
    let settings = Settings {
        include: "(unclosed".to_string(),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(StubFetcher::new()),
        Arc::new(TracingNotifier),
        settings,
    );
    assert!(Scheduler::new(Arc::new(orchestrator)).is_err());
}

#[tokio::test]
async fn test_edit_then_tick_localizes_and_dequeues() {
    let (scheduler, storage, fetcher) = setup(Settings::default());
    fetcher.serve("https://x/p.png", PNG_A);
    storage.insert("note.md", "![p](https://x/p.png)");

    let doc = DocumentId::new("note.md");
    scheduler.document_edited(&doc);
    assert!(scheduler.queue().lock().unwrap().contains(&doc));

    assert_eq!(scheduler.tick().await, 1);

    // Changed documents leave the queue immediately
    assert!(scheduler.queue().lock().unwrap().is_empty());
    assert_eq!(storage.get("note.md").unwrap(), b"![[media/p.png]]".to_vec());
    assert_eq!(fetcher.request_count(), 1);
}

#[tokio::test]
async fn test_repeated_edits_keep_one_entry() {
    let (scheduler, storage, _) = setup(Settings::default());
    storage.insert("note.md", "nothing remote");
    let doc = DocumentId::new("note.md");

    for _ in 0..5 {
        scheduler.document_edited(&doc);
    }
    assert_eq!(scheduler.queue().lock().unwrap().len(), 1);

    scheduler.tick().await;
    scheduler.document_edited(&doc);
    assert_eq!(scheduler.queue().lock().unwrap().remaining(&doc), Some(3));
}

#[tokio::test]
async fn test_background_task_drains_queue() {
    let (scheduler, storage, fetcher) = setup(Settings {
        paste_interval_ms: 10,
        ..Default::default()
    });
    fetcher.serve("https://x/p.png", PNG_A);
    storage.insert("note.md", "![p](https://x/p.png)");

    assert!(scheduler.start());
    scheduler.document_edited(&DocumentId::new("note.md"));

    let mut localized = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if storage.get("media/p.png").is_some() {
            localized = true;
            break;
        }
    }

    assert_ok!(scheduler.stop().await);
    assert!(localized);
    assert_eq!(storage.get("note.md").unwrap(), b"![[media/p.png]]".to_vec());
}
