//! Edit-driven ingestion.
//!
//! Edits reach the pipeline through three pieces:
//!
//! 1. **Watcher**: turns file system changes into edit notifications
//! 2. **Scheduler**: receives edits and drains the queue on a timer
//! 3. **Queue**: deduplicated, attempt-limited backlog of documents
//!
//! ```text
//! vault files → VaultWatcher → EditObserver (Scheduler) → WorkQueue
//!                                      ↓ tick
//!                               Orchestrator::process_document
//! ```

pub mod queue;
pub mod scheduler;
pub mod watcher;

pub use queue::{PushResult, QueueEntry, WorkQueue};
pub use scheduler::{EditObserver, Scheduler, SchedulerError, SchedulerHandle};
pub use watcher::{VaultWatcher, WatchHandle, WatcherError};
