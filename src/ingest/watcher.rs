//! Vault file watcher.
//!
//! Watches the vault recursively and reports every changed file as an
//! edit to an [`EditObserver`]. Hidden files and folders (`.obsidian`,
//! `.medialoc`, ...) are ignored.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use thiserror::Error;
use tokio::sync::mpsc;

use super::scheduler::EditObserver;
use crate::domain::DocumentId;

/// Default quiet period before a burst of changes is reported
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Errors that can occur with the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches a vault and forwards edits
pub struct VaultWatcher {
    root: PathBuf,
    debounce: Duration,
}

impl VaultWatcher {
    /// Create a watcher for a vault root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the debounce period
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Check if the vault exists
    pub fn validate(&self) -> Result<(), WatcherError> {
        if !self.root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(self.root.clone()));
        }
        Ok(())
    }

    /// Map an absolute path inside the vault to a document ID
    pub fn document_for(&self, path: &Path) -> Option<DocumentId> {
        document_for(&self.root, path)
    }

    /// Watch the vault until the returned handle is stopped
    pub fn watch(&self, observer: Arc<dyn EditObserver>) -> Result<WatchHandle, WatcherError> {
        self.validate()?;

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let root = self.root.clone();
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            if let Err(e) = run_watcher(root, debounce, observer, &mut stop_rx).await {
                tracing::error!("Watcher error: {}", e);
            }
        });

        Ok(WatchHandle {
            stop_tx,
            task: handle,
        })
    }
}

/// Handle to control the watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

fn document_for(root: &Path, path: &Path) -> Option<DocumentId> {
    let relative = path.strip_prefix(root).ok()?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str()?;
                if name.starts_with('.') {
                    return None;
                }
                parts.push(name);
            }
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(DocumentId::new(parts.join("/")))
    }
}

/// Internal watcher loop.
///
/// The debouncer runs on its own thread and hands batches over an
/// unbounded tokio channel, so waiting for events never blocks a runtime
/// worker.
async fn run_watcher(
    root: PathBuf,
    debounce: Duration,
    observer: Arc<dyn EditObserver>,
    stop_rx: &mut mpsc::Receiver<()>,
) -> Result<(), WatcherError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
        let _ = tx.send(result);
    })?;
    debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

    tracing::info!("Watching {} for edits", root.display());

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::info!("Watcher stopping...");
                break;
            }
            batch = rx.recv() => match batch {
                Some(Ok(events)) => {
                    for event in events {
                        if !event.path.is_file() {
                            continue;
                        }
                        if let Some(doc) = document_for(&root, &event.path) {
                            tracing::debug!(document = %doc, "File changed");
                            observer.document_edited(&doc);
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Watcher error: {:?}", e);
                }
                None => {
                    tracing::error!("Watcher channel disconnected");
                    break;
                }
            }
        }
    }

    Ok(())
}
