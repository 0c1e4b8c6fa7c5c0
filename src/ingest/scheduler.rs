//! Periodic drain of the work queue.
//!
//! Edited documents are pushed onto the queue by [`EditObserver`]; a
//! background task wakes every `paste_interval_ms`, drains the queue and
//! processes each drained document.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::queue::WorkQueue;
use crate::config::ConfigurationError;
use crate::core::Orchestrator;
use crate::domain::DocumentId;

/// Shortest interval between drains
const MIN_TICK: Duration = Duration::from_millis(1);

/// Errors that can occur with the scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid include pattern: {0}")]
    Include(#[from] ConfigurationError),

    #[error("Scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Receives edit notifications from the host
pub trait EditObserver: Send + Sync {
    /// A document's content changed
    fn document_edited(&self, doc: &DocumentId);
}

/// Handle to the running drain task
pub struct SchedulerHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the task and wait for it to finish
    pub async fn stop(self) -> Result<(), SchedulerError> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

/// Owns the drain timer and feeds the orchestrator
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<Mutex<WorkQueue>>,
    include: Regex,
    running: Mutex<Option<SchedulerHandle>>,
}

impl Scheduler {
    /// Create a scheduler sharing the orchestrator's queue
    pub fn new(orchestrator: Arc<Orchestrator>) -> Result<Self, SchedulerError> {
        let include = orchestrator.settings().include_regex()?;
        let queue = orchestrator.queue();
        Ok(Self {
            orchestrator,
            queue,
            include,
            running: Mutex::new(None),
        })
    }

    /// The shared work queue
    pub fn queue(&self) -> Arc<Mutex<WorkQueue>> {
        Arc::clone(&self.queue)
    }

    /// Whether the drain task is running
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Spawn the drain task. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            debug!("Scheduler already running");
            return false;
        }

        let period = Duration::from_millis(self.orchestrator.settings().paste_interval_ms).max(MIN_TICK);
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let orchestrator = Arc::clone(&self.orchestrator);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        info!("Scheduler stopping...");
                        break;
                    }
                    _ = interval.tick() => {
                        drain_and_process(&orchestrator).await;
                    }
                }
            }
        });

        info!(interval_ms = period.as_millis() as u64, "Scheduler started");
        *running = Some(SchedulerHandle { stop_tx, task });
        true
    }

    /// Stop the drain task if running. Queued documents are kept.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(handle) = handle {
            handle.stop().await?;
        }
        Ok(())
    }

    /// Drain the queue once and process what it yields.
    ///
    /// Returns the number of documents processed.
    pub async fn tick(&self) -> usize {
        drain_and_process(&self.orchestrator).await
    }
}

impl EditObserver for Scheduler {
    fn document_edited(&self, doc: &DocumentId) {
        let settings = self.orchestrator.settings();
        if !settings.process_on_paste || !self.include.is_match(doc.as_str()) {
            return;
        }

        let result = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(doc.clone(), settings.paste_attempts);
        if result.is_new() {
            debug!(document = %doc, "Document queued");
        } else {
            debug!(document = %doc, ?result, "Document already queued");
        }
    }
}

async fn drain_and_process(orchestrator: &Orchestrator) -> usize {
    let documents: Vec<DocumentId> = {
        let queue = orchestrator.queue();
        let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.drain().collect()
    };

    let silent = !orchestrator.settings().show_notifications;
    for doc in &documents {
        if let Err(e) = orchestrator.process_document(doc, silent).await {
            let message = format!("{:#}", e);
            error!(document = %doc, error = %message, "Queued document failed");
        }
    }

    documents.len()
}
