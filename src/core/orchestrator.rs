//! Document-level coordination.
//!
//! Reads a document, makes sure its media folder exists, runs the content
//! rewriter over it, and saves the result only when something changed.
//! Batch processing walks every document that passes a predicate.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, error, info, instrument, warn};

use super::hash_registry::HashRegistry;
use super::rewriter::{clean_malformed_tags, ContentRewriter};
use crate::adapters::notifier::RESULT_NOTICE;
use crate::adapters::{Fetcher, NoticeDuration, Notifier, Storage};
use crate::config::Settings;
use crate::domain::{BatchReport, DocumentContext, DocumentId, ProcessReport};
use crate::ingest::WorkQueue;

/// Fallback when the configured date pattern cannot be rendered
const FALLBACK_DATE_FORMAT: &str = "%Y%m%d";

/// Localizes media for documents in one vault
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    registry: Arc<HashRegistry>,
    queue: Arc<Mutex<WorkQueue>>,
    settings: Arc<Settings>,
}

impl Orchestrator {
    /// Create an orchestrator with a fresh registry and empty queue
    pub fn new(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        Self {
            storage,
            fetcher,
            notifier,
            registry: Arc::new(HashRegistry::new()),
            queue: Arc::new(Mutex::new(WorkQueue::new())),
            settings: Arc::new(settings),
        }
    }

    /// Share an existing hash registry
    pub fn with_registry(mut self, registry: Arc<HashRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The work queue shared with the scheduler
    pub fn queue(&self) -> Arc<Mutex<WorkQueue>> {
        Arc::clone(&self.queue)
    }

    /// The hash registry
    pub fn registry(&self) -> &HashRegistry {
        &self.registry
    }

    /// Active settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Folder that receives media for `doc`
    pub fn media_dir_for(&self, doc: &DocumentId) -> PathBuf {
        let root = PathBuf::from(&self.settings.media_root);
        if self.settings.per_document_folder {
            root.join(doc.base_name())
        } else {
            root
        }
    }

    fn today(&self) -> String {
        let now = Local::now();
        let mut date = String::new();
        if write!(date, "{}", now.format(&self.settings.date_format)).is_err() {
            warn!(format = %self.settings.date_format, "Unrenderable date format, using default");
            date = now.format(FALLBACK_DATE_FORMAT).to_string();
        }
        date
    }

    /// Localize every remote media reference in one document.
    ///
    /// The document is written back only when its text changed; in that
    /// case it is also dropped from the work queue. Errors are limited to
    /// reading or saving the document and creating its media folder.
    /// Individual references that fail are counted in the report.
    #[instrument(skip(self), fields(document = %doc))]
    pub async fn process_document(&self, doc: &DocumentId, silent: bool) -> Result<ProcessReport> {
        let text = self
            .storage
            .read_document_text(doc)
            .await
            .with_context(|| format!("Failed to read document: {}", doc))?;

        let media_dir = self.media_dir_for(doc);
        match self.storage.create_folder(&media_dir).await {
            Ok(()) => debug!(folder = %media_dir.display(), "Created media folder"),
            Err(e) if e.is_already_exists() => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to create media folder: {}", media_dir.display())
                })
            }
        }

        let ctx = DocumentContext::for_document(doc, self.today()).with_media_dir(media_dir);

        let rewriter = ContentRewriter::new(
            self.storage.as_ref(),
            self.fetcher.as_ref(),
            &self.registry,
            self.settings.link_style,
        );
        let outcome = rewriter
            .rewrite(&text, &self.settings.name_template, &ctx)
            .await;

        let mut new_text = outcome.text;
        if self.settings.clean_malformed_tags {
            new_text = clean_malformed_tags(&new_text);
        }

        let changed = new_text != text;
        if changed {
            self.storage
                .write_document_text(doc, &new_text)
                .await
                .with_context(|| format!("Failed to save document: {}", doc))?;

            self.queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(doc);
        }

        let report = ProcessReport {
            document: doc.clone(),
            changed,
            localized: outcome.localized,
            failed: outcome.failures.len(),
        };

        info!(
            changed = report.changed,
            localized = report.localized,
            failed = report.failed,
            known_links = self.registry.len(),
            "Processed document"
        );

        if !silent {
            let message = if report.failed > 0 {
                format!(
                    "{}: localized {} media, {} failed",
                    doc, report.localized, report.failed
                )
            } else if report.changed {
                format!("{}: localized {} media", doc, report.localized)
            } else {
                format!("{}: nothing to localize", doc)
            };
            self.notifier.notify(&message, RESULT_NOTICE);
        }

        Ok(report)
    }

    /// Process every document accepted by `predicate`, in listing order.
    ///
    /// A document that fails is logged and counted; the batch continues.
    #[instrument(skip(self, predicate))]
    pub async fn process_all<F>(&self, predicate: F) -> Result<BatchReport>
    where
        F: Fn(&DocumentId) -> bool,
    {
        let documents: Vec<DocumentId> = self
            .storage
            .list_documents()
            .await
            .context("Failed to list documents")?
            .into_iter()
            .filter(|doc| predicate(doc))
            .collect();

        let mut report = BatchReport {
            total: documents.len(),
            ..Default::default()
        };

        info!(total = report.total, "Processing documents");

        let mut progress = self.notifier.notify(
            &format!("Processing 0/{}", report.total),
            NoticeDuration::Persistent,
        );

        for (idx, doc) in documents.iter().enumerate() {
            progress.update_message(&format!("Processing {}/{}", idx + 1, report.total));

            match self.process_document(doc, true).await {
                Ok(doc_report) => {
                    if doc_report.changed {
                        report.changed += 1;
                    }
                    report.localized += doc_report.localized;
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!(document = %doc, error = %message, "Failed to process document");
                    report.errors += 1;
                }
            }
        }

        progress.dismiss();

        let summary = if report.errors > 0 {
            format!(
                "Processed {} documents: {} changed, {} media localized, {} errors",
                report.total, report.changed, report.localized, report.errors
            )
        } else {
            format!(
                "Processed {} documents: {} changed, {} media localized",
                report.total, report.changed, report.localized
            )
        };
        self.notifier.notify(&summary, RESULT_NOTICE);

        Ok(report)
    }

    /// Process every document that passes the include pattern
    pub async fn process_matching(&self) -> Result<BatchReport> {
        let include = self
            .settings
            .include_regex()
            .context("Invalid include pattern")?;
        self.process_all(|doc| include.is_match(doc.as_str())).await
    }
}
