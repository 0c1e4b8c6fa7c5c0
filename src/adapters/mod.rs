//! Adapter interfaces for the host environment.
//!
//! The localization pipeline reaches the outside world only through these
//! traits: remote fetching, vault storage, and user notices. Each comes
//! with a stock implementation.

pub mod http;
pub mod notifier;
pub mod storage;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DocumentId, FetchedAsset};

pub use http::{sniff_extension, FetchError, HttpFetcher};
pub use notifier::{ConsoleNotifier, TracingNotifier};
pub use storage::{FsStorage, MemoryStorage, StorageError};

/// Retrieves remote media
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the bytes behind `link` and sniff their extension.
    ///
    /// No retries happen here; callers decide whether to try again.
    async fn fetch(&self, link: &str) -> Result<FetchedAsset, FetchError>;
}

/// Vault storage for documents and media files
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether a file or folder exists at `path`
    async fn exists(&self, path: &Path) -> Result<bool, StorageError>;

    /// Read the raw bytes of a file
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Create a new file; fails with `AlreadyExists` instead of overwriting
    async fn create_file(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError>;

    /// Create a folder; fails with `AlreadyExists` if present
    async fn create_folder(&self, path: &Path) -> Result<(), StorageError>;

    /// Read a document's text
    async fn read_document_text(&self, doc: &DocumentId) -> Result<String, StorageError>;

    /// Replace a document's text
    async fn write_document_text(&self, doc: &DocumentId, text: &str) -> Result<(), StorageError>;

    /// Every document in the vault, in a stable order
    async fn list_documents(&self) -> Result<Vec<DocumentId>, StorageError>;
}

/// How long a notice stays visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeDuration {
    /// Auto-dismissed after the duration
    Timed(Duration),

    /// Visible until dismissed
    Persistent,
}

/// Shows notices to the user
pub trait Notifier: Send + Sync {
    /// Show a notice and return a handle to update or dismiss it
    fn notify(&self, message: &str, duration: NoticeDuration) -> Box<dyn NoticeHandle>;
}

/// Handle to a visible notice
pub trait NoticeHandle: Send {
    /// Replace the notice text
    fn update_message(&mut self, message: &str);

    /// Remove the notice
    fn dismiss(self: Box<Self>);
}
