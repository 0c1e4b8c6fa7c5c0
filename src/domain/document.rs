//! Document identity and per-document context.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identity of a document inside the vault (its vault-relative path).
///
/// This is only a lookup key; content is always read through storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a document ID from a vault-relative path
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self(path.replace('\\', "/").trim_start_matches("./").to_string())
    }

    /// Get the raw path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path as a `Path`
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// File name without extension (`notes/trip.md` → `trip`)
    pub fn base_name(&self) -> &str {
        self.as_path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Name of the containing folder, empty for documents at the root
    pub fn parent_folder(&self) -> &str {
        self.as_path()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Values available to the filename template while rewriting one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentContext {
    /// Base name of the active document
    pub note_name: String,

    /// Name of the document's parent folder
    pub folder_name: String,

    /// Current date, already formatted
    pub date: String,

    /// Vault-relative folder that receives this document's media
    pub media_dir: PathBuf,
}

impl DocumentContext {
    /// Build the context for a document with a preformatted date
    pub fn for_document(doc: &DocumentId, date: impl Into<String>) -> Self {
        Self {
            note_name: doc.base_name().to_string(),
            folder_name: doc.parent_folder().to_string(),
            date: date.into(),
            media_dir: PathBuf::new(),
        }
    }

    /// Set the media folder
    pub fn with_media_dir(mut self, media_dir: impl Into<PathBuf>) -> Self {
        self.media_dir = media_dir.into();
        self
    }
}

/// Outcome of processing one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// The processed document
    pub document: DocumentId,

    /// Whether the document text was rewritten and saved
    pub changed: bool,

    /// Number of references now pointing at local files
    pub localized: usize,

    /// Number of references left untouched because of an error
    pub failed: usize,
}

/// Aggregate outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Documents that matched the predicate
    pub total: usize,

    /// Documents whose text changed
    pub changed: usize,

    /// References localized across all documents
    pub localized: usize,

    /// Documents that could not be processed at all
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_names() {
        let doc = DocumentId::new("travel/2024/trip.md");
        assert_eq!(doc.base_name(), "trip");
        assert_eq!(doc.parent_folder(), "2024");

        let root = DocumentId::new("./index.md");
        assert_eq!(root.as_str(), "index.md");
        assert_eq!(root.parent_folder(), "");
    }

    #[test]
    fn test_context_for_document() {
        let ctx = DocumentContext::for_document(&DocumentId::new("a/b.md"), "20240101");
        assert_eq!(ctx.note_name, "b");
        assert_eq!(ctx.folder_name, "a");
        assert_eq!(ctx.date, "20240101");

        let ctx = ctx.with_media_dir("media/b");
        assert_eq!(ctx.media_dir, PathBuf::from("media/b"));
    }
}
