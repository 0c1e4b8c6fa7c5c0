//! Document and media storage.
//!
//! All paths handed to a [`Storage`] are relative to the vault root.
//! `create_file` never overwrites: a concurrent writer that lost the race
//! gets [`StorageError::AlreadyExists`] and can pick another name.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

use super::Storage;
use crate::domain::DocumentId;

/// Errors that can occur with storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Path escapes the vault root: {}", .0.display())]
    OutsideRoot(PathBuf),

    #[error("Document is not valid UTF-8: {}", .0.display())]
    InvalidText(PathBuf),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Whether this is the "someone else already created it" conflict
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Reject absolute paths and parent traversal
fn check_relative(path: &Path) -> Result<(), StorageError> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(StorageError::OutsideRoot(path.to_path_buf()));
    }
    Ok(())
}

// ============================================================================
// Filesystem storage
// ============================================================================

/// Storage rooted at a vault directory on the local filesystem
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create storage rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The vault root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, StorageError> {
        check_relative(path)?;
        Ok(self.root.join(path))
    }

    /// Write through a temp file in the same directory, then rename over
    /// the target, so readers never observe a half-written document.
    fn write_atomic(target: &Path, content: &[u8]) -> Result<(), StorageError> {
        let dir = target.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StorageError::io(target, e))?;
        tmp.write_all(content)
            .map_err(|e| StorageError::io(target, e))?;
        tmp.persist(target)
            .map_err(|e| StorageError::io(target, e.error))?;
        Ok(())
    }

    /// Like [`Self::write_atomic`] but fails with `AlreadyExists` instead of
    /// replacing. The temp file is removed when the write or the publish
    /// fails, so the target name only ever holds complete content.
    fn create_new(target: &Path, content: &[u8]) -> Result<(), StorageError> {
        let dir = target.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StorageError::io(target, e))?;
        tmp.write_all(content)
            .map_err(|e| StorageError::io(target, e))?;
        tmp.persist_noclobber(target)
            .map_err(|e| StorageError::io(target, e.error))?;
        Ok(())
    }

    async fn run_blocking<F>(path: &Path, op: F) -> Result<(), StorageError>
    where
        F: FnOnce() -> Result<(), StorageError> + Send + 'static,
    {
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| StorageError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        fs::try_exists(&full)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        fs::read(&full).await.map_err(|e| StorageError::io(path, e))
    }

    async fn create_file(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        let content = bytes.to_vec();
        Self::run_blocking(path, move || Self::create_new(&full, &content)).await
    }

    async fn create_folder(&self, path: &Path) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if fs::try_exists(&full)
            .await
            .map_err(|e| StorageError::io(path, e))?
        {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }
        fs::create_dir_all(&full)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn read_document_text(&self, doc: &DocumentId) -> Result<String, StorageError> {
        let bytes = self.read_bytes(doc.as_path()).await?;
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidText(doc.as_path().to_path_buf()))
    }

    async fn write_document_text(&self, doc: &DocumentId, text: &str) -> Result<(), StorageError> {
        let full = self.resolve(doc.as_path())?;
        let content = text.as_bytes().to_vec();
        Self::run_blocking(doc.as_path(), move || Self::write_atomic(&full, &content)).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentId>, StorageError> {
        let mut documents = Vec::new();
        let mut pending = vec![PathBuf::new()];

        while let Some(relative) = pending.pop() {
            let dir = self.root.join(&relative);
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| StorageError::io(&relative, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&relative, e))?
            {
                let name = entry.file_name();

                // Skip dot-folders (.git, .obsidian, .medialoc)
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }

                let child = relative.join(&name);
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", child.display(), e);
                        continue;
                    }
                };

                if file_type.is_dir() {
                    pending.push(child);
                } else if file_type.is_file() {
                    documents.push(DocumentId::new(child.to_string_lossy()));
                }
            }
        }

        documents.sort();
        Ok(documents)
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

/// Storage held entirely in memory, for embedding hosts and tests
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    folders: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, replacing any existing content
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), bytes.into());
    }

    /// Snapshot of a file's content
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(path.as_ref()).cloned()
    }

    /// All stored file paths
    pub fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.keys().cloned().collect()
    }

    fn key(path: &Path) -> Result<PathBuf, StorageError> {
        check_relative(path)?;
        Ok(path.components().collect())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let key = Self::key(path)?;
        let in_files = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&key);
        let in_folders = self
            .folders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key);
        Ok(in_files || in_folders)
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let key = Self::key(path)?;
        self.get(&key).ok_or(StorageError::NotFound(key))
    }

    async fn create_file(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let key = Self::key(path)?;
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if files.contains_key(&key) {
            return Err(StorageError::AlreadyExists(key));
        }
        files.insert(key, bytes.to_vec());
        Ok(())
    }

    async fn create_folder(&self, path: &Path) -> Result<(), StorageError> {
        let key = Self::key(path)?;
        let mut folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        if !folders.insert(key.clone()) {
            return Err(StorageError::AlreadyExists(key));
        }
        Ok(())
    }

    async fn read_document_text(&self, doc: &DocumentId) -> Result<String, StorageError> {
        let bytes = self.read_bytes(doc.as_path()).await?;
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidText(doc.as_path().to_path_buf()))
    }

    async fn write_document_text(&self, doc: &DocumentId, text: &str) -> Result<(), StorageError> {
        let key = Self::key(doc.as_path())?;
        self.insert(key, text.as_bytes().to_vec());
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentId>, StorageError> {
        Ok(self
            .paths()
            .into_iter()
            .map(|p| DocumentId::new(p.to_string_lossy()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_create_file_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        storage
            .create_file(Path::new("a.png"), b"first")
            .await
            .unwrap();
        let result = storage.create_file(Path::new("a.png"), b"second").await;

        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
        assert_eq!(
            storage.read_bytes(Path::new("a.png")).await.unwrap(),
            b"first"
        );
    }

    #[tokio::test]
    async fn test_fs_lost_create_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        storage
            .create_file(Path::new("a.png"), b"winner")
            .await
            .unwrap();
        let result = storage.create_file(Path::new("a.png"), b"loser").await;
        assert!(result.unwrap_err().is_already_exists());

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("a.png")]);
        assert_eq!(std::fs::read(temp.path().join("a.png")).unwrap(), b"winner");
    }

    #[tokio::test]
    async fn test_fs_failed_create_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        // Parent folder was never created
        let result = storage
            .create_file(Path::new("media/a.png"), b"bytes")
            .await;

        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(!storage.exists(Path::new("media/a.png")).await.unwrap());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fs_create_folder_reports_existing() {
        let temp = TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        storage.create_folder(Path::new("media/trip")).await.unwrap();
        assert!(storage.exists(Path::new("media/trip")).await.unwrap());

        let again = storage.create_folder(Path::new("media/trip")).await;
        assert!(again.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_fs_document_round_trip_and_listing() {
        let temp = TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        std::fs::create_dir_all(temp.path().join("notes")).unwrap();
        std::fs::create_dir_all(temp.path().join(".obsidian")).unwrap();
        std::fs::write(temp.path().join("notes/a.md"), "hello").unwrap();
        std::fs::write(temp.path().join("b.md"), "world").unwrap();
        std::fs::write(temp.path().join(".obsidian/app.json"), "{}").unwrap();

        let doc = DocumentId::new("notes/a.md");
        storage.write_document_text(&doc, "rewritten").await.unwrap();
        assert_eq!(storage.read_document_text(&doc).await.unwrap(), "rewritten");

        let docs = storage.list_documents().await.unwrap();
        assert_eq!(docs, vec![DocumentId::new("b.md"), DocumentId::new("notes/a.md")]);
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let temp = TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        let result = storage.exists(Path::new("../outside.png")).await;
        assert!(matches!(result, Err(StorageError::OutsideRoot(_))));

        let memory = MemoryStorage::new();
        let result = memory.create_file(Path::new("/abs.png"), b"x").await;
        assert!(matches!(result, Err(StorageError::OutsideRoot(_))));
    }

    #[tokio::test]
    async fn test_memory_storage_semantics() {
        let storage = MemoryStorage::new();
        storage.insert("doc.md", "text");

        assert!(storage.exists(Path::new("doc.md")).await.unwrap());
        assert!(!storage.exists(Path::new("missing.md")).await.unwrap());

        storage.create_file(Path::new("m/x.png"), b"1").await.unwrap();
        assert!(storage
            .create_file(Path::new("m/x.png"), b"2")
            .await
            .unwrap_err()
            .is_already_exists());
        assert_eq!(storage.get("m/x.png").unwrap(), b"1");

        storage.create_folder(Path::new("m")).await.unwrap();
        assert!(storage.create_folder(Path::new("m")).await.is_err());
    }
}
