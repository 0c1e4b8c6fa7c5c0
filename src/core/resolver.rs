//! Collision-free destination names for fetched media.
//!
//! Candidates are `dir/name.ext`, `dir/name-1.ext`, `dir/name-2.ext`, ...
//! A taken name is reused only when the file there holds the same content
//! this link produced; otherwise the search moves on, so an unrelated file
//! that happens to share the name is never overwritten.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::hash_registry::HashRegistry;
use crate::adapters::{Storage, StorageError};
use crate::domain::{FetchedAsset, ResolvedName};

/// Number of candidate names tried before giving up
pub const MAX_INDEX: usize = 1000;

/// Base name used when neither the template nor the URL yields one
pub const FALLBACK_NAME: &str = "media";

/// Longest base name kept after sanitizing (in characters)
const MAX_NAME_CHARS: usize = 100;

/// Errors that can occur while choosing a destination name
#[derive(Debug, Error)]
pub enum NameGenerationError {
    #[error("No usable name for '{base_name}.{extension}' in '{}' after {attempts} candidates", .directory.display())]
    Exhausted {
        directory: PathBuf,
        base_name: String,
        extension: String,
        attempts: usize,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Picks destination paths, consulting the hash registry for reuse
pub struct FilenameResolver<'a> {
    storage: &'a dyn Storage,
    registry: &'a HashRegistry,
}

impl<'a> FilenameResolver<'a> {
    /// Create a resolver over a storage and registry
    pub fn new(storage: &'a dyn Storage, registry: &'a HashRegistry) -> Self {
        Self { storage, registry }
    }

    /// Choose where `asset` (fetched from `link`) should live in `directory`.
    ///
    /// Returns `needs_write = false` when an existing candidate already holds
    /// the same bytes. Reuse requires both the existing file and the fresh
    /// download to match the link's recorded hash; a link whose content has
    /// changed since it was first recorded therefore gets a new name instead
    /// of being pointed at stale bytes.
    pub async fn resolve(
        &self,
        directory: &Path,
        base_name: &str,
        link: &str,
        asset: &FetchedAsset,
    ) -> Result<ResolvedName, NameGenerationError> {
        let extension = asset.extension.as_str();
        let base_name = prepare_base_name(base_name, link, extension);

        let mut fresh_matches: Option<bool> = None;

        for index in 0..MAX_INDEX {
            let path = candidate_path(directory, &base_name, extension, index);

            if !self.storage.exists(&path).await? {
                debug!(path = %path.display(), "Resolved new media name");
                return Ok(ResolvedName {
                    path,
                    needs_write: true,
                });
            }

            // is_same is meaningless until the link's hash is recorded
            self.registry.ensure_hash_generated(link, &asset.bytes);
            let fresh = *fresh_matches.get_or_insert_with(|| self.registry.is_same(link, &asset.bytes));

            if fresh {
                let existing = self.storage.read_bytes(&path).await?;
                if self.registry.is_same(link, &existing) {
                    debug!(path = %path.display(), "Reusing identical media file");
                    return Ok(ResolvedName {
                        path,
                        needs_write: false,
                    });
                }
            }

            debug!(path = %path.display(), "Name taken by different content");
        }

        Err(NameGenerationError::Exhausted {
            directory: directory.to_path_buf(),
            base_name,
            extension: extension.to_string(),
            attempts: MAX_INDEX,
        })
    }
}

/// Candidate path for a search index (`name.ext`, then `name-1.ext`, ...)
pub fn candidate_path(directory: &Path, base_name: &str, extension: &str, index: usize) -> PathBuf {
    let file_name = if index == 0 {
        format!("{}.{}", base_name, extension)
    } else {
        format!("{}-{}.{}", base_name, index, extension)
    };
    directory.join(file_name)
}

/// Turn a requested base name into the token used on disk
fn prepare_base_name(requested: &str, link: &str, extension: &str) -> String {
    let mut name = requested.trim().to_string();

    if name.is_empty() {
        name = base_name_from_link(link).unwrap_or_default();
    }
    if name.is_empty() {
        name = FALLBACK_NAME.to_string();
    }

    let suffix = format!(".{}", extension);
    if name.len() > suffix.len() {
        let cut = name.len() - suffix.len();
        if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(&suffix) {
            name.truncate(cut);
        }
    }

    sanitize_base_name(&name)
}

/// Last path segment of a URL, percent-decoded, without its extension
pub fn base_name_from_link(link: &str) -> Option<String> {
    let url = url::Url::parse(link).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let stem = Path::new(&decoded)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();

    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Replace characters that are illegal or meaningful in file names and
/// note links, trim, and cap the length.
pub fn sanitize_base_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '[' | ']' | '#' | '^' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches(|c| c == '_' || c == '.');
    let capped: String = trimmed.chars().take(MAX_NAME_CHARS).collect();
    let capped = capped.trim_end();

    if capped.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        capped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStorage;

    fn asset(bytes: &[u8], extension: &str) -> FetchedAsset {
        FetchedAsset {
            bytes: bytes.to_vec(),
            extension: extension.to_string(),
        }
    }

    #[tokio::test]
    async fn test_free_name_needs_write() {
        let storage = MemoryStorage::new();
        let registry = HashRegistry::new();
        let resolver = FilenameResolver::new(&storage, &registry);

        let name = resolver
            .resolve(Path::new("assets"), "diagram", "https://x/d", &asset(b"a", "png"))
            .await
            .unwrap();

        assert_eq!(name.path, PathBuf::from("assets/diagram.png"));
        assert!(name.needs_write);
        // Nothing existed, so no hash was needed
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_file_is_skipped() {
        let storage = MemoryStorage::new();
        storage.insert("assets/diagram.png", b"someone else".to_vec());
        let registry = HashRegistry::new();
        let resolver = FilenameResolver::new(&storage, &registry);

        let name = resolver
            .resolve(Path::new("assets"), "diagram", "https://x/d", &asset(b"mine", "png"))
            .await
            .unwrap();

        assert_eq!(name.path, PathBuf::from("assets/diagram-1.png"));
        assert!(name.needs_write);
    }

    #[tokio::test]
    async fn test_identical_file_is_reused_at_any_index() {
        let storage = MemoryStorage::new();
        storage.insert("assets/diagram.png", b"other".to_vec());
        storage.insert("assets/diagram-1.png", b"mine".to_vec());
        let registry = HashRegistry::new();
        let resolver = FilenameResolver::new(&storage, &registry);

        let name = resolver
            .resolve(Path::new("assets"), "diagram", "https://x/d", &asset(b"mine", "png"))
            .await
            .unwrap();

        assert_eq!(name.path, PathBuf::from("assets/diagram-1.png"));
        assert!(!name.needs_write);
    }

    #[tokio::test]
    async fn test_changed_content_for_known_link_gets_new_name() {
        let storage = MemoryStorage::new();
        storage.insert("assets/diagram.png", b"v1".to_vec());
        let registry = HashRegistry::new();
        registry.ensure_hash_generated("https://x/d", b"v1");
        let resolver = FilenameResolver::new(&storage, &registry);

        let name = resolver
            .resolve(Path::new("assets"), "diagram", "https://x/d", &asset(b"v2", "png"))
            .await
            .unwrap();

        assert_eq!(name.path, PathBuf::from("assets/diagram-1.png"));
        assert!(name.needs_write);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let storage = MemoryStorage::new();
        for index in 0..MAX_INDEX {
            let path = candidate_path(Path::new("m"), "x", "png", index);
            storage.insert(path, format!("other {}", index).into_bytes());
        }
        let registry = HashRegistry::new();
        let resolver = FilenameResolver::new(&storage, &registry);

        let result = resolver
            .resolve(Path::new("m"), "x", "https://x/x", &asset(b"mine", "png"))
            .await;

        assert!(matches!(
            result,
            Err(NameGenerationError::Exhausted { attempts: MAX_INDEX, .. })
        ));
    }

    #[test]
    fn test_base_name_fallbacks() {
        assert_eq!(prepare_base_name("", "https://x/pics/cat%20photo.jpg?s=1", "png"), "cat photo");
        assert_eq!(prepare_base_name("", "https://x/", "png"), FALLBACK_NAME);
        assert_eq!(prepare_base_name("  ", "https://x", "png"), FALLBACK_NAME);
    }

    #[test]
    fn test_matching_extension_stripped() {
        assert_eq!(prepare_base_name("photo.png", "https://x/a", "png"), "photo");
        assert_eq!(prepare_base_name("photo.PNG", "https://x/a", "png"), "photo");
        assert_eq!(prepare_base_name("photo.jpg", "https://x/a", "png"), "photo.jpg");
        assert_eq!(prepare_base_name(".png", "https://x/a", "png"), "png");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_base_name("a/b:c*d?"), "a_b_c_d");
        assert_eq!(sanitize_base_name("[[wiki]] #tag ^block"), "wiki__ _tag _block");
        assert_eq!(sanitize_base_name("..."), FALLBACK_NAME);
        assert_eq!(sanitize_base_name(&"x".repeat(300)).chars().count(), 100);
    }
}
