//! Content hashes of fetched media, keyed by source link.
//!
//! The registry answers one question for the filename resolver: does this
//! file on disk hold exactly what this link produced before? Entries are
//! created lazily, never updated, and never evicted; the registry lives
//! only as long as the process.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a byte buffer
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Process-wide link → content hash map
#[derive(Debug, Default)]
pub struct HashRegistry {
    hashes: Mutex<HashMap<String, String>>,
}

impl HashRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the hash of `bytes` for `link` unless one is already recorded.
    ///
    /// First write wins: later calls for the same link are no-ops even when
    /// the bytes differ. Safe to call redundantly from concurrent passes.
    pub fn ensure_hash_generated(&self, link: &str, bytes: &[u8]) {
        let mut hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        if !hashes.contains_key(link) {
            hashes.insert(link.to_string(), content_hash(bytes));
        }
    }

    /// Whether `candidate` hashes to the value recorded for `link`.
    ///
    /// Always false until [`ensure_hash_generated`](Self::ensure_hash_generated)
    /// has run for the link.
    pub fn is_same(&self, link: &str, candidate: &[u8]) -> bool {
        let stored = {
            let hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
            match hashes.get(link) {
                Some(hash) => hash.clone(),
                None => return false,
            }
        };
        content_hash(candidate) == stored
    }

    #[cfg(test)]
    fn get(&self, link: &str) -> Option<String> {
        let hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes.get(link).cloned()
    }

    /// Number of links with a recorded hash
    pub fn len(&self) -> usize {
        self.hashes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no hashes are recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
