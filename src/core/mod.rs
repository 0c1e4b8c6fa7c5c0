//! Core localization logic.
//!
//! This module contains:
//! - HashRegistry: content hashes of fetched media, by link
//! - FilenameResolver: collision-free destination names
//! - ContentRewriter: reference extraction and rewriting
//! - Orchestrator: per-document and batch processing

pub mod hash_registry;
pub mod orchestrator;
pub mod resolver;
pub mod rewriter;

// Re-export commonly used types
pub use hash_registry::{content_hash, HashRegistry};
pub use orchestrator::Orchestrator;
pub use resolver::{FilenameResolver, NameGenerationError, MAX_INDEX};
pub use rewriter::{
    clean_malformed_tags, expand_template, extract_references, is_external_link, ContentRewriter,
    MatchFailure, RewriteError, RewriteOutcome, MAX_WRITE_ATTEMPTS,
};
