//! medialoc - Media localization for Markdown vaults
//!
//! Finds `![anchor](https://...)` references in notes, downloads the
//! media, stores it inside the vault under a collision-free name, and
//! rewrites the reference to point at the local copy.
//!
//! # Architecture
//!
//! Localization is content-aware rather than name-aware:
//! - File types are sniffed from downloaded bytes, never from the URL
//! - A name that is already taken is reused only if it holds the same bytes
//! - Files are created, never overwritten
//!
//! # Modules
//!
//! - `adapters`: Storage, HTTP fetching and notices
//! - `core`: Hash registry, filename resolver, rewriter, orchestrator
//! - `domain`: Data structures (DocumentId, MediaReference, reports)
//! - `ingest`: Work queue, scheduler and vault watcher
//! - `config`: Settings and config file loading
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Localize one note
//! medialoc --vault ~/notes process travel/trip.md
//!
//! # Localize everything matching the include pattern
//! medialoc --vault ~/notes process-all
//!
//! # Localize notes as they are edited
//! medialoc --vault ~/notes watch
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use adapters::{Fetcher, FsStorage, HttpFetcher, MemoryStorage, Notifier, Storage};
pub use config::Settings;
pub use core::{ContentRewriter, FilenameResolver, HashRegistry, Orchestrator};
pub use domain::{DocumentId, FetchedAsset, MediaReference, ResolvedName};
pub use ingest::{EditObserver, Scheduler, WorkQueue};
