//! Domain types for media localization.
//!
//! - Media: references, fetched assets, resolved names
//! - Document: identity, template context, reports

pub mod document;
pub mod media;

pub use document::{BatchReport, DocumentContext, DocumentId, ProcessReport};
pub use media::{FetchedAsset, MediaReference, ResolvedName};
