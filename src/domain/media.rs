//! Media types flowing through a single localization pass.

use std::ops::Range;
use std::path::PathBuf;

/// An embedded media reference found in document text.
///
/// Only lives for the duration of one rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    /// Display label between the brackets (possibly empty)
    pub anchor: String,

    /// Link target between the parentheses, title and angle brackets removed
    pub link: String,

    /// Byte range of the whole reference in the source text
    pub span: Range<usize>,
}

impl MediaReference {
    /// The matched source text this reference was parsed from
    pub fn source<'a>(&self, text: &'a str) -> &'a str {
        &text[self.span.clone()]
    }
}

/// Bytes fetched for a link, with an extension sniffed from the content.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    /// Raw response body
    pub bytes: Vec<u8>,

    /// Extension derived from the leading bytes (never from the URL)
    pub extension: String,
}

impl FetchedAsset {
    /// Wrap fetched bytes, sniffing the extension from their content
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let extension = crate::adapters::http::sniff_extension(&bytes).to_string();
        Self { bytes, extension }
    }
}

/// Destination chosen by the filename resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    /// Vault-relative destination path
    pub path: PathBuf,

    /// False when a file at `path` already holds identical content
    pub needs_write: bool,
}

impl ResolvedName {
    /// Path rendered with forward slashes, as written into documents
    pub fn display_path(&self) -> String {
        self.path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
