//! HTTP fetcher for remote media.
//!
//! Downloads the raw body of a link and sniffs its file type from the
//! leading bytes. The URL's own suffix is never consulted.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::Fetcher;
use crate::domain::FetchedAsset;

/// Extension used when no signature matches
pub const UNKNOWN_EXTENSION: &str = "bin";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("medialoc/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching a link
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} has an empty body")]
    EmptyBody { url: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Fetcher backed by a shared reqwest client
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a fetcher with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    fn classify(url: &str, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, link: &str) -> Result<FetchedAsset, FetchError> {
        tracing::debug!(%link, "Fetching media");

        let response = self
            .client
            .get(link)
            .send()
            .await
            .map_err(|e| Self::classify(link, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: link.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::classify(link, e))?;

        if bytes.is_empty() {
            return Err(FetchError::EmptyBody {
                url: link.to_string(),
            });
        }

        let asset = FetchedAsset::from_bytes(bytes.to_vec());
        tracing::debug!(%link, size = asset.bytes.len(), ext = %asset.extension, "Fetched media");
        Ok(asset)
    }
}

/// Infer a file extension from content.
///
/// Binary formats are matched against `infer`'s signature table. SVG has no
/// magic number, so a textual check on the leading bytes covers it.
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    // must run before infer: it reports any XML prolog as "xml"
    if looks_like_svg(bytes) {
        return "svg";
    }

    if let Some(kind) = infer::get(bytes) {
        return kind.extension();
    }

    UNKNOWN_EXTENSION
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();

    if text.starts_with("<svg") {
        return true;
    }

    (text.starts_with("<?xml") || text.starts_with("<!DOCTYPE svg")) && text.contains("<svg")
}
