//! Link extraction and content rewriting.
//!
//! Finds `![anchor](link)` references in document text and replaces each
//! one that points at a remote URL with a reference to a local copy.
//! Everything else in the text is copied through byte for byte.
//!
//! Matches are localized strictly one after another, left to right. A
//! failure on one match leaves that match's text untouched and processing
//! moves on to the next.

use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use super::hash_registry::HashRegistry;
use super::resolver::{FilenameResolver, NameGenerationError};
use crate::adapters::{FetchError, Fetcher, Storage, StorageError};
use crate::config::{template_regex, LinkStyle};
use crate::domain::{DocumentContext, MediaReference, ResolvedName};

/// Resolve-and-write attempts per match when another pass keeps claiming
/// the chosen name first
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Errors that can occur while localizing a single match
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Name(#[from] NameGenerationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Gave up on {link} after {attempts} conflicting writes")]
    Conflict { link: String, attempts: u32 },
}

/// A match that was left as-is because localizing it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFailure {
    /// The remote link
    pub link: String,

    /// Rendered error
    pub error: String,
}

/// Result of one rewrite pass over a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// The rewritten text
    pub text: String,

    /// Whether `text` differs from the input
    pub changed: bool,

    /// References now pointing at local files
    pub localized: usize,

    /// References left in place because of an error
    pub failures: Vec<MatchFailure>,
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Link targets may contain one level of balanced parentheses
    RE.get_or_init(|| {
        Regex::new(r"!\[(?P<anchor>[^\]\n]*)\]\((?P<target>[^()\n]*(?:\([^()\n]*\)[^()\n]*)*)\)")
            .expect("reference regex is valid")
    })
}

fn malformed_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[!\[\[(?P<embed>[^\]\n]*)\]\](?:\]\([^()\n]*\)|\([^()\n]*\)\])")
            .expect("malformed tag regex is valid")
    })
}

/// Split a reference target into its link, dropping a `"title"` and
/// `<...>` wrapping
fn parse_target(target: &str) -> String {
    let target = target.trim();

    if let Some(rest) = target.strip_prefix('<') {
        if let Some(end) = rest.find('>') {
            return rest[..end].to_string();
        }
    }

    target
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

/// Every media reference in `text`, in textual order.
///
/// Includes local and malformed links; use [`is_external_link`] to pick
/// the ones worth fetching.
pub fn extract_references(text: &str) -> Vec<MediaReference> {
    reference_regex()
        .captures_iter(text)
        .map(|caps| {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            MediaReference {
                anchor: caps["anchor"].to_string(),
                link: parse_target(&caps["target"]),
                span: whole,
            }
        })
        .collect()
}

/// Whether a link is a well-formed remote URL we can fetch
pub fn is_external_link(link: &str) -> bool {
    match url::Url::parse(link) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

/// Expand `{{note}}`, `{{folder}}`, `{{anchor}}` and `{{date}}`.
///
/// Unknown placeholders expand to nothing.
pub fn expand_template(template: &str, ctx: &DocumentContext, anchor: &str) -> String {
    template_regex()
        .replace_all(template, |caps: &Captures| match caps[1].trim() {
            "note" => ctx.note_name.clone(),
            "folder" => ctx.folder_name.clone(),
            "anchor" => anchor.to_string(),
            "date" => ctx.date.clone(),
            _ => String::new(),
        })
        .into_owned()
}

/// Render the replacement reference for a localized file
pub fn render_reference(style: LinkStyle, anchor: &str, resolved: &ResolvedName) -> String {
    let path = resolved.display_path();
    match style {
        LinkStyle::Wiki => format!("![[{}]]", path),
        LinkStyle::Markdown => {
            if path.contains(|c: char| c.is_whitespace() || c == '(' || c == ')') {
                format!("![{}](<{}>)", anchor, path)
            } else {
                format!("![{}]({})", anchor, path)
            }
        }
    }
}

/// Collapse `[![[file]]](link)` and `[![[file]](link)]` into `![[file]]`.
///
/// The first is what a linked image (`[![alt](img)](href)`) turns into once
/// its inner image has been localized as a wiki embed.
pub fn clean_malformed_tags(text: &str) -> String {
    malformed_tag_regex()
        .replace_all(text, |caps: &Captures| format!("![[{}]]", &caps["embed"]))
        .into_owned()
}

/// Rewrites remote media references to local copies
pub struct ContentRewriter<'a> {
    storage: &'a dyn Storage,
    fetcher: &'a dyn Fetcher,
    registry: &'a HashRegistry,
    link_style: LinkStyle,
}

impl<'a> ContentRewriter<'a> {
    /// Create a rewriter over the given collaborators
    pub fn new(
        storage: &'a dyn Storage,
        fetcher: &'a dyn Fetcher,
        registry: &'a HashRegistry,
        link_style: LinkStyle,
    ) -> Self {
        Self {
            storage,
            fetcher,
            registry,
            link_style,
        }
    }

    /// Rewrite every external media reference in `text`.
    ///
    /// `name_template` is expanded per match against `ctx` and the match's
    /// anchor; files land in `ctx.media_dir`.
    pub async fn rewrite(
        &self,
        text: &str,
        name_template: &str,
        ctx: &DocumentContext,
    ) -> RewriteOutcome {
        let mut outcome = RewriteOutcome::default();
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;

        for reference in extract_references(text) {
            output.push_str(&text[cursor..reference.span.start]);
            cursor = reference.span.end;

            let source = reference.source(text);

            if !is_external_link(&reference.link) {
                output.push_str(source);
                continue;
            }

            let base_name = expand_template(name_template, ctx, &reference.anchor);

            match self.localize(&reference, &base_name, &ctx.media_dir).await {
                Ok(resolved) => {
                    let replacement = render_reference(self.link_style, &reference.anchor, &resolved);
                    debug!(link = %reference.link, path = %resolved.display_path(), "Localized media");
                    output.push_str(&replacement);
                    outcome.localized += 1;
                }
                Err(e) => {
                    warn!(link = %reference.link, error = %e, "Leaving media reference unchanged");
                    output.push_str(source);
                    outcome.failures.push(MatchFailure {
                        link: reference.link.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        output.push_str(&text[cursor..]);

        outcome.changed = output != text;
        outcome.text = output;
        outcome
    }

    /// Fetch once, then resolve and write, retrying when a concurrent pass
    /// claims the chosen name between resolution and write.
    async fn localize(
        &self,
        reference: &MediaReference,
        base_name: &str,
        directory: &Path,
    ) -> Result<ResolvedName, RewriteError> {
        let asset = self.fetcher.fetch(&reference.link).await?;
        let resolver = FilenameResolver::new(self.storage, self.registry);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let resolved = resolver
                .resolve(directory, base_name, &reference.link, &asset)
                .await?;

            if !resolved.needs_write {
                return Ok(resolved);
            }

            match self.storage.create_file(&resolved.path, &asset.bytes).await {
                Ok(()) => return Ok(resolved),
                Err(e) if e.is_already_exists() => {
                    warn!(
                        link = %reference.link,
                        path = %resolved.display_path(),
                        attempt,
                        "Name claimed concurrently, resolving again"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RewriteError::Conflict {
            link: reference.link.clone(),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentId;
    use std::path::PathBuf;

    fn ctx() -> DocumentContext {
        DocumentContext::for_document(&DocumentId::new("travel/trip.md"), "20240102")
            .with_media_dir("media")
    }

    #[test]
    fn test_extract_in_order_with_spans() {
        let text = "a ![one](https://x/1.png) b ![](local.png) c ![t](<https://x/a b.png> \"T\")";
        let refs = extract_references(text);

        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].anchor, "one");
        assert_eq!(refs[0].link, "https://x/1.png");
        assert_eq!(refs[0].source(text), "![one](https://x/1.png)");
        assert_eq!(refs[1].anchor, "");
        assert_eq!(refs[1].link, "local.png");
        assert_eq!(refs[2].link, "https://x/a b.png");
    }

    #[test]
    fn test_extract_balanced_parentheses_and_titles() {
        let text = "![w](https://en.wikipedia.org/wiki/File:A_(b).png \"title\")";
        let refs = extract_references(text);

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].link, "https://en.wikipedia.org/wiki/File:A_(b).png");
        assert_eq!(refs[0].span, 0..text.len());
    }

    #[test]
    fn test_plain_parentheses_and_wiki_embeds_are_not_references() {
        let text = "some unrelated text with (parentheses) and ![[media/a.png]] and [link](https://x)";
        assert!(extract_references(text).is_empty());
    }

    #[test]
    fn test_external_link_detection() {
        assert!(is_external_link("https://x.org/a.png"));
        assert!(is_external_link("http://x.org/a?b=c"));
        assert!(!is_external_link("media/a.png"));
        assert!(!is_external_link("file:///etc/passwd"));
        assert!(!is_external_link("https//broken"));
        assert!(!is_external_link(""));
    }

    #[test]
    fn test_expand_template() {
        let ctx = ctx();
        assert_eq!(
            expand_template("{{folder}}-{{note}}-{{ anchor }}-{{date}}", &ctx, "cat"),
            "travel-trip-cat-20240102"
        );
        assert_eq!(expand_template("{{anchor}}", &ctx, ""), "");
        assert_eq!(expand_template("fixed", &ctx, "cat"), "fixed");
    }

    #[test]
    fn test_render_styles() {
        let resolved = ResolvedName {
            path: PathBuf::from("media/my cat.png"),
            needs_write: true,
        };
        assert_eq!(
            render_reference(LinkStyle::Wiki, "cat", &resolved),
            "![[media/my cat.png]]"
        );
        assert_eq!(
            render_reference(LinkStyle::Markdown, "cat", &resolved),
            "![cat](<media/my cat.png>)"
        );
    }

    #[test]
    fn test_clean_malformed_tags() {
        let text = "x [![[media/a.png]](https://site/page)] y ![[media/b.png]]";
        assert_eq!(
            clean_malformed_tags(text),
            "x ![[media/a.png]] y ![[media/b.png]]"
        );

        let linked = "[![[media/c.png]]](https://site/page) and [text](https://site)";
        assert_eq!(
            clean_malformed_tags(linked),
            "![[media/c.png]] and [text](https://site)"
        );
    }
}
