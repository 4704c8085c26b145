//! Preview metadata and the small pure helpers shared by both acquisition paths.

use serde::{Deserialize, Serialize};
use url::Url;

/// Maximum stored title length, in characters.
pub const TITLE_MAX_CHARS: usize = 249;

/// Title, description and image candidate pulled from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    /// Title, already truncated
    pub title: String,

    /// `og:description` content, or empty
    pub description: String,

    /// Absolute `og:image` URL
    pub image_url: Option<Url>,
}

impl ExtractedMetadata {
    /// Build metadata from raw candidate strings, applying the shared rules:
    /// `og:title` wins over the document title, titles are truncated, and the
    /// image candidate is resolved against `base`.
    pub fn from_candidates(
        og_title: Option<&str>,
        document_title: Option<&str>,
        og_description: Option<&str>,
        og_image: Option<&str>,
        base: &Url,
        max_title_chars: usize,
    ) -> Self {
        let title = non_empty(og_title)
            .or_else(|| non_empty(document_title))
            .map(|t| truncate_chars(t, max_title_chars))
            .unwrap_or_default();

        let description = non_empty(og_description).unwrap_or_default().to_string();

        let image_url = non_empty(og_image).and_then(|raw| resolve_image_url(base, raw));

        Self {
            title,
            description,
            image_url,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_url.is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Truncate a title to the stored limit.
pub fn truncate_title(title: &str) -> String {
    truncate_chars(title, TITLE_MAX_CHARS)
}

/// Resolve an `og:image` value against the page URL.
///
/// Only http(s) results are kept; `data:` URIs and other schemes are dropped.
pub fn resolve_image_url(base: &Url, raw: &str) -> Option<Url> {
    let resolved = base.join(raw.trim()).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Host of `url` with any leading `www.` removed.
///
/// `https://www.example.com/a/b` → `example.com`;
/// `http://sub.example.org` → `sub.example.org`.
pub fn derive_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
