//! Open Graph metadata extraction.
//!
//! Precedence is explicit and shared by both paths:
//! - title: `og:title` → `<title>` → empty, truncated to the title limit
//! - description: `og:description` → empty
//! - image: `og:image` resolved against the page URL → none
//!
//! Bytes are decoded with the charset from `Content-Type`, else a
//! `<meta charset>` declaration near the top of the document, else UTF-8.
//!
//! The lightweight path runs [`extract_metadata`] over fetched bytes. The
//! browser fallback evaluates [`IN_PAGE_EXTRACT_JS`] against the live DOM and
//! feeds the raw candidates through the same [`ExtractedMetadata::from_candidates`].

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::types::metadata::{ExtractedMetadata, TITLE_MAX_CHARS};

/// Extract preview metadata from raw HTML bytes.
///
/// Never fails: malformed markup parses best-effort and missing tags yield
/// empty fields.
pub fn extract_metadata(html: &[u8], base_url: &Url) -> ExtractedMetadata {
    extract_metadata_with_limit(html, None, base_url, TITLE_MAX_CHARS)
}

/// As [`extract_metadata`], honouring the response `Content-Type` charset
/// and a custom title limit.
pub fn extract_metadata_with_limit(
    html: &[u8],
    content_type: Option<&str>,
    base_url: &Url,
    max_title_chars: usize,
) -> ExtractedMetadata {
    let text = decode_html(html, content_type);
    let document = Html::parse_document(&text);

    let og_title = og_content(&document, "og:title");
    let document_title = document_title(&document);
    let og_description = og_content(&document, "og:description");
    let og_image = og_content(&document, "og:image");

    ExtractedMetadata::from_candidates(
        og_title.as_deref(),
        document_title.as_deref(),
        og_description.as_deref(),
        og_image.as_deref(),
        base_url,
        max_title_chars,
    )
}

/// Decode HTML bytes to text.
///
/// A byte-order mark wins, then the `Content-Type` charset, then a
/// `<meta charset>` / `http-equiv` declaration in the first 1024 bytes, then
/// UTF-8. Unknown labels are ignored; undecodable bytes become U+FFFD.
pub fn decode_html<'a>(html: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| meta_charset(html))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(html);
    text
}

/// `charset` parameter of a `Content-Type` value.
fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(|c| c == '"' || c == '\''))
        } else {
            None
        }
    })
}

/// Charset declared by a `<meta>` tag in the document prefix.
fn meta_charset(html: &[u8]) -> Option<&'static Encoding> {
    let prefix = &html[..html.len().min(1024)];
    let prefix = String::from_utf8_lossy(prefix).to_ascii_lowercase();

    let encoding = prefix.split("<meta").skip(1).find_map(|tag| {
        let tag = tag.split('>').next()?;
        let (_, rest) = tag.split_once("charset")?;
        let rest = rest.trim_start().strip_prefix('=')?;
        let label: String = rest
            .trim_start()
            .trim_start_matches(|c| c == '"' || c == '\'')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
            .collect();
        Encoding::for_label(label.as_bytes())
    })?;

    // A UTF-16 label in ASCII-compatible markup is a mislabel.
    if encoding == UTF_16LE || encoding == UTF_16BE {
        Some(UTF_8)
    } else {
        Some(encoding)
    }
}

/// First non-empty `content` of `<meta property=...>`, then `<meta name=...>`.
fn og_content(document: &Html, property: &str) -> Option<String> {
    ["property", "name"].iter().find_map(|attr| {
        let selector = Selector::parse(&format!(r#"meta[{}="{}"]"#, attr, property)).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
            .map(str::to_string)
    })
}

fn document_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Script evaluated inside the rendered page. Returns the raw candidates;
/// precedence and truncation are applied on the Rust side.
pub const IN_PAGE_EXTRACT_JS: &str = r#"(() => {
    const meta = (key) => {
        for (const attr of ['property', 'name']) {
            for (const el of document.querySelectorAll(`meta[${attr}="${key}"]`)) {
                const content = (el.getAttribute('content') || '').trim();
                if (content) return content;
            }
        }
        return null;
    };
    const titleEl = document.querySelector('title');
    return {
        og_title: meta('og:title'),
        document_title: titleEl ? titleEl.textContent : null,
        og_description: meta('og:description'),
        og_image: meta('og:image'),
        location: window.location.href,
    };
})()"#;

/// Raw candidates returned by [`IN_PAGE_EXTRACT_JS`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InPageCandidates {
    pub og_title: Option<String>,
    pub document_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub location: Option<String>,
}

impl InPageCandidates {
    /// Apply the shared precedence rules. Relative images resolve against the
    /// page's live location, falling back to `requested`.
    pub fn into_metadata(self, requested: &Url, max_title_chars: usize) -> (ExtractedMetadata, Url) {
        let base = self
            .location
            .as_deref()
            .and_then(|l| Url::parse(l).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or_else(|| requested.clone());

        let metadata = ExtractedMetadata::from_candidates(
            self.og_title.as_deref(),
            self.document_title.as_deref(),
            self.og_description.as_deref(),
            self.og_image.as_deref(),
            &base,
            max_title_chars,
        );

        (metadata, base)
    }
}
