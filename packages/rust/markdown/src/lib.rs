//! Transcript normalisation and Markdown rendering helpers.
//!
//! Two directions live here:
//! - inbound: transcript pages (HTML or WebVTT captions) are reduced to plain
//!   Markdown text before they reach the generator
//! - outbound: small building blocks (YAML frontmatter, slugs, link lists)
//!   used by the site publisher

mod captions;
mod cleanup;
mod render;

use scraper::{Html, Selector};
use tracing::{debug, instrument};

use wgdigest_shared::{Result, WgDigestError};

pub use captions::captions_to_text;
pub use render::{Frontmatter, escape_yaml_string, link_list, slugify};

/// Tags whose content never carries transcript text.
const SKIP_TAGS: [&str; 9] = [
    "script", "style", "nav", "header", "footer", "iframe", "noscript", "svg", "form",
];

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert a transcript HTML page to clean Markdown text.
///
/// 1. Picks the transcript container (or `<body>`)
/// 2. Converts HTML → Markdown via `htmd`
/// 3. Runs the cleanup pipeline
#[instrument(skip(html), fields(html_len = html.len()))]
pub fn html_to_text(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| WgDigestError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw_markdown.len(), "htmd conversion complete");

    let cleaned = cleanup::run_pipeline(&raw_markdown);
    if cleaned.trim().is_empty() {
        return Ok(String::new());
    }
    Ok(cleaned)
}

/// Extract the transcript HTML, stripping page chrome.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    // Known transcript containers in priority order
    let selectors = [
        "#transcript",
        ".transcript",
        "[role=\"main\"]",
        "article",
        "main",
        "pre",
    ];

    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    html.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
