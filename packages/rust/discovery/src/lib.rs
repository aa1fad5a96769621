//! Session listing discovery.
//!
//! Each meeting publishes a proceedings page linking to the recording of every
//! working-group session. The listing is scanned for anchors carrying a
//! session identifier (`IETF121-QUIC-20241105-1300`), which become the items
//! of the collection in page order.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use wgdigest_shared::{
    COLLECTION_PREFIX, CollectionId, Item, ItemId, ItemSource, Result, SourceConfig,
    WgDigestError,
};

/// Maximum number of redirects to follow when fetching a listing.
const MAX_REDIRECTS: usize = 5;

/// Maximum listing size we accept (20 MB).
const MAX_RESPONSE_SIZE: u64 = 20 * 1024 * 1024;

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

// ---------------------------------------------------------------------------
// SessionListingSource
// ---------------------------------------------------------------------------

/// [`ItemSource`] backed by the per-meeting session listing page.
#[derive(Debug, Clone)]
pub struct SessionListingSource {
    client: Client,
    config: SourceConfig,
}

impl SessionListingSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            config: config.clone(),
        })
    }

    /// Fetch the raw listing HTML for one collection.
    async fn fetch_listing(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| WgDigestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WgDigestError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(WgDigestError::validation(format!(
                    "{url}: listing too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        response
            .text()
            .await
            .map_err(|e| WgDigestError::Network(format!("{url}: failed to read body: {e}")))
    }
}

#[async_trait]
impl ItemSource for SessionListingSource {
    #[instrument(skip(self), fields(%collection))]
    async fn list_items(&self, collection: CollectionId) -> Result<Vec<Item>> {
        let raw_url = self.config.listing_url_for(collection);
        let url = Url::parse(&raw_url)
            .map_err(|e| WgDigestError::config(format!("invalid listing URL {raw_url}: {e}")))?;

        info!(%url, "fetching session listing");
        let html = self.fetch_listing(&url).await?;
        let items = extract_items(&html, &url, collection)?;

        if items.is_empty() {
            warn!(%url, "listing contains no session recordings");
        } else {
            info!(items = items.len(), "session listing parsed");
        }
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Listing parser
// ---------------------------------------------------------------------------

/// Identifier pattern for one collection: `IETF{n}-{NAME}-{YYYYMMDD}-{HHMM}`.
fn identifier_pattern(collection: CollectionId) -> Result<Regex> {
    Regex::new(&format!(
        r"{COLLECTION_PREFIX}{collection}-[A-Za-z0-9][A-Za-z0-9_-]*?-\d{{8}}-\d{{4}}\b"
    ))
    .map_err(|e| WgDigestError::parse(format!("identifier pattern: {e}")))
}

/// Extract items from a listing page, in page order, first occurrence wins.
pub fn extract_items(html: &str, base: &Url, collection: CollectionId) -> Result<Vec<Item>> {
    let pattern = identifier_pattern(collection)?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for anchor in document.select(&ANCHOR_SEL) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text: String = anchor.text().collect();

        let Some(found) = pattern
            .find(href)
            .or_else(|| pattern.find(&text))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };

        if !seen.insert(found.clone()) {
            continue;
        }

        let id = ItemId::new(found);
        let Some(display_name) = id.display_name().map(str::to_string) else {
            debug!(%id, "identifier without a name segment, skipping");
            continue;
        };

        let mut item = Item {
            id,
            display_name,
            external_ref: None,
        };
        match base.join(href) {
            Ok(absolute) => item = item.with_external_ref(absolute.to_string()),
            Err(e) => debug!(href, error = %e, "unresolvable href, no external ref"),
        }
        items.push(item);
    }

    Ok(items)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with the configured user agent and timeout.
fn build_client(config: &SourceConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| WgDigestError::Network(format!("failed to build HTTP client: {e}")))
}
