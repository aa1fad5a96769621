//! Async seams to the external collaborators of the pipeline.
//!
//! The collect stage talks to the outside world only through these traits,
//! so tests (and alternative sources) can swap implementations freely.

use async_trait::async_trait;

use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::types::{CollectionId, Item, ItemId};

/// Produces the raw items of a collection.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// List the items of `collection` in source order.
    async fn list_items(&self, collection: CollectionId) -> Result<Vec<Item>>;
}

/// Retrieves the raw text behind an item identifier.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch raw content; any non-success condition is
    /// [`WgDigestError::Unavailable`](crate::WgDigestError::Unavailable).
    async fn fetch(&self, item_id: &ItemId) -> Result<String>;
}

/// Turns raw content into a derived text artifact.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate an artifact for one item.
    ///
    /// The backend is chosen by `config` on every call; implementations hold
    /// no process-wide model selection.
    async fn generate(
        &self,
        content: &str,
        display_name: &str,
        config: &GeneratorConfig,
    ) -> Result<String>;
}
