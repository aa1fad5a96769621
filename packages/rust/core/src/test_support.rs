//! In-memory collaborators for pipeline and publish tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use wgdigest_shared::{
    CollectionId, ContentFetcher, Generator, GeneratorConfig, Item, ItemId, ItemSource, Result,
    WgDigestError,
};
use wgdigest_storage::FsStore;

use crate::publish::{GroupPage, IndexEntry, PageRecord, Publisher};

pub fn temp_fs_store() -> FsStore {
    FsStore::new(std::env::temp_dir().join(format!("wgd-core-test-{}", Uuid::now_v7())))
}

// ---------------------------------------------------------------------------
// FakeSource
// ---------------------------------------------------------------------------

/// Returns the same items for every collection, except those set to fail.
pub struct FakeSource {
    items: Vec<Item>,
    failing: HashSet<CollectionId>,
}

impl FakeSource {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            failing: HashSet::new(),
        }
    }

    pub fn failing_for(mut self, collection: CollectionId) -> Self {
        self.failing.insert(collection);
        self
    }
}

#[async_trait]
impl ItemSource for FakeSource {
    async fn list_items(&self, collection: CollectionId) -> Result<Vec<Item>> {
        if self.failing.contains(&collection) {
            return Err(WgDigestError::Network(format!(
                "listing for {collection} unreachable"
            )));
        }
        Ok(self.items.clone())
    }
}

// ---------------------------------------------------------------------------
// FakeFetcher
// ---------------------------------------------------------------------------

/// Raw content is the item id itself.
#[derive(Default)]
pub struct FakeFetcher {
    missing: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn missing(ids: &[&str]) -> Self {
        Self {
            missing: ids.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, item_id: &ItemId) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(item_id.as_str()) {
            return Err(WgDigestError::Unavailable(format!(
                "no transcript for {item_id}"
            )));
        }
        Ok(item_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// FakeGenerator
// ---------------------------------------------------------------------------

/// Produces `summary of {content} for {display_name}` unless told otherwise.
#[derive(Default)]
pub struct FakeGenerator {
    failing: HashSet<String>,
    fixed: Option<String>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn failing_on(contents: &[&str]) -> Self {
        Self {
            failing: contents.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn returning(output: &str) -> Self {
        Self {
            fixed: Some(output.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(
        &self,
        content: &str,
        display_name: &str,
        _config: &GeneratorConfig,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(content) {
            return Err(WgDigestError::Generation(format!("model refused {content}")));
        }
        Ok(match &self.fixed {
            Some(output) => output.clone(),
            None => format!("summary of {content} for {display_name}"),
        })
    }
}

// ---------------------------------------------------------------------------
// NullPublisher
// ---------------------------------------------------------------------------

/// Records what it is asked to publish without touching the filesystem.
#[derive(Default)]
pub struct NullPublisher {
    groups: Mutex<Vec<(CollectionId, String, String)>>,
    root: Mutex<Vec<CollectionId>>,
}

impl NullPublisher {
    /// `(collection, display_name, combined)` per published group.
    pub fn groups(&self) -> Vec<(CollectionId, String, String)> {
        self.groups.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn root_index(&self) -> Vec<CollectionId> {
        self.root.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

fn record(path: String) -> PageRecord {
    PageRecord {
        path,
        sha256: String::new(),
        bytes: 0,
        written: true,
    }
}

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish_group(&self, page: &GroupPage<'_>) -> Result<PageRecord> {
        if let Ok(mut groups) = self.groups.lock() {
            groups.push((
                page.collection,
                page.display_name.to_string(),
                page.combined.to_string(),
            ));
        }
        Ok(record(format!("{}/{}.md", page.collection, page.slug)))
    }

    async fn publish_collection_index(
        &self,
        collection: CollectionId,
        _entries: &[IndexEntry],
    ) -> Result<PageRecord> {
        Ok(record(format!("{collection}/index.md")))
    }

    async fn publish_root_index(&self, collections: &[CollectionId]) -> Result<PageRecord> {
        if let Ok(mut root) = self.root.lock() {
            *root = collections.to_vec();
        }
        Ok(record("index.md".into()))
    }
}
