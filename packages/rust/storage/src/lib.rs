//! Artifact cache and group manifest storage.
//!
//! Two contracts, [`ArtifactCache`] and [`ManifestStore`], and two engines
//! implementing both:
//! - [`FsStore`]: one human-readable file per artifact plus a
//!   `manifest.json` per collection (default, easy to inspect by hand)
//! - [`SqlStore`]: an embedded libSQL database
//!
//! The pipeline only ever sees `dyn Store`, so engines can be swapped via
//! configuration without touching the driver or the assembler.
//!
//! **Write discipline:** artifacts are replaced one key at a time; manifests
//! are replaced as a whole and never partially updated.

mod fs;
mod migrations;
mod sql;

use std::path::Path;

use async_trait::async_trait;
use wgdigest_shared::{
    CollectionId, Group, GroupManifest, ItemId, Result, StorageBackend, WgDigestError,
};

pub use fs::FsStore;
pub use sql::SqlStore;

/// File name of the libSQL database inside the cache directory.
pub const DB_FILE_NAME: &str = "wgdigest.db";

/// Durable store of one generated artifact per `(collection, item)`.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Pure existence check.
    async fn exists(&self, collection: CollectionId, item_id: &ItemId) -> Result<bool>;

    /// Read an artifact; fails with [`WgDigestError::ArtifactNotFound`] if absent.
    async fn get(&self, collection: CollectionId, item_id: &ItemId) -> Result<String>;

    /// Write an artifact. Overwrites silently; callers check [`exists`](Self::exists) first.
    async fn put(&self, collection: CollectionId, item_id: &ItemId, content: &str) -> Result<()>;

    /// Every item cached for `collection`, sorted.
    async fn list_keys(&self, collection: CollectionId) -> Result<Vec<ItemId>>;

    /// Every collection with any cached content, ascending.
    async fn list_collections(&self) -> Result<Vec<CollectionId>>;
}

/// Durable, whole-record store of one [`GroupManifest`] per collection.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Atomically replace the manifest of `collection`. Order is persisted as given.
    async fn save(&self, collection: CollectionId, groups: &[Group]) -> Result<GroupManifest>;

    /// Load a manifest; `Ok(None)` if it was never saved.
    async fn load_optional(&self, collection: CollectionId) -> Result<Option<GroupManifest>>;

    /// Load a manifest; fails with [`WgDigestError::ManifestMissing`] if never saved.
    async fn load(&self, collection: CollectionId) -> Result<GroupManifest> {
        self.load_optional(collection)
            .await?
            .ok_or(WgDigestError::ManifestMissing { collection })
    }
}

/// Anything that is both an artifact cache and a manifest store.
pub trait Store: ArtifactCache + ManifestStore {}

impl<T: ArtifactCache + ManifestStore> Store for T {}

/// Open the configured storage engine rooted at `cache_dir`.
pub async fn open_store(
    backend: StorageBackend,
    cache_dir: &Path,
    readonly: bool,
) -> Result<Box<dyn Store>> {
    tracing::debug!(?backend, path = %cache_dir.display(), readonly, "opening store");
    match backend {
        StorageBackend::Fs => {
            let store = FsStore::new(cache_dir);
            Ok(Box::new(if readonly { store.readonly() } else { store }))
        }
        StorageBackend::Libsql => {
            let db_path = cache_dir.join(DB_FILE_NAME);
            let store = if readonly {
                SqlStore::open_readonly(&db_path).await?
            } else {
                SqlStore::open(&db_path).await?
            };
            Ok(Box::new(store))
        }
    }
}

/// Decode a stored manifest and check its schema version.
pub(crate) fn decode_manifest(collection: CollectionId, json: &str) -> Result<GroupManifest> {
    let manifest: GroupManifest = serde_json::from_str(json).map_err(|e| {
        WgDigestError::Storage(format!("corrupt manifest for collection {collection}: {e}"))
    })?;

    if manifest.schema_version != wgdigest_shared::CURRENT_SCHEMA_VERSION {
        return Err(WgDigestError::validation(format!(
            "unsupported manifest schema_version {} for collection {collection} (expected {})",
            manifest.schema_version,
            wgdigest_shared::CURRENT_SCHEMA_VERSION
        )));
    }
    Ok(manifest)
}
