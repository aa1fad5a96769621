//! Flat-file storage engine.
//!
//! Layout under the cache root:
//! ```text
//! <root>/
//! ├── 120/
//! │   ├── IETF120-QUIC-20240722-1300.md
//! │   ├── IETF120-QUIC-20240724-0930.md
//! │   └── manifest.json
//! └── 121/
//!     └── ...
//! ```
//! Artifacts are stored as the raw model output, keyed by the readable item
//! identifier. Every write lands in a dot-prefixed temporary file in the same
//! directory and is then renamed over the target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use wgdigest_shared::{CollectionId, Group, GroupManifest, ItemId, Result, WgDigestError};

use crate::{ArtifactCache, ManifestStore, decode_manifest};

const ARTIFACT_EXT: &str = "md";
const MANIFEST_FILE: &str = "manifest.json";

/// Filesystem-backed artifact cache and manifest store.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    readonly: bool,
}

impl FsStore {
    /// Store rooted at `root`. Directories are created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            readonly: false,
        }
    }

    /// Reject all writes (used by the publish pass).
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: CollectionId) -> PathBuf {
        self.root.join(collection.to_string())
    }

    fn artifact_path(&self, collection: CollectionId, item_id: &ItemId) -> Result<PathBuf> {
        check_key(item_id)?;
        Ok(self
            .collection_dir(collection)
            .join(format!("{item_id}.{ARTIFACT_EXT}")))
    }

    fn manifest_path(&self, collection: CollectionId) -> PathBuf {
        self.collection_dir(collection).join(MANIFEST_FILE)
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(WgDigestError::Storage(
                "store is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Whether a collection directory holds any artifact or a manifest.
    async fn has_content(&self, dir: &Path) -> Result<bool> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| WgDigestError::io(dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WgDigestError::io(dir, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == MANIFEST_FILE || artifact_key(&name).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl ArtifactCache for FsStore {
    async fn exists(&self, collection: CollectionId, item_id: &ItemId) -> Result<bool> {
        let path = self.artifact_path(collection, item_id)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| WgDigestError::io(&path, e))
    }

    async fn get(&self, collection: CollectionId, item_id: &ItemId) -> Result<String> {
        let path = self.artifact_path(collection, item_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WgDigestError::ArtifactNotFound {
                    collection,
                    item_id: item_id.to_string(),
                })
            }
            Err(e) => Err(WgDigestError::io(&path, e)),
        }
    }

    async fn put(&self, collection: CollectionId, item_id: &ItemId, content: &str) -> Result<()> {
        self.check_writable()?;
        let path = self.artifact_path(collection, item_id)?;
        write_atomic(&path, content.as_bytes()).await?;
        debug!(%collection, %item_id, size = content.len(), "cached artifact");
        Ok(())
    }

    async fn list_keys(&self, collection: CollectionId) -> Result<Vec<ItemId>> {
        let dir = self.collection_dir(collection);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WgDigestError::io(&dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WgDigestError::io(&dir, e))?
        {
            let name = entry.file_name();
            if let Some(key) = artifact_key(&name.to_string_lossy()) {
                keys.push(ItemId::new(key));
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WgDigestError::io(&self.root, e)),
        };

        let mut collections = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WgDigestError::io(&self.root, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // Only plain numeric directories are collections.
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let Ok(number) = name.parse::<u32>() else {
                continue;
            };
            // `0121` would list as 121 but never be read back from `121/`.
            if name != number.to_string() {
                continue;
            }
            if entry.path().is_dir() && self.has_content(&entry.path()).await? {
                collections.push(CollectionId(number));
            }
        }
        collections.sort();
        Ok(collections)
    }
}

#[async_trait]
impl ManifestStore for FsStore {
    async fn save(&self, collection: CollectionId, groups: &[Group]) -> Result<GroupManifest> {
        self.check_writable()?;
        let manifest = GroupManifest::new(collection, groups.to_vec());
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| {
            WgDigestError::Storage(format!("manifest serialization failed: {e}"))
        })?;

        let path = self.manifest_path(collection);
        write_atomic(&path, json.as_bytes()).await?;
        debug!(%collection, groups = groups.len(), path = %path.display(), "manifest saved");
        Ok(manifest)
    }

    async fn load_optional(&self, collection: CollectionId) -> Result<Option<GroupManifest>> {
        let path = self.manifest_path(collection);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => decode_manifest(collection, &json).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WgDigestError::io(&path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Item ids become file names, so they must be a single safe path component.
fn check_key(item_id: &ItemId) -> Result<()> {
    let id = item_id.as_str();
    if id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0'])
    {
        return Err(WgDigestError::validation(format!(
            "item id '{id}' cannot be used as a cache key"
        )));
    }
    Ok(())
}

/// Map a directory entry name back to its item id, ignoring temp files.
fn artifact_key(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }
    file_name
        .strip_suffix(ARTIFACT_EXT)?
        .strip_suffix('.')
        .filter(|key| !key.is_empty())
}

/// Write to a temp file next to `path`, then rename over it.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| WgDigestError::Storage(format!("no parent for {}", path.display())))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| WgDigestError::io(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{file_name}.{}.tmp", Uuid::now_v7()));

    tokio::fs::write(&temp, bytes)
        .await
        .map_err(|e| WgDigestError::io(&temp, e))?;

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(WgDigestError::io(path, e));
    }
    Ok(())
}
