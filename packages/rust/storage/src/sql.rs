//! Embedded libSQL storage engine.
//!
//! Artifacts and manifests live in a single database file inside the cache
//! directory. Both writes are upserts, so a re-run replaces rather than
//! duplicates.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};

use wgdigest_shared::{CollectionId, Group, GroupManifest, ItemId, Result, WgDigestError};

use crate::{ArtifactCache, ManifestStore, decode_manifest, migrations};

/// Artifact cache and manifest store backed by a libSQL database.
pub struct SqlStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl SqlStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        let store = Self::connect(path, false).await?;
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open a database at `path` rejecting all artifact and manifest writes.
    ///
    /// A missing schema is still created so an empty cache reads as empty.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let store = Self::connect(path, true).await?;
        store.run_migrations().await?;
        Ok(store)
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WgDigestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self { db, conn, readonly })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        WgDigestError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            // Table doesn't exist yet
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(WgDigestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactCache for SqlStore {
    async fn exists(&self, collection: CollectionId, item_id: &ItemId) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM artifacts WHERE collection = ?1 AND item_id = ?2",
                params![i64::from(collection.0), item_id.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(rows.next().await.map_err(db_err)?.is_some())
    }

    async fn get(&self, collection: CollectionId, item_id: &ItemId) -> Result<String> {
        let mut rows = self
            .conn
            .query(
                "SELECT content FROM artifacts WHERE collection = ?1 AND item_id = ?2",
                params![i64::from(collection.0), item_id.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => row.get::<String>(0).map_err(db_err),
            None => Err(WgDigestError::ArtifactNotFound {
                collection,
                item_id: item_id.to_string(),
            }),
        }
    }

    async fn put(&self, collection: CollectionId, item_id: &ItemId, content: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO artifacts (collection, item_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, item_id) DO UPDATE SET
                    content = excluded.content,
                    created_at = excluded.created_at",
                params![
                    i64::from(collection.0),
                    item_id.as_str(),
                    content,
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        tracing::debug!(%collection, %item_id, size = content.len(), "cached artifact");
        Ok(())
    }

    async fn list_keys(&self, collection: CollectionId) -> Result<Vec<ItemId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT item_id FROM artifacts WHERE collection = ?1 ORDER BY item_id",
                params![i64::from(collection.0)],
            )
            .await
            .map_err(db_err)?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            keys.push(ItemId::new(row.get::<String>(0).map_err(db_err)?));
        }
        Ok(keys)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collection FROM artifacts
                 UNION
                 SELECT collection FROM manifests
                 ORDER BY collection",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut collections = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let raw = row.get::<i64>(0).map_err(db_err)?;
            let number = u32::try_from(raw).map_err(|_| {
                WgDigestError::Storage(format!("invalid collection number {raw} in database"))
            })?;
            collections.push(CollectionId(number));
        }
        Ok(collections)
    }
}

#[async_trait]
impl ManifestStore for SqlStore {
    async fn save(&self, collection: CollectionId, groups: &[Group]) -> Result<GroupManifest> {
        self.check_writable()?;
        let manifest = GroupManifest::new(collection, groups.to_vec());
        let json = serde_json::to_string(&manifest).map_err(|e| {
            WgDigestError::Storage(format!("manifest serialization failed: {e}"))
        })?;
        let generated_at = manifest.generated_at.to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO manifests (collection, manifest_json, generated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection) DO UPDATE SET
                    manifest_json = excluded.manifest_json,
                    generated_at = excluded.generated_at",
                params![i64::from(collection.0), json.as_str(), generated_at.as_str()],
            )
            .await
            .map_err(db_err)?;
        tracing::debug!(%collection, groups = groups.len(), "manifest saved");
        Ok(manifest)
    }

    async fn load_optional(&self, collection: CollectionId) -> Result<Option<GroupManifest>> {
        let mut rows = self
            .conn
            .query(
                "SELECT manifest_json FROM manifests WHERE collection = ?1",
                params![i64::from(collection.0)],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let json = row.get::<String>(0).map_err(db_err)?;
                decode_manifest(collection, &json).map(Some)
            }
            None => Ok(None),
        }
    }
}

fn db_err(e: libsql::Error) -> WgDigestError {
    WgDigestError::Storage(e.to_string())
}
