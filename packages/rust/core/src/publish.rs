//! Render/Publish: assembled groups → Markdown document set.
//!
//! Output layout under the site root:
//! ```text
//! <site>/
//! ├── index.md              (root index, collections ascending)
//! └── 121/
//!     ├── index.md          (group names, alphabetical)
//!     ├── quic.md           (one page per group)
//!     └── pages.json        (checksums of the pages above)
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use wgdigest_markdown::{Frontmatter, link_list, slugify};
use wgdigest_shared::{CollectionId, Result, WgDigestError};
use wgdigest_storage::Store;

use crate::assembler::assemble_all;
use crate::index::{collection_index, page_slugs, root_index};

const PAGES_FILE: &str = "pages.json";
const INDEX_PAGE: &str = "index.md";
const SITE_TITLE: &str = "IETF session summaries";

// ---------------------------------------------------------------------------
// Publisher contract
// ---------------------------------------------------------------------------

/// Everything needed to render one group page.
#[derive(Debug, Clone)]
pub struct GroupPage<'a> {
    pub collection: CollectionId,
    pub slug: &'a str,
    pub display_name: &'a str,
    pub combined: &'a str,
    pub external_refs: &'a [String],
    /// When the collection's manifest was last written.
    pub updated: DateTime<Utc>,
}

/// One line of a collection index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub title: String,
    pub slug: String,
}

/// A page handed to the publisher, with its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Path relative to the site root.
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    /// `false` when the existing file already had identical content.
    pub written: bool,
}

/// Consumer of assembled output.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_group(&self, page: &GroupPage<'_>) -> Result<PageRecord>;

    async fn publish_collection_index(
        &self,
        collection: CollectionId,
        entries: &[IndexEntry],
    ) -> Result<PageRecord>;

    async fn publish_root_index(&self, collections: &[CollectionId]) -> Result<PageRecord>;

    /// Called once per collection after all its pages. Returns the number of
    /// stale pages removed.
    async fn finish_collection(
        &self,
        _collection: CollectionId,
        _pages: &[PageRecord],
    ) -> Result<usize> {
        Ok(0)
    }
}

/// Totals of one publish pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub collections: usize,
    pub groups: usize,
    pub pages_written: usize,
    pub pages_unchanged: usize,
    pub pages_removed: usize,
}

impl PublishReport {
    fn tally(&mut self, record: &PageRecord) {
        if record.written {
            self.pages_written += 1;
        } else {
            self.pages_unchanged += 1;
        }
    }
}

/// Assemble everything in the store and hand it to `publisher`.
#[instrument(skip_all)]
pub async fn publish(store: &dyn Store, publisher: &dyn Publisher) -> Result<PublishReport> {
    let assembled = assemble_all(store).await?;
    let mut report = PublishReport::default();
    let mut collections = Vec::with_capacity(assembled.len());

    for collection in &assembled {
        let names: Vec<String> = collection
            .groups
            .iter()
            .map(|g| g.display_name.clone())
            .collect();
        let slugs = page_slugs(&names);
        let mut records = Vec::with_capacity(names.len() + 1);

        for (group, slug) in collection.groups.iter().zip(&slugs) {
            let page = GroupPage {
                collection: collection.collection,
                slug,
                display_name: &group.display_name,
                combined: &group.combined,
                external_refs: &group.external_refs,
                updated: collection.generated_at,
            };
            let record = publisher.publish_group(&page).await?;
            report.tally(&record);
            records.push(record);
        }

        let slug_by_name: HashMap<&str, &str> = names
            .iter()
            .map(String::as_str)
            .zip(slugs.iter().map(String::as_str))
            .collect();
        let entries: Vec<IndexEntry> = collection_index(&names)
            .into_iter()
            .map(|title| {
                let slug = slug_by_name
                    .get(title.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| slugify(&title));
                IndexEntry { title, slug }
            })
            .collect();

        let record = publisher
            .publish_collection_index(collection.collection, &entries)
            .await?;
        report.tally(&record);
        records.push(record);

        report.pages_removed += publisher
            .finish_collection(collection.collection, &records)
            .await?;
        report.groups += collection.groups.len();
        collections.push(collection.collection);
    }

    let record = publisher
        .publish_root_index(&root_index(&collections))
        .await?;
    report.tally(&record);
    report.collections = collections.len();

    info!(
        collections = report.collections,
        groups = report.groups,
        written = report.pages_written,
        unchanged = report.pages_unchanged,
        removed = report.pages_removed,
        "publish complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// MarkdownSitePublisher
// ---------------------------------------------------------------------------

/// Writes Markdown pages with YAML frontmatter for a static site generator.
#[derive(Debug, Clone)]
pub struct MarkdownSitePublisher {
    site_dir: PathBuf,
}

/// Contents of `pages.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PagesFile {
    collection: CollectionId,
    pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PageEntry {
    /// Relative to the collection directory.
    path: String,
    sha256: String,
    bytes: u64,
}

impl MarkdownSitePublisher {
    pub fn new(site_dir: impl Into<PathBuf>) -> Self {
        Self {
            site_dir: site_dir.into(),
        }
    }

    pub fn site_dir(&self) -> &Path {
        &self.site_dir
    }

    /// Write `content` at `rel` (relative to the site root) unless identical.
    async fn write_page(&self, rel: &str, content: &str) -> Result<PageRecord> {
        let path = self.site_dir.join(rel);
        let sha256 = compute_hash(content.as_bytes());
        let bytes = content.len() as u64;

        let written = match tokio::fs::read(&path).await {
            Ok(existing) if existing == content.as_bytes() => {
                debug!(path = rel, "page unchanged");
                false
            }
            _ => {
                write_atomic(&path, content.as_bytes()).await?;
                debug!(path = rel, bytes, "page written");
                true
            }
        };

        Ok(PageRecord {
            path: rel.to_string(),
            sha256,
            bytes,
            written,
        })
    }

    async fn read_pages_file(&self, collection: CollectionId) -> Option<PagesFile> {
        let path = self.site_dir.join(collection.to_string()).join(PAGES_FILE);
        let json = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&json) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable pages.json");
                None
            }
        }
    }
}

#[async_trait]
impl Publisher for MarkdownSitePublisher {
    async fn publish_group(&self, page: &GroupPage<'_>) -> Result<PageRecord> {
        let frontmatter = Frontmatter::new()
            .string("title", page.display_name)
            .number("collection", page.collection)
            .string("updated", &page.updated.to_rfc3339())
            .list("recordings", page.external_refs)
            .render();

        let mut content = format!(
            "{frontmatter}\n# {}\n\n{}\n",
            page.display_name,
            page.combined.trim()
        );
        let refs = link_list("Recordings", "Recording", page.external_refs);
        if !refs.is_empty() {
            content.push('\n');
            content.push_str(&refs);
        }

        self.write_page(&format!("{}/{}.md", page.collection, page.slug), &content)
            .await
    }

    async fn publish_collection_index(
        &self,
        collection: CollectionId,
        entries: &[IndexEntry],
    ) -> Result<PageRecord> {
        let title = format!("IETF {collection}");
        let mut content = Frontmatter::new()
            .string("title", &title)
            .number("collection", collection)
            .render();
        content.push_str(&format!("\n# {title}\n\n"));

        if entries.is_empty() {
            content.push_str("_No sessions summarised yet._\n");
        }
        for entry in entries {
            content.push_str(&format!(
                "- [{}]({}.md)\n",
                escape_link_text(&entry.title),
                entry.slug
            ));
        }

        self.write_page(&format!("{collection}/{INDEX_PAGE}"), &content)
            .await
    }

    async fn publish_root_index(&self, collections: &[CollectionId]) -> Result<PageRecord> {
        let mut content = Frontmatter::new().string("title", SITE_TITLE).render();
        content.push_str(&format!("\n# {SITE_TITLE}\n\n"));

        if collections.is_empty() {
            content.push_str("_Nothing published yet._\n");
        }
        for collection in collections {
            content.push_str(&format!(
                "- [IETF {collection}]({collection}/{INDEX_PAGE})\n"
            ));
        }

        self.write_page(INDEX_PAGE, &content).await
    }

    async fn finish_collection(
        &self,
        collection: CollectionId,
        pages: &[PageRecord],
    ) -> Result<usize> {
        let dir = self.site_dir.join(collection.to_string());
        let prefix = format!("{collection}/");

        let entries: Vec<PageEntry> = pages
            .iter()
            .filter_map(|p| {
                Some(PageEntry {
                    path: p.path.strip_prefix(&prefix)?.to_string(),
                    sha256: p.sha256.clone(),
                    bytes: p.bytes,
                })
            })
            .collect();

        // Remove pages published last time that no longer have a group.
        let mut removed = 0;
        if let Some(previous) = self.read_pages_file(collection).await {
            let current: HashSet<&str> = entries.iter().map(|e| e.path.as_str()).collect();
            for old in previous.pages {
                if current.contains(old.path.as_str()) || !is_plain_page_name(&old.path) {
                    continue;
                }
                let path = dir.join(&old.path);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        info!(path = %path.display(), "removed stale page");
                        removed += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(WgDigestError::io(&path, e)),
                }
            }
        }

        let file = PagesFile {
            collection,
            pages: entries,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| WgDigestError::Storage(format!("pages.json serialization: {e}")))?;
        self.write_page(&format!("{collection}/{PAGES_FILE}"), &json)
            .await?;

        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// Only bare `*.md` names inside the collection directory may be deleted.
fn is_plain_page_name(name: &str) -> bool {
    name.ends_with(".md")
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name != INDEX_PAGE
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{NullPublisher, temp_fs_store};
    use wgdigest_shared::{Group, GroupMember, ItemId};
    use wgdigest_storage::ManifestStore;

    fn temp_site() -> PathBuf {
        std::env::temp_dir().join(format!("wgd-site-test-{}", Uuid::now_v7()))
    }

    fn group(name: &str, ids: &[(&str, Option<&str>)]) -> Group {
        Group {
            display_name: name.into(),
            members: ids
                .iter()
                .map(|(id, r)| GroupMember {
                    item_id: ItemId::new(*id),
                    external_ref: r.map(str::to_string),
                })
                .collect(),
        }
    }

    async fn seed(store: &dyn Store, collection: u32, groups: &[Group]) {
        for g in groups {
            for m in &g.members {
                store
                    .put(
                        CollectionId(collection),
                        &m.item_id,
                        &format!("summary {}", m.item_id),
                    )
                    .await
                    .unwrap();
            }
        }
        store.save(CollectionId(collection), groups).await.unwrap();
    }

    #[tokio::test]
    async fn root_index_orders_collections_numerically() {
        let store = temp_fs_store();
        for n in [12, 3, 101] {
            seed(&store, n, &[group("X", &[("A1", None)])]).await;
        }

        let publisher = NullPublisher::default();
        let report = publish(&store, &publisher).await.unwrap();
        assert_eq!(report.collections, 3);
        assert_eq!(
            publisher.root_index(),
            vec![CollectionId(3), CollectionId(12), CollectionId(101)]
        );

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn writes_site_layout() {
        let store = temp_fs_store();
        seed(
            &store,
            121,
            &[
                group(
                    "QUIC",
                    &[
                        ("IETF121-QUIC-20241105-1300", Some("https://rec/1")),
                        ("IETF121-QUIC-20241107-0930", Some("https://rec/2")),
                    ],
                ),
                group("add", &[("IETF121-ADD-20241106-0930", None)]),
            ],
        )
        .await;
        let site = temp_site();
        let publisher = MarkdownSitePublisher::new(&site);

        let report = publish(&store, &publisher).await.unwrap();
        assert_eq!(report.groups, 2);
        // two groups, collection index, root index
        assert_eq!(report.pages_written, 4);

        let quic = std::fs::read_to_string(site.join("121/quic.md")).unwrap();
        assert!(quic.starts_with("---\ntitle: \"QUIC\"\ncollection: 121\n"));
        assert!(quic.contains("  - \"https://rec/1\"\n"));
        assert!(quic.contains("### Session 2024-11-05 13:00 UTC"));
        assert!(quic.contains("\n\n---\n\n### Session 2024-11-07 09:30 UTC"));
        assert!(quic.contains("- [Recording 2](https://rec/2)"));

        let add = std::fs::read_to_string(site.join("121/add.md")).unwrap();
        assert!(add.contains("recordings: []"));
        assert!(!add.contains("## Recordings"));

        let index = std::fs::read_to_string(site.join("121/index.md")).unwrap();
        let add_pos = index.find("[add](add.md)").unwrap();
        let quic_pos = index.find("[QUIC](quic.md)").unwrap();
        assert!(add_pos < quic_pos);

        let root = std::fs::read_to_string(site.join("index.md")).unwrap();
        assert!(root.contains("- [IETF 121](121/index.md)"));

        let pages: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(site.join("121/pages.json")).unwrap())
                .unwrap();
        assert_eq!(pages["pages"].as_array().unwrap().len(), 3);
        assert_eq!(
            pages["pages"][0]["sha256"].as_str().unwrap(),
            compute_hash(quic.as_bytes())
        );

        let _ = std::fs::remove_dir_all(store.root());
        let _ = std::fs::remove_dir_all(&site);
    }

    #[tokio::test]
    async fn republishing_is_a_no_op() {
        let store = temp_fs_store();
        seed(&store, 1, &[group("X", &[("A1", None), ("A2", None)])]).await;
        let site = temp_site();
        let publisher = MarkdownSitePublisher::new(&site);

        publish(&store, &publisher).await.unwrap();
        let first = std::fs::read_to_string(site.join("1/x.md")).unwrap();

        let report = publish(&store, &publisher).await.unwrap();
        assert_eq!(report.pages_written, 0);
        assert_eq!(report.pages_unchanged, 3);
        assert_eq!(std::fs::read_to_string(site.join("1/x.md")).unwrap(), first);

        let _ = std::fs::remove_dir_all(store.root());
        let _ = std::fs::remove_dir_all(&site);
    }

    #[tokio::test]
    async fn output_survives_without_network_or_model() {
        let store = temp_fs_store();
        seed(&store, 1, &[group("X", &[("A1", None), ("A2", None)])]).await;

        let first = NullPublisher::default();
        publish(&store, &first).await.unwrap();

        // A read-only view of the same cache reproduces the same output.
        let readonly = wgdigest_storage::FsStore::new(store.root()).readonly();
        let second = NullPublisher::default();
        publish(&readonly, &second).await.unwrap();

        assert_eq!(first.groups(), second.groups());
        assert_eq!(
            first.groups()[0].2,
            "summary A1\n\n---\n\nsummary A2".to_string()
        );

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn stale_pages_are_removed() {
        let store = temp_fs_store();
        seed(
            &store,
            1,
            &[group("X", &[("A1", None)]), group("Y", &[("B1", None)])],
        )
        .await;
        let site = temp_site();
        let publisher = MarkdownSitePublisher::new(&site);
        publish(&store, &publisher).await.unwrap();
        assert!(site.join("1/y.md").exists());

        store
            .save(CollectionId(1), &[group("X", &[("A1", None)])])
            .await
            .unwrap();
        let report = publish(&store, &publisher).await.unwrap();

        assert_eq!(report.pages_removed, 1);
        assert!(!site.join("1/y.md").exists());
        assert!(site.join("1/x.md").exists());

        let _ = std::fs::remove_dir_all(store.root());
        let _ = std::fs::remove_dir_all(&site);
    }

    #[test]
    fn plain_page_names() {
        assert!(is_plain_page_name("quic.md"));
        assert!(!is_plain_page_name("index.md"));
        assert!(!is_plain_page_name("../escape.md"));
        assert!(!is_plain_page_name("pages.json"));
    }
}
