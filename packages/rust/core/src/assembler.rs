//! Output stage: manifest + cache → combined group text.
//!
//! Pure transformation over persisted data. No network access and no model
//! calls happen here, so assembling can be repeated at no cost.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use wgdigest_shared::{CollectionId, Group, ItemId, Result, WgDigestError};
use wgdigest_storage::{ArtifactCache, ManifestStore, Store};

/// Visible separator between the artifacts of one group (a horizontal rule).
pub const ARTIFACT_SEPARATOR: &str = "\n\n---\n\n";

/// One group, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledGroup {
    pub display_name: String,
    /// Member artifacts joined in stored order.
    pub combined: String,
    /// External references of the members that were assembled, in order.
    pub external_refs: Vec<String>,
    pub item_ids: Vec<ItemId>,
}

/// Every assembled group of one collection, in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCollection {
    pub collection: CollectionId,
    /// When the manifest was last written.
    pub generated_at: DateTime<Utc>,
    pub groups: Vec<AssembledGroup>,
}

/// Assemble one collection. `Ok(None)` if it has no manifest yet.
#[instrument(skip(store), fields(%collection))]
pub async fn assemble_collection(
    store: &dyn Store,
    collection: CollectionId,
) -> Result<Option<AssembledCollection>> {
    let Some(manifest) = store.load_optional(collection).await? else {
        debug!("no manifest, nothing to assemble");
        return Ok(None);
    };

    let mut groups = Vec::with_capacity(manifest.groups.len());
    for group in &manifest.groups {
        if let Some(assembled) = assemble_group(store, collection, group).await? {
            groups.push(assembled);
        }
    }

    debug!(groups = groups.len(), "collection assembled");
    Ok(Some(AssembledCollection {
        collection,
        generated_at: manifest.generated_at,
        groups,
    }))
}

/// Assemble every collection known to the cache, ascending.
#[instrument(skip_all)]
pub async fn assemble_all(store: &dyn Store) -> Result<Vec<AssembledCollection>> {
    let collections = store.list_collections().await?;
    let mut assembled = Vec::with_capacity(collections.len());

    for collection in collections {
        match assemble_collection(store, collection).await? {
            Some(c) => assembled.push(c),
            None => info!(%collection, "skipping collection without manifest"),
        }
    }
    Ok(assembled)
}

async fn assemble_group(
    store: &dyn Store,
    collection: CollectionId,
    group: &Group,
) -> Result<Option<AssembledGroup>> {
    let mut parts = Vec::with_capacity(group.members.len());
    let mut external_refs = Vec::new();

    for member in &group.members {
        match store.get(collection, &member.item_id).await {
            Ok(content) => {
                parts.push((member.item_id.clone(), content));
                external_refs.extend(member.external_ref.clone());
            }
            Err(WgDigestError::ArtifactNotFound { .. }) => {
                warn!(
                    item_id = %member.item_id,
                    group = %group.display_name,
                    "artifact missing from cache, skipping member"
                );
            }
            Err(e) => return Err(e),
        }
    }

    if parts.is_empty() {
        warn!(group = %group.display_name, "no artifacts left, dropping group");
        return Ok(None);
    }

    Ok(Some(AssembledGroup {
        display_name: group.display_name.clone(),
        combined: combine_artifacts(&parts),
        external_refs,
        item_ids: parts.into_iter().map(|(id, _)| id).collect(),
    }))
}

/// Join member artifacts in the given order.
///
/// A single artifact is returned as-is. With several, each part gets a
/// session header when its identifier carries a parseable timestamp, and
/// parts are separated by [`ARTIFACT_SEPARATOR`].
pub fn combine_artifacts(parts: &[(ItemId, String)]) -> String {
    if let [(_, only)] = parts {
        return only.trim().to_string();
    }

    parts
        .iter()
        .map(|(id, content)| match session_header(id) {
            Some(header) => format!("{header}\n\n{}", content.trim()),
            None => content.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join(ARTIFACT_SEPARATOR)
}

/// `### Session 2024-11-05 13:00 UTC`, or `None` for a malformed timestamp.
pub fn session_header(id: &ItemId) -> Option<String> {
    id.timestamp()
        .map(|ts| format!("### Session {} UTC", ts.format("%Y-%m-%d %H:%M")))
}
