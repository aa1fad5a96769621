//! Collect/Generate stage: items → cache → manifest.
//!
//! Items are processed strictly one at a time. Each item yields a tagged
//! [`ItemOutcome`]; which items and groups survive into the manifest is
//! decided afterwards by the pure [`retain_groups`].

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use wgdigest_shared::{
    CollectionId, ContentFetcher, Generator, GeneratorConfig, Group, GroupMember, Item,
    ItemSource, Result, WgDigestError,
};
use wgdigest_storage::{ArtifactCache, ManifestStore, Store};

use crate::publish::{PublishReport, Publisher, publish};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The external collaborators and storage one collect run works against.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub source: &'a dyn ItemSource,
    pub fetcher: &'a dyn ContentFetcher,
    pub generator: &'a dyn Generator,
    pub store: &'a dyn Store,
}

/// What happened to one item during a collect run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Artifact already in the cache; not new content.
    Cached(String),
    /// Artifact generated and written to the cache during this run.
    Generated(String),
    /// No raw content could be fetched; the item is silently excluded.
    Unavailable,
    /// Generation failed; the item is excluded and retried on the next run.
    Failed(String),
}

impl ItemOutcome {
    /// Whether the item contributes a usable artifact.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Cached(_) | Self::Generated(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cached(_) => "cached",
            Self::Generated(_) => "generated",
            Self::Unavailable => "unavailable",
            Self::Failed(_) => "failed",
        }
    }
}

/// Per-group counts reported at the end of a collect run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    pub display_name: String,
    pub cached: usize,
    pub generated: usize,
    pub unavailable: usize,
    pub failed: usize,
}

impl GroupReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Cached(_) => self.cached += 1,
            ItemOutcome::Generated(_) => self.generated += 1,
            ItemOutcome::Unavailable => self.unavailable += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Summary of one collect run over one collection.
#[derive(Debug, Clone)]
pub struct CollectReport {
    pub run_id: Uuid,
    pub collection: CollectionId,
    /// One entry per display name, in source order.
    pub groups: Vec<GroupReport>,
    /// Number of groups persisted in the manifest (or that would have been).
    pub retained_groups: usize,
    pub manifest_written: bool,
    pub elapsed: std::time::Duration,
}

impl CollectReport {
    /// Totals across all groups.
    pub fn totals(&self) -> GroupReport {
        self.groups.iter().fold(
            GroupReport {
                display_name: "total".into(),
                ..GroupReport::default()
            },
            |mut acc, g| {
                acc.cached += g.cached;
                acc.generated += g.generated;
                acc.unavailable += g.unavailable;
                acc.failed += g.failed;
                acc
            },
        )
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each item is processed.
    fn item_started(&self, item_id: &str, current: usize, total: usize);
    /// Called when a collection's collect run completes.
    fn collect_done(&self, report: &CollectReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_started(&self, _item_id: &str, _current: usize, _total: usize) {}
    fn collect_done(&self, _report: &CollectReport) {}
}

// ---------------------------------------------------------------------------
// Collect
// ---------------------------------------------------------------------------

/// Run Collect/Generate for one collection.
///
/// 1. List items and group them by display name (source order)
/// 2. Resolve every item: cache hit, or fetch → generate → cache write
/// 3. Retain groups with at least one usable artifact
/// 4. Save the manifest if new content was generated (or none exists yet)
///
/// Only persistence failures (and a failing item source) end the run early;
/// in that case the manifest is left untouched.
#[instrument(skip_all, fields(%collection, run_id = tracing::field::Empty))]
pub async fn collect(
    collection: CollectionId,
    deps: Collaborators<'_>,
    config: &GeneratorConfig,
    progress: &dyn ProgressReporter,
) -> Result<CollectReport> {
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));

    progress.phase(&format!("Listing sessions for IETF {collection}"));
    let items = deps.source.list_items(collection).await?;
    let grouped = group_items(items);
    let total: usize = grouped.iter().map(|(_, items)| items.len()).sum();
    info!(groups = grouped.len(), items = total, "collecting");

    progress.phase(&format!("Summarising IETF {collection}"));
    let mut resolved = Vec::with_capacity(grouped.len());
    let mut reports = Vec::with_capacity(grouped.len());
    let mut current = 0;

    for (display_name, items) in grouped {
        let mut report = GroupReport {
            display_name: display_name.clone(),
            ..GroupReport::default()
        };
        let mut outcomes = Vec::with_capacity(items.len());

        for item in items {
            current += 1;
            progress.item_started(item.id.as_str(), current, total);
            let outcome = process_item(collection, &item, deps, config).await?;
            debug!(item_id = %item.id, outcome = outcome.label(), "item resolved");
            report.record(&outcome);
            outcomes.push((item, outcome));
        }

        reports.push(report);
        resolved.push((display_name, outcomes));
    }

    let any_generated = reports.iter().any(|r| r.generated > 0);
    let groups = retain_groups(&resolved);

    let manifest_written = if any_generated {
        deps.store.save(collection, &groups).await?;
        true
    } else if !groups.is_empty() && deps.store.load_optional(collection).await?.is_none() {
        // Artifacts from an interrupted run, never recorded in a manifest.
        deps.store.save(collection, &groups).await?;
        true
    } else {
        debug!("no new content, manifest left untouched");
        false
    };

    let report = CollectReport {
        run_id,
        collection,
        retained_groups: groups.len(),
        groups: reports,
        manifest_written,
        elapsed: start.elapsed(),
    };

    let totals = report.totals();
    info!(
        cached = totals.cached,
        generated = totals.generated,
        unavailable = totals.unavailable,
        failed = totals.failed,
        retained_groups = report.retained_groups,
        manifest_written,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "collect complete"
    );
    progress.collect_done(&report);
    Ok(report)
}

/// Resolve one item to an [`ItemOutcome`]. Errors are persistence failures only.
async fn process_item(
    collection: CollectionId,
    item: &Item,
    deps: Collaborators<'_>,
    config: &GeneratorConfig,
) -> Result<ItemOutcome> {
    match deps.store.exists(collection, &item.id).await {
        Ok(true) => {
            let text = deps.store.get(collection, &item.id).await?;
            debug!(item_id = %item.id, "cache hit");
            return Ok(ItemOutcome::Cached(text));
        }
        Ok(false) => {}
        Err(e) if e.is_persistence() => return Err(e),
        // The store refused this key; only this item is affected.
        Err(e) => {
            warn!(item_id = %item.id, error = %e, "item cannot be cached, skipping");
            return Ok(ItemOutcome::Failed(e.to_string()));
        }
    }

    let raw = match deps.fetcher.fetch(&item.id).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(item_id = %item.id, reason = %e, "no content, skipping");
            return Ok(ItemOutcome::Unavailable);
        }
    };

    let text = match deps
        .generator
        .generate(&raw, &item.display_name, config)
        .await
    {
        Ok(text) if text.trim().is_empty() => {
            warn!(item_id = %item.id, "generator returned empty output");
            return Ok(ItemOutcome::Failed("empty generator output".into()));
        }
        Ok(text) => text,
        Err(e) if e.is_persistence() => return Err(e),
        Err(e) => {
            warn!(item_id = %item.id, error = %e, "generation failed");
            return Ok(ItemOutcome::Failed(e.to_string()));
        }
    };

    deps.store.put(collection, &item.id, &text).await?;
    info!(item_id = %item.id, chars = text.len(), "summary cached");
    Ok(ItemOutcome::Generated(text))
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Group items by display name, preserving first-seen order of names and items.
pub fn group_items(items: Vec<Item>) -> Vec<(String, Vec<Item>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Item>)> = Vec::new();

    for item in items {
        match index.get(&item.display_name) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(item.display_name.clone(), groups.len());
                groups.push((item.display_name.clone(), vec![item]));
            }
        }
    }
    groups
}

/// Decide which groups and members survive into the manifest.
///
/// Members keep their source order, except that a group whose members all
/// carry a parseable timestamp is ordered chronologically (stable on ties).
/// Groups without a usable member are dropped.
pub fn retain_groups(resolved: &[(String, Vec<(Item, ItemOutcome)>)]) -> Vec<Group> {
    resolved
        .iter()
        .filter_map(|(display_name, outcomes)| {
            let mut members: Vec<&Item> = outcomes
                .iter()
                .filter(|(_, outcome)| outcome.is_usable())
                .map(|(item, _)| item)
                .collect();
            if members.is_empty() {
                return None;
            }

            if members.iter().all(|item| item.id.timestamp().is_some()) {
                members.sort_by_key(|item| item.id.timestamp());
            }

            Some(Group {
                display_name: display_name.clone(),
                members: members.into_iter().map(GroupMember::from).collect(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Outcome of `collect` for several collections followed by a publish pass.
#[derive(Debug)]
pub struct RunReport {
    pub collects: Vec<CollectReport>,
    /// Collections whose collect run ended early with a non-persistence error.
    pub skipped: Vec<(CollectionId, String)>,
    pub publish: PublishReport,
}

/// Collect every requested collection, then publish everything in the store.
///
/// A collection whose item source fails is reported and skipped. A persistence
/// failure aborts the whole run before publishing.
#[instrument(skip_all, fields(collections = collections.len()))]
pub async fn run(
    collections: &[CollectionId],
    deps: Collaborators<'_>,
    config: &GeneratorConfig,
    publisher: &dyn Publisher,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let mut collects = Vec::new();
    let mut skipped = Vec::new();

    for &collection in collections {
        match collect(collection, deps, config, progress).await {
            Ok(report) => collects.push(report),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!(%collection, error = %e, "collect failed, skipping collection");
                skipped.push((collection, e.to_string()));
            }
        }
    }

    progress.phase("Publishing site");
    let publish = publish(deps.store, publisher).await?;

    Ok(RunReport {
        collects,
        skipped,
        publish,
    })
}

/// Errors that must end the whole run.
pub fn is_fatal(err: &WgDigestError) -> bool {
    err.is_persistence() || matches!(err, WgDigestError::Config { .. })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
