//! Index builders for the published site.

use std::collections::HashSet;

use tracing::{debug, instrument};

use wgdigest_shared::CollectionId;

/// Group names of one collection, alphabetical ignoring case.
///
/// The sort is stable, so names equal up to case keep their manifest order.
#[instrument(skip_all, fields(groups = names.len()))]
pub fn collection_index(names: &[String]) -> Vec<String> {
    let mut sorted = names.to_vec();
    sorted.sort_by_cached_key(|name| name.to_lowercase());
    debug!("collection index built");
    sorted
}

/// Collections in numeric ascending order, without duplicates.
pub fn root_index(collections: &[CollectionId]) -> Vec<CollectionId> {
    let mut sorted = collections.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// One page slug per name, in the given order.
///
/// Names that slug to the same value get `-2`, `-3`, ... in order of
/// appearance, so the mapping is stable across publishes.
pub fn page_slugs<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut taken = HashSet::new();
    names
        .iter()
        .map(|name| {
            let base = wgdigest_markdown::slugify(name.as_ref());
            let mut slug = base.clone();
            let mut n = 2;
            // `index` is reserved for the collection index page.
            while slug == "index" || !taken.insert(slug.clone()) {
                slug = format!("{base}-{n}");
                n += 1;
            }
            slug
        })
        .collect()
}
