//! Core pipeline orchestration for wgdigest.
//!
//! This crate ties the collaborators from `wgdigest-shared` to a store from
//! `wgdigest-storage` and runs the two stages end to end:
//! - [`collect`]: items → cached summaries → group manifest
//! - [`publish`]: manifest + cache → Markdown site

pub mod assembler;
pub mod index;
pub mod pipeline;
pub mod publish;

#[cfg(test)]
mod test_support;

pub use assembler::{
    ARTIFACT_SEPARATOR, AssembledCollection, AssembledGroup, assemble_all, assemble_collection,
    combine_artifacts, session_header,
};
pub use index::{collection_index, page_slugs, root_index};
pub use pipeline::{
    Collaborators, CollectReport, GroupReport, ItemOutcome, ProgressReporter, RunReport,
    SilentProgress, collect, group_items, is_fatal, retain_groups, run,
};
pub use publish::{
    GroupPage, IndexEntry, MarkdownSitePublisher, PageRecord, PublishReport, Publisher, publish,
};
