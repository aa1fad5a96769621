//! Shared types, error model, configuration, and collaborator traits for wgdigest.
//!
//! This crate is the foundation depended on by all other wgdigest crates.
//! It provides:
//! - [`WgDigestError`]: the unified error type
//! - Domain types ([`CollectionId`], [`ItemId`], [`Item`], [`Group`], [`GroupManifest`])
//! - Configuration ([`AppConfig`], [`GeneratorConfig`], config loading)
//! - The async seams to the outside world ([`ItemSource`], [`ContentFetcher`], [`Generator`])

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GeneratorConfig, ModelBackend, PathsConfig, SourceConfig, StorageBackend,
    StorageConfig, config_dir, config_file_path, expand_home, init_config, init_config_at,
    load_config, load_config_from, validate_api_key,
};
pub use error::{Result, WgDigestError};
pub use traits::{ContentFetcher, Generator, ItemSource};
pub use types::{
    COLLECTION_PREFIX, CURRENT_SCHEMA_VERSION, CollectionId, Group, GroupManifest, GroupMember,
    ID_DELIMITER, Item, ItemId,
};
