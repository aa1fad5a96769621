//! Error types for wgdigest.
//!
//! Library crates use [`WgDigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::CollectionId;

/// Top-level error type for all wgdigest operations.
#[derive(Debug, thiserror::Error)]
pub enum WgDigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while listing sessions.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Raw content for an item could not be obtained.
    #[error("content unavailable: {0}")]
    Unavailable(String),

    /// The generative model call failed or returned nothing usable.
    #[error("generation error: {0}")]
    Generation(String),

    /// No cached artifact exists for this key.
    #[error("no cached artifact for {item_id} in collection {collection}")]
    ArtifactNotFound {
        collection: CollectionId,
        item_id: String,
    },

    /// No manifest has ever been saved for this collection.
    #[error("no manifest for collection {collection}")]
    ManifestMissing { collection: CollectionId },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WgDigestError>;

impl WgDigestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means cache or manifest state could not be persisted
    /// (or read back). Such errors abort a run.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io { .. })
    }
}
