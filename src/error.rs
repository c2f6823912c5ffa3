//! # Error types
//!
//! One error enum per layer, all built on `thiserror`:
//!
//! | Type               | Raised by                         | Surfaced to caller? |
//! |--------------------|-----------------------------------|---------------------|
//! | [`ConfigError`]    | [`crate::config`]                 | yes, at startup     |
//! | [`CatalogError`]   | [`crate::catalog`]                | yes                 |
//! | [`IndexError`]     | [`crate::vector_store`]           | yes                 |
//! | [`ServingError`]   | [`crate::recommend::ServingState`]| yes, at (re)load    |
//! | [`RecommendError`] | [`crate::recommend`]              | yes, per request    |
//! | [`BuildError`]     | [`crate::setup`]                  | yes                 |
//!
//! Remote embedding failures are absent on purpose: the embedder absorbs them
//! into fallback vectors and only logs them (see [`crate::embedding`]).
//! Likewise a search hit with no matching catalog record is logged and dropped,
//! never returned as an error.

use std::path::PathBuf;
use thiserror::Error;

/// Problems loading or validating `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("unable to determine config directory")]
    NoConfigDir,
}

/// Problems reading or writing the catalog snapshot.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file {0} does not exist")]
    Missing(PathBuf),

    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Problems building, persisting or querying a [`crate::vector_store::FlatIndex`].
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot build an index from zero vectors")]
    Empty,

    #[error("dimension mismatch at position {position}: expected {expected}, got {got}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        got: usize,
    },

    #[error("k must be at least 1 (got {0})")]
    InvalidK(usize),

    #[error("index file {0} does not exist")]
    Missing(PathBuf),

    #[error("unsupported index format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("index decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Fatal problems pairing an index with a catalog at (re)load time.
#[derive(Debug, Error)]
pub enum ServingError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Caller mistakes; the 4xx-equivalent class.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserInputError {
    #[error("query cannot be empty")]
    EmptyQuery,

    #[error("k must be between 1 and {max} (got {got})")]
    InvalidK { got: usize, max: usize },
}

/// Failures a single `recommend` call can report.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error(transparent)]
    UserInput(#[from] UserInputError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no index and catalog pair is loaded")]
    NotReady,
}

/// Failures of the offline build pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("catalog is empty; nothing to index")]
    EmptyCatalog,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Index(#[from] IndexError),
}
