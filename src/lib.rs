//! # Assessment Recommender (library root)
//!
//! This crate provides the core plumbing for the **arec** CLI and library:
//! recommend assessment products for a job description by embedding the query
//! and returning the nearest records of a scraped catalog.
//!
//! - Catalog snapshot and its on-disk form (`catalog`).
//! - Remote embeddings with a deterministic offline fallback (`embedding`).
//! - Exact L2 nearest-neighbor index with binary persistence (`vector_store`).
//! - Query-time composition and the atomically swappable serving pair (`recommend`).
//! - Optional model commentary on the results (`enhance`).
//! - Offline build of the catalog/index pair (`setup`).
//! - Configuration, errors and CLI parsing (`config`, `error`, `commands`).
//!
//! ## Quick start
//! ```no_run
//! use assessment_recommender::{config::RecommenderConfig, recommend::RecommendationService, setup::ArtifactPaths};
//!
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RecommenderConfig::default();
//! let service = RecommendationService::from_config(&config);
//! service.load(&ArtifactPaths::from_config(&config))?;
//! for hit in service.recommend("Java developer, 3 years experience", 5).await? {
//!     println!("{} {:.4} {}", hit.rank, hit.distance, hit.record.name);
//! }
//! # Ok(()) }
//! ```
//!
//! ## Modules
//! - [`catalog`], [`commands`], [`config`], [`embedding`], [`enhance`],
//!   [`error`], [`recommend`], [`setup`], [`vector_store`]

use directories::ProjectDirs;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

pub mod catalog;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod enhance;
pub mod error;
pub mod recommend;
pub mod setup;
pub mod vector_store;

use crate::error::ConfigError;

/// Return the per-platform configuration directory used by arec.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "awful-sec", "arec")`, so you get the right place on each OS
/// (e.g., `~/.config/arec` on Linux).
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns [`ConfigError::NoConfigDir`] if the platform configuration directory
/// cannot be determined (rare, but possible in heavily sandboxed environments).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let proj_dirs =
        ProjectDirs::from("com", "awful-sec", "arec").ok_or(ConfigError::NoConfigDir)?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Write `bytes` to `path` so readers see either the old file or the new one.
///
/// The data goes to a temp file in the same directory first, is flushed to
/// disk, and then renamed over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
