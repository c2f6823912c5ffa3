//! # Index build pipeline
//!
//! The offline step that turns a scraped catalog into a servable pair:
//!
//! ```text
//! catalog ──embed_batch──▶ vectors ──FlatIndex::build──▶ index
//!    │                                                      │
//!    └──── save (catalog.json) ─────────── save (index.bin) ┘
//! ```
//!
//! The index is stamped with the catalog fingerprint, so a serving process
//! that picks up one new file and one old file refuses the mix instead of
//! serving mismatched positions.

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;

use crate::catalog::CatalogStore;
use crate::config::RecommenderConfig;
use crate::embedding::Embedder;
use crate::error::BuildError;
use crate::vector_store::FlatIndex;

/// Where a pair lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub catalog: PathBuf,
}

impl ArtifactPaths {
    pub fn from_config(config: &RecommenderConfig) -> Self {
        Self {
            index: config.index_path.clone(),
            catalog: config.catalog_path.clone(),
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub records: usize,
    pub dimension: usize,
    pub degraded_embeddings: u64,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

fn progress_bar(len: usize) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} embedding [{bar:40}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}

/// Embed every record, build the index and write both artifacts.
///
/// # Errors
/// - [`BuildError::EmptyCatalog`] if `store` has no records.
/// - [`BuildError::Index`] if the index cannot be written.
/// - [`BuildError::Catalog`] if the catalog cannot be written.
pub async fn build_artifacts(
    store: &CatalogStore,
    embedder: &Embedder,
    paths: &ArtifactPaths,
) -> Result<BuildReport, BuildError> {
    if store.is_empty() {
        return Err(BuildError::EmptyCatalog);
    }

    info!("Generating embeddings for {} assessments", store.len());
    let degraded_before = embedder.degraded_events();
    let texts = store.embedding_texts();
    let bar = progress_bar(texts.len());
    let vectors = embedder
        .embed_batch_observed(&texts, |done| bar.set_position(done as u64))
        .await;
    bar.finish_and_clear();
    let degraded_embeddings = embedder.degraded_events() - degraded_before;

    let fingerprint = store.fingerprint()?;
    let index = FlatIndex::build(vectors, fingerprint.clone())?;

    store.save(&paths.catalog)?;
    index.save(&paths.index)?;

    info!(
        "Built index of {} records ({} fallback embeddings)",
        index.len(),
        degraded_embeddings
    );

    Ok(BuildReport {
        records: index.len(),
        dimension: index.dimension(),
        degraded_embeddings,
        fingerprint,
        built_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_record;
    use crate::embedding::FallbackEmbedder;
    use crate::error::ServingError;
    use crate::recommend::{LoadedPair, RecommendationService, ServingState};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn catalog() -> CatalogStore {
        CatalogStore::from_records(vec![
            sample_record("Core Java", "Entry level Java programming", "Knowledge"),
            sample_record("Python 3", "Python scripting and data handling", "Knowledge"),
            sample_record("Sales Aptitude", "Aptitude for consultative selling", "Ability"),
            sample_record("OPQ32r", "Occupational personality questionnaire", "Personality"),
            sample_record("Verify Numerical", "Numerical reasoning", "Ability"),
        ])
    }

    fn paths_in(dir: &std::path::Path) -> ArtifactPaths {
        ArtifactPaths {
            index: dir.join("index.bin"),
            catalog: dir.join("catalog.json"),
        }
    }

    #[tokio::test]
    async fn test_build_then_serve() {
        let dir = tempdir().unwrap();
        let paths = paths_in(dir.path());
        let embedder = Embedder::Fallback(FallbackEmbedder::new(64));

        let report = build_artifacts(&catalog(), &embedder, &paths).await.unwrap();
        assert_eq!(report.records, 5);
        assert_eq!(report.dimension, 64);
        assert_eq!(report.degraded_embeddings, 0);

        let svc = RecommendationService::new(embedder, Arc::new(ServingState::empty()), 5, 10);
        svc.load(&paths).unwrap();
        assert!(svc.health().ready);
        assert_eq!(svc.health().fingerprint.as_deref(), Some(report.fingerprint.as_str()));

        let results = svc.recommend("Java programmer", 10).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_rejected() {
        let dir = tempdir().unwrap();
        let embedder = Embedder::Fallback(FallbackEmbedder::new(8));
        let result = build_artifacts(&CatalogStore::default(), &embedder, &paths_in(dir.path())).await;
        assert!(matches!(result, Err(BuildError::EmptyCatalog)));
    }

    #[tokio::test]
    async fn test_load_rejects_wrong_configured_dimension() {
        let dir = tempdir().unwrap();
        let paths = paths_in(dir.path());
        let embedder = Embedder::Fallback(FallbackEmbedder::new(32));
        build_artifacts(&catalog(), &embedder, &paths).await.unwrap();

        assert!(matches!(
            LoadedPair::load(&paths, Some(768)),
            Err(ServingError::Configuration(_))
        ));
        assert!(LoadedPair::load(&paths, Some(32)).is_ok());
    }

    #[tokio::test]
    async fn test_load_rejects_pair_from_different_builds() {
        let dir = tempdir().unwrap();
        let paths = paths_in(dir.path());
        let embedder = Embedder::Fallback(FallbackEmbedder::new(16));
        build_artifacts(&catalog(), &embedder, &paths).await.unwrap();

        // A re-scrape rewrites the catalog, but the index is stale.
        let mut records = catalog().records().to_vec();
        records.truncate(4);
        CatalogStore::from_records(records).save(&paths.catalog).unwrap();

        assert!(matches!(
            LoadedPair::load(&paths, None),
            Err(ServingError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_artifacts_fail_to_load() {
        let dir = tempdir().unwrap();
        let state = ServingState::empty();
        assert!(state.reload(&paths_in(dir.path()), None).is_err());
        assert!(!state.health().ready);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_pair() {
        let dir = tempdir().unwrap();
        let paths = paths_in(dir.path());
        let embedder = Embedder::Fallback(FallbackEmbedder::new(16));
        build_artifacts(&catalog(), &embedder, &paths).await.unwrap();

        let state = ServingState::empty();
        state.reload(&paths, Some(16)).unwrap();
        let before = state.health();

        std::fs::remove_file(&paths.index).unwrap();
        assert!(state.reload(&paths, Some(16)).is_err());
        assert_eq!(state.health(), before);
    }

    #[tokio::test]
    async fn test_remote_mode_refuses_index_of_other_dimension() {
        let dir = tempdir().unwrap();
        let paths = paths_in(dir.path());
        build_artifacts(&catalog(), &Embedder::Fallback(FallbackEmbedder::new(16)), &paths)
            .await
            .unwrap();

        // Nothing listens on port 1, so every query embedding degrades.
        let remote = |dimension| RecommenderConfig {
            embedding_api_key: Some("test-key".into()),
            embedding_api_base: "http://127.0.0.1:1".into(),
            embedding_dimensionality: dimension,
            embedding_timeout_secs: 2,
            ..Default::default()
        };

        let mismatched = RecommendationService::from_config(&remote(768));
        assert!(mismatched.embedder().is_remote());
        assert!(matches!(
            mismatched.load(&paths),
            Err(ServingError::Configuration(_))
        ));
        assert!(!mismatched.health().ready);

        let matching = RecommendationService::from_config(&remote(16));
        matching.load(&paths).unwrap();
        let results = matching.recommend("Java programmer", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(matching.embedder().degraded_events(), 1);
    }
}
