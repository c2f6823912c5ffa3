//! # Recommendation service
//!
//! Composes the [`Embedder`] and a loaded catalog/index pair into ranked
//! recommendations:
//!
//! 1. validate `k` and the query,
//! 2. embed the query,
//! 3. search the [`FlatIndex`],
//! 4. join each hit back to its [`CatalogRecord`] by position,
//! 5. return records in hit order with their distances.
//!
//! ## Serving state
//! The pair lives in a [`ServingState`]: an `RwLock<Option<Arc<LoadedPair>>>`.
//! A request clones the `Arc` once and works on that snapshot, so a concurrent
//! [`ServingState::swap`] or [`ServingState::reload`] can never hand it a
//! half-updated pair. Pairs are immutable once loaded.
//!
//! ## Failure classes
//! - Bad `k` or an empty query: [`RecommendError::UserInput`].
//! - Query/index dimensionality disagree: refused at load, and
//!   [`RecommendError::Configuration`] for pairs swapped in unchecked.
//! - Embedding service down: absorbed by the embedder, never seen here.
//! - A hit with no catalog record: logged at `warn`, dropped from the result.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogRecord, CatalogStore};
use crate::config::RecommenderConfig;
use crate::embedding::Embedder;
use crate::enhance::Enhancement;
use crate::error::{IndexError, RecommendError, ServingError, UserInputError};
use crate::setup::ArtifactPaths;
use crate::vector_store::FlatIndex;

/// A catalog snapshot and the index built from it.
#[derive(Debug)]
pub struct LoadedPair {
    store: CatalogStore,
    index: FlatIndex,
}

impl LoadedPair {
    /// Pair a store with an index, refusing pairs built from different snapshots.
    pub fn new(store: CatalogStore, index: FlatIndex) -> Result<Self, ServingError> {
        let fingerprint = store.fingerprint()?;
        if index.fingerprint() != fingerprint {
            return Err(ServingError::Configuration(format!(
                "index was built for catalog {} but the loaded catalog is {}",
                index.fingerprint(),
                fingerprint
            )));
        }
        if index.len() != store.len() {
            return Err(ServingError::Configuration(format!(
                "index holds {} vectors but catalog holds {} records",
                index.len(),
                store.len()
            )));
        }
        Ok(Self { store, index })
    }

    /// Load both artifacts from disk.
    ///
    /// When `expected_dimension` is set, an index of any other dimensionality
    /// is rejected as a configuration error.
    pub fn load(paths: &ArtifactPaths, expected_dimension: Option<usize>) -> Result<Self, ServingError> {
        let store = CatalogStore::load(&paths.catalog)?;
        let index = FlatIndex::load(&paths.index)?;

        if let Some(expected) = expected_dimension {
            if index.dimension() != expected {
                return Err(ServingError::Configuration(format!(
                    "index dimension {} does not match configured embedding dimensionality {}",
                    index.dimension(),
                    expected
                )));
            }
        }

        Self::new(store, index)
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }
}

/// Readiness report for the serving boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub ready: bool,
    pub records: usize,
    pub dimension: Option<usize>,
    pub fingerprint: Option<String>,
}

/// Holder of the currently served pair.
#[derive(Debug, Default)]
pub struct ServingState {
    current: RwLock<Option<Arc<LoadedPair>>>,
}

impl ServingState {
    /// A state with nothing loaded; [`ServingState::health`] reports not ready.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: LoadedPair) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(pair))),
        }
    }

    /// The pair in service right now, if any.
    pub fn snapshot(&self) -> Option<Arc<LoadedPair>> {
        self.current.read().clone()
    }

    /// Put `pair` in service, returning the one it replaced.
    pub fn swap(&self, pair: LoadedPair) -> Option<Arc<LoadedPair>> {
        let next = Arc::new(pair);
        let previous = std::mem::replace(&mut *self.current.write(), Some(next));
        info!("Swapped in a new catalog/index pair");
        previous
    }

    /// Load a fresh pair from disk, then swap it in. On error the pair
    /// currently in service stays in service.
    pub fn reload(&self, paths: &ArtifactPaths, expected_dimension: Option<usize>) -> Result<(), ServingError> {
        let pair = LoadedPair::load(paths, expected_dimension)?;
        self.swap(pair);
        Ok(())
    }

    pub fn health(&self) -> Health {
        match self.snapshot() {
            Some(pair) => Health {
                ready: true,
                records: pair.store.len(),
                dimension: Some(pair.index.dimension()),
                fingerprint: Some(pair.index.fingerprint().to_string()),
            },
            None => Health {
                ready: false,
                records: 0,
                dimension: None,
                fingerprint: None,
            },
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// 1-based rank after any dropped hits.
    pub rank: usize,
    /// L2 distance from the query; smaller is closer.
    pub distance: f32,
    #[serde(flatten)]
    pub record: CatalogRecord,
}

/// Serving-boundary payload: `{ "results": [...] }`, plus `"enhanced"` when
/// a [`GeminiEnhancer`](crate::enhance::GeminiEnhancer) annotated it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationResponse {
    pub results: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<Enhancement>,
}

pub struct RecommendationService {
    embedder: Embedder,
    state: Arc<ServingState>,
    default_k: usize,
    max_k: usize,
}

impl RecommendationService {
    pub fn new(embedder: Embedder, state: Arc<ServingState>, default_k: usize, max_k: usize) -> Self {
        Self {
            embedder,
            state,
            default_k,
            max_k,
        }
    }

    /// Service with the embedder selected from `config` and nothing loaded yet.
    pub fn from_config(config: &RecommenderConfig) -> Self {
        Self::new(
            Embedder::from_config(config),
            Arc::new(ServingState::empty()),
            config.default_k,
            config.max_k,
        )
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn max_k(&self) -> usize {
        self.max_k
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn state(&self) -> &Arc<ServingState> {
        &self.state
    }

    /// Dimensionality a loaded index must have: the configured embedding
    /// dimensionality, whichever variant is serving.
    pub fn expected_dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Load the pair at `paths` into service.
    ///
    /// An index whose dimensionality differs from [`Self::expected_dimension`]
    /// is refused here, so degraded queries can always be answered later.
    pub fn load(&self, paths: &ArtifactPaths) -> Result<(), ServingError> {
        self.state.reload(paths, Some(self.expected_dimension()))
    }

    pub fn health(&self) -> Health {
        self.state.health()
    }

    fn validate(&self, query: &str, k: usize) -> Result<(), UserInputError> {
        if k == 0 || k > self.max_k {
            return Err(UserInputError::InvalidK {
                got: k,
                max: self.max_k,
            });
        }
        if query.trim().is_empty() {
            return Err(UserInputError::EmptyQuery);
        }
        Ok(())
    }

    /// Up to `k` catalog records nearest to `query`, nearest first.
    pub async fn recommend(&self, query: &str, k: usize) -> Result<Vec<Recommendation>, RecommendError> {
        self.validate(query, k)?;
        let pair = self.state.snapshot().ok_or(RecommendError::NotReady)?;

        let vector = self.embedder.embed(query).await;
        let hits = pair.index.search(&vector, k).map_err(|err| match err {
            IndexError::DimensionMismatch { expected, got, .. } => RecommendError::Configuration(
                format!("query embedding has {got} dimensions but the index expects {expected}"),
            ),
            other => RecommendError::Configuration(other.to_string()),
        })?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(record) = pair.store.get(hit.position) else {
                warn!(
                    position = hit.position,
                    records = pair.store.len(),
                    "Search hit has no catalog record; dropping it"
                );
                continue;
            };

            let distance = if hit.distance.is_finite() {
                hit.distance
            } else {
                warn!(
                    "Invalid distance value detected ({}), replaced with 0.0",
                    hit.distance
                );
                0.0
            };

            results.push(Recommendation {
                rank: results.len() + 1,
                distance,
                record: record.clone(),
            });
        }

        debug!("Recommended {} records for {:?}", results.len(), query);
        Ok(results)
    }

    /// [`RecommendationService::recommend`] wrapped for the serving boundary.
    pub async fn respond(&self, query: &str, k: usize) -> Result<RecommendationResponse, RecommendError> {
        Ok(RecommendationResponse {
            results: self.recommend(query, k).await?,
            enhanced: None,
        })
    }
}
