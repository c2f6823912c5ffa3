//! # VectorStore
//!
//! Exact nearest-neighbor index over catalog embeddings.
//!
//! [`FlatIndex`] keeps every vector in one row-major `Vec<f32>` matrix and
//! answers queries by scanning all rows with Euclidean (L2) distance. At
//! catalog scale (tens to low hundreds of records) the scan is cheaper than
//! maintaining an approximate graph, and it gives exact, reproducible answers.
//!
//! ## Responsibilities
//! - **Building**: validates that all vectors share one dimensionality.
//! - **Searching**: `min(k, N)` neighbors, nearest first, ties by position.
//! - **Persistence**: a versioned `bincode` blob, written atomically.
//! - **Pairing**: carries the fingerprint of the catalog it was built from.
//!
//! Position `i` in the index is record `i` in the
//! [`CatalogStore`](crate::catalog::CatalogStore).
//!
//! ## Quick Example
//! ```rust
//! use assessment_recommender::vector_store::FlatIndex;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let index = FlatIndex::build(vec![vec![0.0, 0.0], vec![3.0, 4.0]], "demo")?;
//! let hits = index.search(&[3.0, 3.0], 1)?;
//! assert_eq!(hits[0].position, 1);
//! assert!((hits[0].distance - 1.0).abs() < 1e-6);
//! # Ok(()) }
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::IndexError;
use crate::write_atomically;

/// Bumped whenever the on-disk layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Below this many rows the scan stays on the calling thread.
const PARALLEL_SCAN_THRESHOLD: usize = 1024;

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Row in the index, equal to the catalog record id.
    pub position: usize,
    /// Euclidean distance to the query.
    pub distance: f32,
}

/// Flat, exact L2 index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    version: u32,
    dimension: usize,
    fingerprint: String,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build an index from `vectors`, stamped with the catalog `fingerprint`.
    ///
    /// # Errors
    /// - [`IndexError::Empty`] if `vectors` is empty.
    /// - [`IndexError::DimensionMismatch`] if the first vector is empty or any
    ///   vector's length differs from the first one's.
    pub fn build(vectors: Vec<Vec<f32>>, fingerprint: impl Into<String>) -> Result<Self, IndexError> {
        let dimension = vectors.first().ok_or(IndexError::Empty)?.len();
        if dimension == 0 {
            return Err(IndexError::DimensionMismatch {
                position: 0,
                expected: 1,
                got: 0,
            });
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    got: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        info!(
            "Built flat index with {} vectors of dimension {}",
            vectors.len(),
            dimension
        );

        Ok(Self {
            version: FORMAT_VERSION,
            dimension,
            fingerprint: fingerprint.into(),
            data,
        })
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Fingerprint of the catalog snapshot this index was built from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// The `min(k, N)` nearest rows to `query`, ascending by distance, ties
    /// broken by ascending position.
    ///
    /// # Errors
    /// - [`IndexError::InvalidK`] if `k == 0`.
    /// - [`IndexError::DimensionMismatch`] if `query.len() != self.dimension()`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK(k));
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                position: 0,
                expected: self.dimension,
                got: query.len(),
            });
        }

        let mut hits: Vec<Neighbor> = if self.len() >= PARALLEL_SCAN_THRESHOLD {
            self.data
                .par_chunks_exact(self.dimension)
                .enumerate()
                .map(|(position, row)| Neighbor {
                    position,
                    distance: euclidean_distance(row, query),
                })
                .collect()
        } else {
            self.data
                .chunks_exact(self.dimension)
                .enumerate()
                .map(|(position, row)| Neighbor {
                    position,
                    distance: euclidean_distance(row, query),
                })
                .collect()
        };

        hits.sort_by(compare_neighbors);
        hits.truncate(k);
        debug!("Flat index search returned {} of {} rows", hits.len(), self.len());
        Ok(hits)
    }

    /// Persist as a bincode blob, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        write_atomically(path, &bytes)?;
        info!(
            "Saved flat index ({} vectors, {} bytes) to {}",
            self.len(),
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a blob written by [`FlatIndex::save`].
    ///
    /// # Errors
    /// - [`IndexError::Missing`] if `path` does not exist.
    /// - [`IndexError::UnsupportedVersion`] for blobs from another format version.
    /// - [`IndexError::Corrupt`] if the matrix does not divide into rows.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Err(IndexError::Missing(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let (index, _read): (FlatIndex, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;

        if index.version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: index.version,
                expected: FORMAT_VERSION,
            });
        }
        if index.dimension == 0 || index.data.is_empty() || index.data.len() % index.dimension != 0 {
            return Err(IndexError::Corrupt(format!(
                "{} values cannot form rows of dimension {}",
                index.data.len(),
                index.dimension
            )));
        }

        info!(
            "Loaded flat index ({} vectors of dimension {}) from {}",
            index.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }
}

/// Ascending distance, then ascending position. NaN distances sort last.
fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    match (a.distance.is_nan(), b.distance.is_nan()) {
        (false, false) => a
            .distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then(a.position.cmp(&b.position)),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => a.position.cmp(&b.position),
    }
}

/// Compute Euclidean distance between two equal-length vectors.
///
/// The Euclidean distance: `sqrt(Σ (a[i] - b[i])^2)`. Extra trailing
/// components of the longer slice are ignored; callers check lengths first.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(av, bv)| (av - bv).powi(2))
        .sum::<f32>()
        .sqrt()
}
