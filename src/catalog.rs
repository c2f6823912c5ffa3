//! # Catalog record store
//!
//! The ordered list of assessment products the recommender can return.
//!
//! A record's `id` is its position in the store, and that position is also its
//! row in the [`FlatIndex`](crate::vector_store::FlatIndex). The store never
//! changes in place: a re-scrape produces a new store, a new index, and a new
//! [`fingerprint`](CatalogStore::fingerprint) that ties the two together.
//!
//! On disk the store is a pretty-printed JSON array of [`CatalogRecord`]s.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::info;

use crate::error::CatalogError;
use crate::write_atomically;

/// One recommendable assessment product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Position in the store and in the index. Scraped input may omit it.
    #[serde(default)]
    pub id: usize,
    pub name: String,
    pub url: String,
    pub description: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub remote_support: bool,
    #[serde(default)]
    pub adaptive_support: bool,
    pub test_type: String,
}

impl CatalogRecord {
    /// Text embedded for this record at build time.
    ///
    /// Name and test type are folded in alongside the description so short
    /// descriptions still carry enough signal.
    pub fn embedding_text(&self) -> String {
        format!(
            "{}. {}. Test type: {}",
            self.name, self.description, self.test_type
        )
    }
}

/// Immutable snapshot of the scraped catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStore {
    records: Vec<CatalogRecord>,
}

impl CatalogStore {
    /// Take ownership of scraped records, renumbering ids to match positions.
    pub fn from_records(mut records: Vec<CatalogRecord>) -> Self {
        for (position, record) in records.iter_mut().enumerate() {
            record.id = position;
        }
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at `position`, if the store has one there.
    pub fn get(&self, position: usize) -> Option<&CatalogRecord> {
        self.records.get(position)
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    /// Embedding inputs in position order.
    pub fn embedding_texts(&self) -> Vec<String> {
        self.records.iter().map(CatalogRecord::embedding_text).collect()
    }

    /// Hex blake3 digest of the canonical JSON encoding.
    ///
    /// Stamped into the index at build time and compared at load time, so an
    /// index can never be served against a different snapshot's records.
    pub fn fingerprint(&self) -> Result<String, CatalogError> {
        let canonical = serde_json::to_vec(&self.records)?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }

    /// Write the store as JSON, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let json = serde_json::to_vec_pretty(&self.records)?;
        write_atomically(path, &json)?;
        info!(
            "Saved catalog of {} records to {}",
            self.records.len(),
            path.display()
        );
        Ok(())
    }

    /// Read a store previously written by [`CatalogStore::save`].
    ///
    /// Ids are taken as positions, so a hand-edited file cannot break the join.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::Missing(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let records: Vec<CatalogRecord> = serde_json::from_slice(&bytes)?;
        info!(
            "Loaded catalog of {} records from {}",
            records.len(),
            path.display()
        );
        Ok(Self::from_records(records))
    }
}

#[cfg(test)]
pub(crate) fn sample_record(name: &str, description: &str, test_type: &str) -> CatalogRecord {
    CatalogRecord {
        id: 0,
        name: name.to_string(),
        url: format!(
            "https://example.com/catalog/{}",
            name.to_lowercase().replace(' ', "-")
        ),
        description: description.to_string(),
        duration: Some("30 min".to_string()),
        remote_support: true,
        adaptive_support: false,
        test_type: test_type.to_string(),
    }
}
