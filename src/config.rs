//! This module provides functionality for loading and handling the recommender's configuration.
//!
//! It defines the `RecommenderConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//!
//! Every field has a default, so a partial (or empty) file is valid. Values are
//! checked by [`RecommenderConfig::validate`] before anything else runs.
//!
//! # Examples
//!
//! ```no_run
//! use assessment_recommender::config::load_config;
//!
//! let config = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use tracing::*;

use crate::error::ConfigError;

/// Represents the recommender's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Credential for the remote embedding service. When absent the
    /// deterministic fallback embedder is used.
    pub embedding_api_key: Option<String>,

    /// Base URL of the embedding service, without the `/models/...` suffix.
    pub embedding_api_base: String,

    /// Embedding model name, without the `models/` prefix.
    pub embedding_model: String,

    /// Dimensionality of fallback vectors, and of the index when it was built
    /// with fallback vectors.
    pub embedding_dimensionality: usize,

    /// Per-request timeout for the embedding service.
    pub embedding_timeout_secs: u64,

    /// Generative model asked to annotate results when enhancement is
    /// requested. Shares the credential and base URL of the embedding service.
    pub enhancer_model: String,

    pub enhancer_timeout_secs: u64,

    // Number of results when the caller does not ask for a specific k.
    pub default_k: usize,

    // Largest k a caller may ask for.
    pub max_k: usize,

    // Binary index blob.
    pub index_path: PathBuf,

    // Catalog snapshot paired with the index.
    pub catalog_path: PathBuf,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            embedding_api_key: None,
            embedding_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            embedding_model: "embedding-001".to_string(),
            embedding_dimensionality: 768,
            embedding_timeout_secs: 10,
            enhancer_model: "gemini-2.0-flash-exp".to_string(),
            enhancer_timeout_secs: 30,
            default_k: 5,
            max_k: 10,
            index_path: PathBuf::from("assessments_index.bin"),
            catalog_path: PathBuf::from("assessments.json"),
        }
    }
}

impl RecommenderConfig {
    /// Reject values the rest of the crate cannot work with.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimensionality == 0 {
            return Err(ConfigError::Invalid {
                key: "embedding_dimensionality",
                reason: "must be greater than zero".into(),
            });
        }
        if self.embedding_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "embedding_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.enhancer_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "enhancer_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_k == 0 {
            return Err(ConfigError::Invalid {
                key: "max_k",
                reason: "must be at least 1".into(),
            });
        }
        if self.default_k == 0 || self.default_k > self.max_k {
            return Err(ConfigError::Invalid {
                key: "default_k",
                reason: format!("must be between 1 and max_k ({})", self.max_k),
            });
        }
        Ok(())
    }

    /// The credential to use, treating blank strings as "not configured".
    pub fn credential(&self) -> Option<&str> {
        self.embedding_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Take `key` as the credential only when none is configured.
    pub fn fill_missing_credential(&mut self, key: Option<String>) {
        if self.credential().is_none() {
            if let Some(key) = key {
                self.embedding_api_key = Some(key);
            }
        }
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    pub fn enhancer_timeout(&self) -> Duration {
        Duration::from_secs(self.enhancer_timeout_secs)
    }
}

/// Loads the recommender's configuration from a YAML file.
///
/// This function reads the file at the given path, parses it as YAML, and
/// validates the result.
///
/// # Errors
/// - [`ConfigError::Read`] if the file cannot be read.
/// - [`ConfigError::Parse`] if the YAML is malformed.
/// - [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config(file: impl AsRef<Path>) -> Result<RecommenderConfig, ConfigError> {
    let path = file.as_ref();
    debug!("Loading config from {}", path.display());
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RecommenderConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(file: impl AsRef<Path>) -> Result<RecommenderConfig, ConfigError> {
    let path = file.as_ref();
    if !path.exists() {
        info!(
            "No config at {}; using built-in defaults",
            path.display()
        );
        return Ok(RecommenderConfig::default());
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
embedding_api_key: "example_api_key"
embedding_api_base: "http://example.com/v1beta"
embedding_model: "text-embedding-004"
embedding_dimensionality: 384
default_k: 3
max_k: 8
index_path: "idx.bin"
catalog_path: "cat.json"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path());

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.credential(), Some("example_api_key"));
        assert_eq!(config.embedding_api_base, "http://example.com/v1beta");
        assert_eq!(config.embedding_model, "text-embedding-004");
        assert_eq!(config.embedding_dimensionality, 384);
        assert_eq!(config.default_k, 3);
        assert_eq!(config.max_k, 8);
        assert_eq!(config.index_path, PathBuf::from("idx.bin"));
        // Unspecified fields fall back to defaults.
        assert_eq!(config.embedding_timeout_secs, 10);
    }

    #[test]
    fn test_load_config_invalid_file() {
        let config = load_config("non/existent/path");
        assert!(matches!(config, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();

        let config = load_config(temp_file.path());
        assert!(matches!(config, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_rejects_default_k_above_max() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "default_k: 11\nmax_k: 10").unwrap();

        match load_config(temp_file.path()) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "default_k"),
            other => panic!("expected invalid default_k, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_dimensionality_is_invalid() {
        let config = RecommenderConfig {
            embedding_dimensionality: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let config = RecommenderConfig {
            embedding_api_key: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(config.credential(), None);
    }

    #[test]
    fn test_environment_credential_does_not_replace_configured_one() {
        let mut config = RecommenderConfig {
            embedding_api_key: Some("from-file".into()),
            ..Default::default()
        };
        config.fill_missing_credential(Some("from-env".into()));
        assert_eq!(config.credential(), Some("from-file"));

        let mut config = RecommenderConfig {
            embedding_api_key: Some("  ".into()),
            ..Default::default()
        };
        config.fill_missing_credential(Some("from-env".into()));
        assert_eq!(config.credential(), Some("from-env"));

        let mut config = RecommenderConfig::default();
        config.fill_missing_credential(None);
        assert_eq!(config.credential(), None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config_or_default("definitely/not/here.yaml").unwrap();
        assert_eq!(config, RecommenderConfig::default());
    }
}
