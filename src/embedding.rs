//! # Embedding provider
//!
//! Turns text into fixed-length `f32` vectors. Two variants, chosen once from
//! configuration by [`Embedder::from_config`]:
//!
//! - [`Embedder::Remote`]: a [`GeminiEmbedder`] calling the
//!   `models/{model}:embedContent` REST endpoint.
//! - [`Embedder::Fallback`]: a [`FallbackEmbedder`] producing deterministic
//!   pseudo-random unit vectors without any network access.
//!
//! ## Failure model
//! `embed*` never returns an error. A failed remote call (transport error,
//! timeout, non-2xx, unparsable body, empty vector, or a vector whose length
//! is not the configured dimensionality) is logged at `warn`,
//! counted in [`Embedder::degraded_events`], and answered with the fallback
//! vector for the same text. Availability wins over accuracy here.
//!
//! Both variants therefore always answer with exactly
//! [`Embedder::dimension`] components, so an index built in one mode can be
//! queried in the other.
//!
//! ## Fallback vectors
//! See [`fallback_vector`]. The seed comes from `blake3(text)`, the generator is
//! `ChaCha8Rng`, and samples are standard normal, so the output is stable
//! across runs and platforms and the same text always maps to the same bits.
//!
//! ```rust
//! use assessment_recommender::embedding::fallback_vector;
//!
//! let a = fallback_vector("Java developer test", 768);
//! let b = fallback_vector("Java developer test", 768);
//! assert_eq!(a, b);
//! let norm: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
//! assert!((norm - 1.0).abs() < 1e-6);
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RecommenderConfig;

/// Dimensionality of fallback vectors unless configured otherwise.
pub const DEFAULT_DIMENSION: usize = 768;

/// What the embedded text will be used for. The remote service tunes vectors
/// differently for stored documents and for queries against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedIntent {
    Document,
    Query,
}

impl EmbedIntent {
    fn task_type(self) -> &'static str {
        match self {
            EmbedIntent::Document => "RETRIEVAL_DOCUMENT",
            EmbedIntent::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Deterministic unit vector of length `dimension` derived from `text`.
///
/// 1. Seed = first 8 bytes (little-endian) of `blake3(text)`.
/// 2. Draw `dimension` samples from N(0, 1) with `ChaCha8Rng`.
/// 3. L2-normalize in `f64`, then narrow to `f32`.
///
/// Returns an empty vector when `dimension == 0`.
pub fn fallback_vector(text: &str, dimension: usize) -> Vec<f32> {
    if dimension == 0 {
        return Vec::new();
    }

    let digest = blake3::hash(text.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest.as_bytes()[..8]);
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed));

    let draws: Vec<f64> = (0..dimension)
        .map(|_| rng.sample::<f64, _>(StandardNormal))
        .collect();
    let norm = draws.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm == 0.0 || !norm.is_finite() {
        let mut basis = vec![0.0f32; dimension];
        basis[0] = 1.0;
        return basis;
    }

    draws.iter().map(|x| (x / norm) as f32).collect()
}

/// Offline embedder; always answers with [`fallback_vector`].
#[derive(Debug, Clone)]
pub struct FallbackEmbedder {
    dimension: usize,
}

impl FallbackEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        fallback_vector(text, self.dimension)
    }
}

#[derive(Debug, Error)]
enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("service returned an empty embedding")]
    Empty,

    #[error("service returned {got} dimensions, expected {expected}")]
    Dimension { expected: usize, got: usize },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Client for a Gemini-compatible `embedContent` endpoint.
///
/// Every call is single-shot with the configured timeout. Failures are
/// converted to fallback vectors of `dimension` components, and a service
/// vector of any other length counts as a failure.
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    fallback: FallbackEmbedder,
    degraded: Arc<AtomicU64>,
}

impl GeminiEmbedder {
    /// Build a client for `{api_base}/models/{model}:embedContent`.
    ///
    /// # Errors
    /// Propagates `reqwest` client construction failures (TLS backend setup).
    pub fn new(
        api_key: &str,
        api_base: &str,
        model: &str,
        timeout: Duration,
        dimension: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let model = model.trim_start_matches("models/").to_string();
        let endpoint = format!(
            "{}/models/{}:embedContent",
            api_base.trim_end_matches('/'),
            model
        );
        Ok(Self {
            client,
            endpoint,
            model,
            api_key: api_key.trim().to_string(),
            fallback: FallbackEmbedder::new(dimension),
            degraded: Arc::new(AtomicU64::new(0)),
        })
    }

    async fn request(&self, text: &str, intent: EmbedIntent) -> Result<Vec<f32>, RemoteError> {
        let body = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part { text }],
            },
            task_type: intent.task_type(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RemoteError::Status { status, body });
        }

        let parsed: EmbedContentResponse = response.json().await?;
        let values = parsed.embedding.values;
        if values.is_empty() {
            return Err(RemoteError::Empty);
        }
        if values.len() != self.fallback.dimension() {
            return Err(RemoteError::Dimension {
                expected: self.fallback.dimension(),
                got: values.len(),
            });
        }
        Ok(values)
    }

    /// Embed via the service, or fall back on any failure.
    pub async fn embed_with(&self, text: &str, intent: EmbedIntent) -> Vec<f32> {
        match self.request(text, intent).await {
            Ok(vector) => {
                debug!("Embedding service returned {} dimensions", vector.len());
                vector
            }
            Err(err) => {
                let total = self.degraded.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    error = %err,
                    degraded_events = total,
                    "Embedding service unavailable; using fallback embedding"
                );
                self.fallback.embed(text)
            }
        }
    }

    pub fn degraded_events(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }
}

/// The embedding provider, selected once at construction.
pub enum Embedder {
    Remote(GeminiEmbedder),
    Fallback(FallbackEmbedder),
}

impl Embedder {
    /// Pick the variant from configuration: remote when a credential is set,
    /// fallback otherwise (or when the HTTP client cannot be built).
    pub fn from_config(config: &RecommenderConfig) -> Self {
        let dimension = config.embedding_dimensionality;
        let Some(api_key) = config.credential() else {
            warn!(
                "No embedding credential configured; using deterministic {}-d fallback embeddings",
                dimension
            );
            return Embedder::Fallback(FallbackEmbedder::new(dimension));
        };

        match GeminiEmbedder::new(
            api_key,
            &config.embedding_api_base,
            &config.embedding_model,
            config.embedding_timeout(),
            dimension,
        ) {
            Ok(remote) => {
                info!(
                    "Using remote embedding model {} at {}",
                    config.embedding_model, config.embedding_api_base
                );
                Embedder::Remote(remote)
            }
            Err(err) => {
                error!("Unable to build embedding client ({err}); using fallback embeddings");
                Embedder::Fallback(FallbackEmbedder::new(dimension))
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Embedder::Remote(_))
    }

    /// Length of every vector this embedder returns, remote or fallback.
    pub fn dimension(&self) -> usize {
        match self {
            Embedder::Remote(remote) => remote.fallback.dimension(),
            Embedder::Fallback(fallback) => fallback.dimension(),
        }
    }

    /// Embed a search query.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_with(text, EmbedIntent::Query).await
    }

    pub async fn embed_with(&self, text: &str, intent: EmbedIntent) -> Vec<f32> {
        match self {
            Embedder::Remote(remote) => remote.embed_with(text, intent).await,
            Embedder::Fallback(fallback) => fallback.embed(text),
        }
    }

    /// Embed catalog documents, one output per input, in input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        self.embed_batch_observed(texts, |_| {}).await
    }

    /// [`Embedder::embed_batch`] with a callback receiving the number of
    /// items finished so far.
    pub async fn embed_batch_observed<F>(&self, texts: &[String], mut on_progress: F) -> Vec<Vec<f32>>
    where
        F: FnMut(usize),
    {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            debug!("Generating embedding for text {}/{}", i + 1, texts.len());
            vectors.push(self.embed_with(text, EmbedIntent::Document).await);
            on_progress(i + 1);
        }
        vectors
    }

    /// Remote failures absorbed so far. Always zero for the fallback variant.
    pub fn degraded_events(&self) -> u64 {
        match self {
            Embedder::Remote(remote) => remote.degraded_events(),
            Embedder::Fallback(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn norm(v: &[f32]) -> f64 {
        v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt()
    }

    fn remote(base: &str) -> GeminiEmbedder {
        remote_with_dimension(base, 16)
    }

    fn remote_with_dimension(base: &str, dimension: usize) -> GeminiEmbedder {
        GeminiEmbedder::new("test-key", base, "embedding-001", Duration::from_secs(2), dimension)
            .expect("client builds")
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_vector("Java developer test", DEFAULT_DIMENSION);
        let b = fallback_vector("Java developer test", DEFAULT_DIMENSION);
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_matches_pinned_bits() {
        // Fallback vectors must stay bit-identical across releases and platforms.
        let v = fallback_vector("Java developer test", DEFAULT_DIMENSION);
        let head: Vec<u32> = v[..4].iter().map(|x| x.to_bits()).collect();
        assert_eq!(head, vec![0x3c60_0ad0, 0xbb27_baa4, 0xbd10_e14f, 0xbcd7_1ed8]);
    }

    #[test]
    fn test_fallback_is_unit_norm() {
        for text in ["", "a", "Sales aptitude test", "ünïcödé ✓"] {
            let v = fallback_vector(text, DEFAULT_DIMENSION);
            assert!((norm(&v) - 1.0).abs() < 1e-6, "norm off for {text:?}");
        }
    }

    #[test]
    fn test_fallback_differs_between_texts() {
        let a = fallback_vector("Python data test", 64);
        let b = fallback_vector("Python data test.", 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fallback_zero_dimension_is_empty() {
        assert!(fallback_vector("anything", 0).is_empty());
    }

    #[tokio::test]
    async fn test_fallback_variant_never_degrades() {
        let embedder = Embedder::from_config(&RecommenderConfig::default());
        assert!(!embedder.is_remote());

        let v = embedder.embed("Java coding assessment").await;
        assert_eq!(v, fallback_vector("Java coding assessment", DEFAULT_DIMENSION));
        assert_eq!(embedder.degraded_events(), 0);
    }

    #[tokio::test]
    async fn test_remote_vector_is_returned_unmodified() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/embedding-001:embedContent")
                    .header("x-goog-api-key", "test-key");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "embedding": { "values": [0.5, 0.25, -1.0] } }));
            })
            .await;

        let embedder = remote_with_dimension(&server.base_url(), 3);
        let v = embedder.embed_with("leadership", EmbedIntent::Query).await;

        mock.assert_async().await;
        assert_eq!(v, vec![0.5, 0.25, -1.0]);
        assert_eq!(embedder.degraded_events(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_status_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/embedding-001:embedContent");
                then.status(403).body("API key not valid");
            })
            .await;

        let embedder = remote(&server.base_url());
        let v = embedder.embed_with("leadership", EmbedIntent::Query).await;

        assert_eq!(v, fallback_vector("leadership", 16));
        assert_eq!(embedder.degraded_events(), 1);
    }

    #[tokio::test]
    async fn test_remote_malformed_body_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/embedding-001:embedContent");
                then.status(200)
                    .header("content-type", "application/json")
                    .body("{\"unexpected\": true}");
            })
            .await;

        let embedder = remote(&server.base_url());
        let v = embedder.embed_with("leadership", EmbedIntent::Document).await;

        assert_eq!(v, fallback_vector("leadership", 16));
        assert_eq!(embedder.degraded_events(), 1);
    }

    #[tokio::test]
    async fn test_remote_empty_vector_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/embedding-001:embedContent");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "embedding": { "values": [] } }));
            })
            .await;

        let embedder = remote(&server.base_url());
        let v = embedder.embed_with("x", EmbedIntent::Query).await;
        assert_eq!(v.len(), 16);
        assert_eq!(embedder.degraded_events(), 1);
    }

    #[tokio::test]
    async fn test_remote_vector_of_wrong_length_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/embedding-001:embedContent");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "embedding": { "values": [0.5, 0.25, -1.0] } }));
            })
            .await;

        let embedder = remote(&server.base_url());
        let v = embedder.embed_with("leadership", EmbedIntent::Document).await;

        assert_eq!(v, fallback_vector("leadership", 16));
        assert_eq!(embedder.degraded_events(), 1);
    }

    #[tokio::test]
    async fn test_batch_with_unreachable_service_keeps_order() {
        // Nothing listens on port 1; every call fails to connect.
        let config = RecommenderConfig {
            embedding_api_key: Some("test-key".into()),
            embedding_api_base: "http://127.0.0.1:1".into(),
            embedding_dimensionality: 32,
            embedding_timeout_secs: 2,
            ..Default::default()
        };
        let embedder = Embedder::from_config(&config);
        assert!(embedder.is_remote());

        let texts: Vec<String> = ["first", "second", "third"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut seen = Vec::new();
        let vectors = embedder
            .embed_batch_observed(&texts, |done| seen.push(done))
            .await;

        assert_eq!(vectors.len(), 3);
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &fallback_vector(text, 32));
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(embedder.degraded_events(), 3);
    }

    #[test]
    fn test_model_prefix_is_normalized() {
        let embedder = GeminiEmbedder::new(
            "k",
            "http://localhost/v1beta/",
            "models/text-embedding-004",
            Duration::from_secs(1),
            8,
        )
        .unwrap();
        assert_eq!(
            embedder.endpoint,
            "http://localhost/v1beta/models/text-embedding-004:embedContent"
        );
    }
}
