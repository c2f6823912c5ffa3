//! # Recommendation enhancer
//!
//! Optional post-processing of a [`RecommendationResponse`]: a Gemini
//! generative model is shown the query and the ranked results and asked for
//!
//! - a short summary of why the results fit the query,
//! - a relevance note per assessment,
//! - a suggested order in which to run them.
//!
//! The reply is attached as [`RecommendationResponse::enhanced`]. Like the
//! embedder, the enhancer never fails a request: a transport error, non-2xx
//! status or a reply without a usable JSON object is logged at `warn` and the
//! raw results come back unchanged.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RecommenderConfig;
use crate::recommend::{Recommendation, RecommendationResponse};

/// Model commentary on a set of recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enhancement {
    pub summary: String,
    #[serde(default)]
    pub assessment_insights: Vec<AssessmentInsight>,
    #[serde(default)]
    pub recommended_sequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInsight {
    pub name: String,
    pub relevance: String,
}

#[derive(Debug, Error)]
enum EnhanceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unable to encode results for the prompt: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("reply contained no text")]
    NoText,

    #[error("reply is not an enhancement object: {0}")]
    Unparsable(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Client for a Gemini-compatible `generateContent` endpoint.
pub struct GeminiEnhancer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiEnhancer {
    /// Build a client for `{api_base}/models/{model}:generateContent`.
    ///
    /// # Errors
    /// Propagates `reqwest` client construction failures.
    pub fn new(api_key: &str, api_base: &str, model: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = format!(
            "{}/models/{}:generateContent",
            api_base.trim_end_matches('/'),
            model.trim_start_matches("models/")
        );
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.trim().to_string(),
        })
    }

    /// An enhancer using the configured credential, or `None` when there is
    /// no credential (or the client cannot be built).
    pub fn from_config(config: &RecommenderConfig) -> Option<Self> {
        let Some(api_key) = config.credential() else {
            warn!("No Gemini credential configured; recommendations will not be enhanced");
            return None;
        };

        match Self::new(
            api_key,
            &config.embedding_api_base,
            &config.enhancer_model,
            config.enhancer_timeout(),
        ) {
            Ok(enhancer) => Some(enhancer),
            Err(err) => {
                error!("Unable to build enhancer client ({err}); recommendations will not be enhanced");
                None
            }
        }
    }

    /// Attach model commentary to `response`, or hand it back untouched if
    /// anything goes wrong.
    pub async fn enhance(&self, mut response: RecommendationResponse, query: &str) -> RecommendationResponse {
        if response.results.is_empty() {
            warn!("No results to enhance");
            return response;
        }

        match self.request(&response.results, query).await {
            Ok(enhancement) => {
                info!("Enhanced {} recommendations", response.results.len());
                response.enhanced = Some(enhancement);
            }
            Err(err) => {
                warn!(error = %err, "Unable to enhance recommendations; returning raw results");
            }
        }
        response
    }

    async fn request(&self, results: &[Recommendation], query: &str) -> Result<Enhancement, EnhanceError> {
        let prompt = enhancement_prompt(results, query)?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };
        debug!("Sending enhancement request to {}", self.endpoint);

        let reply = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = reply.status();
        if !status.is_success() {
            let body = reply
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EnhanceError::Status { status, body });
        }

        let parsed: GenerateContentResponse = reply.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect::<String>())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(EnhanceError::NoText);
        }

        parse_enhancement(&text)
    }
}

fn enhancement_prompt(results: &[Recommendation], query: &str) -> Result<String, serde_json::Error> {
    let results = serde_json::to_string_pretty(results)?;
    Ok(format!(
        r#"Act as an expert talent assessment advisor. Below are a job description and a list of assessment recommendations.

Job Description:
{query}

Assessment Recommendations:
{results}

Provide:
1. A brief summary explaining why these assessments are relevant for the job description (2-3 sentences).
2. For each assessment, a short explanation of why it is relevant to this role (1-2 sentences each).
3. An optimal assessment sequence or bundle based on these recommendations.

Answer with JSON of this shape:
{{
  "summary": "...",
  "assessment_insights": [{{ "name": "Assessment Name", "relevance": "..." }}],
  "recommended_sequence": "..."
}}"#
    ))
}

/// Models wrap JSON in prose or code fences; take the outermost object.
fn parse_enhancement(text: &str) -> Result<Enhancement, EnhanceError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(EnhanceError::Unparsable("no JSON object in reply".into()));
    };
    if end < start {
        return Err(EnhanceError::Unparsable("no JSON object in reply".into()));
    }
    serde_json::from_str(&text[start..=end]).map_err(|err| EnhanceError::Unparsable(err.to_string()))
}
