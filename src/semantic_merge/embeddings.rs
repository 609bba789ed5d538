//! Embedding providers: the remote HTTP client plus deterministic fixtures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::types::MergeError;

/// Generous because batch embedding calls on large models can take tens of
/// seconds.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Implemented by anything that can turn a batch of texts into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns one vector per input, in input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, MergeError>;

    /// Short provider label for telemetry.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Embeds a tiny probe text and reports the embedding dimension.
    ///
    /// Useful as a connectivity check before committing to a long run.
    async fn probe(&self) -> Result<usize, MergeError> {
        let vectors = self.embed_batch(&["probe".to_string()]).await?;
        Ok(vectors.first().map(Vec::len).unwrap_or(0))
    }
}

/// Shared handle to a provider implementation.
pub type SharedEmbeddingProvider = Arc<dyn EmbeddingProvider>;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

enum RequestFailure {
    Transient(String),
    Terminal(String),
}

/// Client for OpenAI-compatible embedding endpoints (XInference, vLLM, …).
///
/// Transient failures (connect errors, timeouts, 429, 5xx) are retried with
/// linear backoff before the error escalates; anything else fails the batch
/// immediately. Timeouts apply per request, not per run.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    embed_url: Url,
    model: String,
    max_retries: usize,
    backoff: Duration,
}

impl HttpEmbeddingProvider {
    /// Builds a client against `endpoint` (base address, no path) for `model`.
    pub fn new(endpoint: &Url, model: impl Into<String>) -> Result<Self, MergeError> {
        let embed_url = endpoint.join("/v1/embeddings").map_err(|err| {
            MergeError::Configuration(format!("invalid embedding endpoint: {err}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| {
                MergeError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            embed_url,
            model: model.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Number of retries after the initial attempt.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay between retries; attempt `n` waits `n * backoff`.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure> {
        let payload = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .client
            .post(self.embed_url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    RequestFailure::Transient(err.to_string())
                } else {
                    RequestFailure::Terminal(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("status {status}: {body}");
            return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(RequestFailure::Transient(message))
            } else {
                Err(RequestFailure::Terminal(message))
            };
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|err| {
            RequestFailure::Terminal(format!("unparseable embedding response: {err}"))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(RequestFailure::Terminal(format!(
                "endpoint returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, MergeError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self.request(inputs).await {
                Ok(vectors) => {
                    debug!(count = vectors.len(), attempt, "embedding batch resolved");
                    return Ok(vectors);
                }
                Err(RequestFailure::Transient(message)) if attempt <= self.max_retries => {
                    let delay = self.backoff * attempt as u32;
                    warn!(
                        %message,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient embedding failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(RequestFailure::Transient(message))
                | Err(RequestFailure::Terminal(message)) => {
                    return Err(MergeError::Service {
                        endpoint: self.embed_url.to_string(),
                        attempts: attempt,
                        message,
                    });
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Deterministic pseudo-embeddings for tests and offline runs.
///
/// The same text always maps to the same unit-normalized vector; different
/// texts almost always map to different ones.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 32 }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions.max(1);
        self
    }

    fn pseudo_vector(&self, text: &str) -> Vec<f32> {
        // FNV-1a over the text seeds an LCG stream, one draw per dimension.
        let mut seed = 0xcbf2_9ce4_8422_2325u64;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut vector = Vec::with_capacity(self.dimensions);
        let mut state = seed;
        for _ in 0..self.dimensions {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            vector.push(unit * 2.0 - 1.0);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, MergeError> {
        Ok(inputs.iter().map(|text| self.pseudo_vector(text)).collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Fixture provider backed by an explicit text → vector table.
///
/// Lets tests engineer exact adjacent-pair similarities; an input without a
/// fixture vector is an error so typos fail loudly.
#[derive(Debug, Clone, Default)]
pub struct StaticEmbeddingProvider {
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbeddingProvider {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, MergeError> {
        inputs
            .iter()
            .map(|text| {
                self.vectors.get(text).cloned().ok_or_else(|| MergeError::Service {
                    endpoint: "static".to_string(),
                    attempts: 1,
                    message: format!("no fixture vector for input '{text}'"),
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let inputs = vec![
            "Hello world".to_string(),
            "Goodbye world".to_string(),
            "Hello world".to_string(),
        ];

        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn mock_embeddings_are_unit_normalized() {
        let provider = MockEmbeddingProvider::new().with_dimensions(8);
        let vectors = provider.embed_batch(&["text".to_string()]).await.unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn probe_reports_the_dimension() {
        let provider = MockEmbeddingProvider::new().with_dimensions(16);
        assert_eq!(provider.probe().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn static_provider_serves_and_rejects() {
        let provider =
            StaticEmbeddingProvider::new().with_vector("known", vec![1.0, 0.0]);
        let served = provider.embed_batch(&["known".to_string()]).await.unwrap();
        assert_eq!(served, vec![vec![1.0, 0.0]]);

        let err = provider
            .embed_batch(&["unknown".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::Service { .. }));
    }
}
