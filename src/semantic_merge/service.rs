//! Run orchestration: validate input, resolve embeddings, drive the pass.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::analyzer::{self, CoherenceReport};
use super::cache::EmbeddingCache;
use super::config::MergeConfig;
use super::decision::should_merge;
use super::embeddings::{HttpEmbeddingProvider, SharedEmbeddingProvider};
use super::fuser::fuse;
use super::similarity::{DEGENERATE_SIMILARITY, cosine_similarity};
use super::types::{Chunk, ChunkRecord, SkippedChunk};
use crate::types::MergeError;

/// Embedding batches in flight at once. Batches are independent and
/// read-only, so a small fan-out amortizes request latency; results are
/// re-associated to chunk ids before the sequential pass starts.
const MAX_IN_FLIGHT_BATCHES: usize = 4;

/// Summary counters for a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct MergeTelemetry {
    pub embedder: String,
    pub duration_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub input_chunks: usize,
    pub output_chunks: usize,
    pub merges: usize,
    pub skipped_chunks: usize,
}

/// Result of a merge run: the optimized list plus accounting.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedChunk>,
    pub telemetry: MergeTelemetry,
}

/// Result of an analyze-only run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub report: CoherenceReport,
    pub skipped: Vec<SkippedChunk>,
}

/// Output of [`SemanticMergeService::run`], depending on the configured mode.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunOutput {
    Merged(MergeOutcome),
    Analysis(AnalysisOutcome),
}

/// Orchestrates embedding retrieval and the sequential merge pass.
///
/// One service instance scopes one embedding cache: a vector is fetched at
/// most once per chunk id for the lifetime of the instance.
pub struct SemanticMergeService {
    provider: SharedEmbeddingProvider,
    config: MergeConfig,
    cache: EmbeddingCache,
}

impl SemanticMergeService {
    pub fn builder() -> SemanticMergeServiceBuilder {
        SemanticMergeServiceBuilder::default()
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Connectivity check; returns the embedding dimension the provider
    /// reports for a probe text.
    pub async fn probe(&self) -> Result<usize, MergeError> {
        let dimensions = self.provider.probe().await?;
        info!(
            provider = self.provider.name(),
            dimensions, "embedding provider reachable"
        );
        Ok(dimensions)
    }

    /// Runs the configured mode: a full merge pass, or coherence analysis
    /// only.
    pub async fn run(&self, records: Vec<ChunkRecord>) -> Result<RunOutput, MergeError> {
        if self.config.analyze_only {
            Ok(RunOutput::Analysis(self.analyze(records).await?))
        } else {
            Ok(RunOutput::Merged(self.optimize(records).await?))
        }
    }

    /// Optimizes chunk boundaries: embeds every chunk, then fuses adjacent
    /// small, semantically continuous chunks in one ordered pass.
    ///
    /// An embedding failure aborts the whole run; there is no partial merged
    /// output to fall back to, since every decision needs vectors for both
    /// sides of a pair.
    pub async fn optimize(&self, records: Vec<ChunkRecord>) -> Result<MergeOutcome, MergeError> {
        let started = Instant::now();
        let (chunks, skipped) = validate_records(records);
        info!(
            chunks = chunks.len(),
            skipped = skipped.len(),
            similarity_threshold = self.config.similarity_threshold,
            max_merged_size = self.config.max_merged_size,
            "starting merge run"
        );

        self.resolve_embeddings(&chunks).await?;

        let input_chunks = chunks.len();
        let (merged, merges) = merge_pass(&chunks, &self.cache, &self.config);
        let telemetry = MergeTelemetry {
            embedder: self.provider.name().to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            input_chunks,
            output_chunks: merged.len(),
            merges,
            skipped_chunks: skipped.len(),
        };
        info!(
            input = telemetry.input_chunks,
            output = telemetry.output_chunks,
            merges = telemetry.merges,
            duration_ms = telemetry.duration_ms,
            "merge run complete"
        );
        Ok(MergeOutcome {
            chunks: merged,
            skipped,
            telemetry,
        })
    }

    /// Computes the coherence report without touching chunk boundaries.
    pub async fn analyze(&self, records: Vec<ChunkRecord>) -> Result<AnalysisOutcome, MergeError> {
        let (chunks, skipped) = validate_records(records);
        self.resolve_embeddings(&chunks).await?;
        let report = analyzer::analyze(&chunks, &self.cache, self.config.similarity_threshold);
        Ok(AnalysisOutcome { report, skipped })
    }

    /// Fetches vectors for every chunk that is not already cached.
    ///
    /// Misses are grouped into `batch_size` batches and dispatched with
    /// bounded concurrency; the pass itself never performs network work.
    async fn resolve_embeddings(&self, chunks: &[Chunk]) -> Result<(), MergeError> {
        let pending: Vec<(String, String)> = chunks
            .iter()
            .filter(|chunk| self.cache.get(&chunk.id).is_none())
            .map(|chunk| (chunk.id.clone(), chunk.content.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        debug!(
            pending = pending.len(),
            batch_size = self.config.batch_size,
            "resolving embeddings"
        );

        let mut batches: VecDeque<Vec<(String, String)>> = pending
            .chunks(self.config.batch_size)
            .map(|batch| batch.to_vec())
            .collect();

        let mut in_flight: JoinSet<Result<(Vec<String>, Vec<Vec<f32>>), MergeError>> =
            JoinSet::new();
        while in_flight.len() < MAX_IN_FLIGHT_BATCHES {
            let Some(batch) = batches.pop_front() else { break };
            self.spawn_batch(&mut in_flight, batch);
        }

        while let Some(joined) = in_flight.join_next().await {
            let (ids, vectors) = joined.map_err(|err| MergeError::Service {
                endpoint: self.config.embedding_endpoint.to_string(),
                attempts: 1,
                message: format!("embedding task failed: {err}"),
            })??;
            for (id, vector) in ids.into_iter().zip(vectors) {
                self.cache.insert(id, vector);
            }
            if let Some(batch) = batches.pop_front() {
                self.spawn_batch(&mut in_flight, batch);
            }
        }

        // Every chunk must have a vector before any decision is evaluated.
        for chunk in chunks {
            if !self.cache.contains(&chunk.id) {
                return Err(MergeError::Service {
                    endpoint: self.config.embedding_endpoint.to_string(),
                    attempts: 1,
                    message: format!("no embedding resolved for chunk '{}'", chunk.id),
                });
            }
        }
        Ok(())
    }

    fn spawn_batch(
        &self,
        set: &mut JoinSet<Result<(Vec<String>, Vec<Vec<f32>>), MergeError>>,
        batch: Vec<(String, String)>,
    ) {
        let provider = Arc::clone(&self.provider);
        set.spawn(async move {
            let (ids, texts): (Vec<String>, Vec<String>) = batch.into_iter().unzip();
            let vectors = provider.embed_batch(&texts).await?;
            if vectors.len() != ids.len() {
                return Err(MergeError::Service {
                    endpoint: provider.name().to_string(),
                    attempts: 1,
                    message: format!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        ids.len()
                    ),
                });
            }
            Ok((ids, vectors))
        });
    }
}

/// Splits raw records into validated chunks and skip notes.
///
/// A malformed record never aborts the run; it is logged and recorded so the
/// output accounting stays explainable.
pub fn validate_records(records: Vec<ChunkRecord>) -> (Vec<Chunk>, Vec<SkippedChunk>) {
    let mut chunks = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        let fallback_id = record
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("record-{index}"));
        match record.into_chunk() {
            Ok(chunk) => chunks.push(chunk),
            Err(err) => {
                warn!(id = %fallback_id, %err, "skipping malformed chunk");
                skipped.push(SkippedChunk {
                    id: fallback_id,
                    reason: err.to_string(),
                });
            }
        }
    }
    (chunks, skipped)
}

/// Single ordered pass with a growing accumulator.
///
/// Each step evaluates the accumulator against the next chunk; a positive
/// decision replaces the accumulator with the fused pair, a negative one
/// emits it and restarts from the next chunk. A chain of small chunks can
/// therefore fuse step by step until a gate (usually the size cap) stops it.
///
/// The accumulator's comparison vector is the vector of its most recent
/// constituent: the boundary under test is always the seam between the
/// accumulator's tail and the next chunk, and embeddings are fully resolved
/// before the pass, so nothing is re-embedded mid-run.
pub fn merge_pass(
    chunks: &[Chunk],
    cache: &EmbeddingCache,
    config: &MergeConfig,
) -> (Vec<Chunk>, usize) {
    let mut output = Vec::with_capacity(chunks.len());
    let mut merges = 0usize;
    let mut iter = chunks.iter();
    let Some(first) = iter.next() else {
        return (output, merges);
    };
    let mut accumulator = first.clone();
    let mut boundary_vector = cache.get(&first.id);

    for next in iter {
        let next_vector = cache.get(&next.id);
        let similarity = match (&boundary_vector, &next_vector) {
            (Some(a), Some(b)) => cosine_similarity(a, b),
            _ => DEGENERATE_SIMILARITY,
        };
        if should_merge(&accumulator, next, similarity, config) {
            accumulator = fuse(&accumulator, next);
            merges += 1;
        } else {
            output.push(std::mem::replace(&mut accumulator, next.clone()));
        }
        boundary_vector = next_vector;
    }
    output.push(accumulator);
    (output, merges)
}

/// Builder for [`SemanticMergeService`].
#[derive(Default)]
pub struct SemanticMergeServiceBuilder {
    config: Option<MergeConfig>,
    provider: Option<SharedEmbeddingProvider>,
}

impl SemanticMergeServiceBuilder {
    #[must_use]
    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_embedding_provider(mut self, provider: SharedEmbeddingProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Validates the configuration and wires the default HTTP provider when
    /// none was injected. Fails fast, before any network call.
    pub fn build(self) -> Result<SemanticMergeService, MergeError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let provider = match self.provider {
            Some(provider) => provider,
            None => {
                let http =
                    HttpEmbeddingProvider::new(&config.embedding_endpoint, config.model.clone())?;
                Arc::new(http) as SharedEmbeddingProvider
            }
        };
        Ok(SemanticMergeService {
            provider,
            config,
            cache: EmbeddingCache::new(),
        })
    }
}
