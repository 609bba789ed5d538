//! Corpus-wide coherence statistics over adjacent same-file chunk pairs.

use serde::Serialize;
use tracing::info;

use super::cache::EmbeddingCache;
use super::similarity::cosine_similarity;
use super::types::Chunk;

/// Pairs below this similarity count as incoherent neighbors.
pub const LOW_SIMILARITY_CUTOFF: f32 = 0.5;

/// Aggregate similarity statistics for a chunk list.
///
/// Diagnostic only. Run it before a merge to tune thresholds, or on both
/// sides of one for a before/after comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoherenceReport {
    pub total_chunks: usize,
    /// Adjacent same-file pairs that had embeddings for both sides.
    pub pair_count: usize,
    pub avg_similarity: f32,
    pub min_similarity: f32,
    pub max_similarity: f32,
    pub std_similarity: f32,
    /// Pairs at or above the high cutoff (the configured merge threshold).
    pub high_similarity_pairs: usize,
    /// Pairs below [`LOW_SIMILARITY_CUTOFF`].
    pub low_similarity_pairs: usize,
}

/// Computes adjacent-pair similarity statistics without mutating any chunk.
///
/// Every same-file adjacent pair is scored, independent of merge gates.
pub fn analyze(chunks: &[Chunk], cache: &EmbeddingCache, high_cutoff: f32) -> CoherenceReport {
    let mut similarities = Vec::new();
    for pair in chunks.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        if left.metadata.source_file != right.metadata.source_file {
            continue;
        }
        let (Some(a), Some(b)) = (cache.get(&left.id), cache.get(&right.id)) else {
            continue;
        };
        similarities.push(cosine_similarity(&a, &b));
    }

    let report = summarize(chunks.len(), &similarities, high_cutoff);
    info!(
        total_chunks = report.total_chunks,
        pair_count = report.pair_count,
        avg_similarity = report.avg_similarity,
        high_similarity_pairs = report.high_similarity_pairs,
        low_similarity_pairs = report.low_similarity_pairs,
        "coherence analysis complete"
    );
    report
}

fn summarize(total_chunks: usize, similarities: &[f32], high_cutoff: f32) -> CoherenceReport {
    if similarities.is_empty() {
        return CoherenceReport {
            total_chunks,
            pair_count: 0,
            avg_similarity: 0.0,
            min_similarity: 0.0,
            max_similarity: 0.0,
            std_similarity: 0.0,
            high_similarity_pairs: 0,
            low_similarity_pairs: 0,
        };
    }

    let count = similarities.len() as f64;
    let mean = similarities.iter().map(|s| f64::from(*s)).sum::<f64>() / count;
    let variance = similarities
        .iter()
        .map(|s| {
            let delta = f64::from(*s) - mean;
            delta * delta
        })
        .sum::<f64>()
        / count;

    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for s in similarities {
        min = min.min(*s);
        max = max.max(*s);
    }

    CoherenceReport {
        total_chunks,
        pair_count: similarities.len(),
        avg_similarity: mean as f32,
        min_similarity: min,
        max_similarity: max,
        std_similarity: variance.sqrt() as f32,
        high_similarity_pairs: similarities.iter().filter(|s| **s >= high_cutoff).count(),
        low_similarity_pairs: similarities
            .iter()
            .filter(|s| **s < LOW_SIMILARITY_CUTOFF)
            .count(),
    }
}
