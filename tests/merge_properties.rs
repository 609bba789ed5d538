//! Property tests for the similarity function and the merge pass.

use proptest::prelude::*;

use chunkweld::cache::EmbeddingCache;
use chunkweld::chunk_types::{Chunk, ChunkMetadata};
use chunkweld::config::MergeConfig;
use chunkweld::service::merge_pass;
use chunkweld::similarity::cosine_similarity;

fn vector_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
    (1usize..8).prop_flat_map(|len| {
        (
            prop::collection::vec(-1.0f32..1.0, len),
            prop::collection::vec(-1.0f32..1.0, len),
        )
    })
}

/// (token_count, second source file?, embedding) per chunk.
fn corpus() -> impl Strategy<Value = Vec<(usize, bool, Vec<f32>)>> {
    prop::collection::vec(
        (
            1usize..400,
            any::<bool>(),
            prop::collection::vec(-1.0f32..1.0, 4),
        ),
        1..12,
    )
}

fn build_corpus(blueprint: &[(usize, bool, Vec<f32>)]) -> (Vec<Chunk>, EmbeddingCache) {
    let cache = EmbeddingCache::new();
    let chunks = blueprint
        .iter()
        .enumerate()
        .map(|(index, (tokens, second_file, vector))| {
            let id = format!("chunk_{index}");
            cache.insert(id.clone(), vector.clone());
            Chunk {
                id: id.clone(),
                content: format!("text of {id}"),
                metadata: ChunkMetadata {
                    token_count: *tokens,
                    source_file: if *second_file { "f2" } else { "f1" }.to_string(),
                    scene_id: format!("scene_{index}"),
                    ..Default::default()
                },
                merged_from: Vec::new(),
            }
        })
        .collect();
    (chunks, cache)
}

proptest! {
    #[test]
    fn similarity_is_symmetric((a, b) in vector_pair()) {
        let forward = cosine_similarity(&a, &b);
        let backward = cosine_similarity(&b, &a);
        prop_assert!((forward - backward).abs() < 1e-6);
    }

    #[test]
    fn merge_pass_conserves_tokens_and_identities(blueprint in corpus()) {
        let (chunks, cache) = build_corpus(&blueprint);
        let config = MergeConfig {
            similarity_threshold: 0.3,
            ..Default::default()
        };

        let (output, _) = merge_pass(&chunks, &cache, &config);

        let input_tokens: usize = chunks.iter().map(|c| c.metadata.token_count).sum();
        let output_tokens: usize = output.iter().map(|c| c.metadata.token_count).sum();
        prop_assert_eq!(input_tokens, output_tokens);

        let input_ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let reachable: Vec<&str> = output
            .iter()
            .flat_map(|chunk| {
                if chunk.merged_from.is_empty() {
                    vec![chunk.id.as_str()]
                } else {
                    chunk.merged_from.iter().map(String::as_str).collect()
                }
            })
            .collect();
        prop_assert_eq!(input_ids, reachable);
    }

    #[test]
    fn fused_chunks_respect_the_size_cap(blueprint in corpus()) {
        let (chunks, cache) = build_corpus(&blueprint);
        let config = MergeConfig {
            similarity_threshold: 0.0,
            max_merged_size: 500,
            ..Default::default()
        };

        let (output, _) = merge_pass(&chunks, &cache, &config);
        for chunk in &output {
            if !chunk.merged_from.is_empty() {
                prop_assert!(chunk.metadata.token_count <= config.max_merged_size);
            }
        }
    }
}
