//! Gate evaluation for fusing an adjacent chunk pair.

use tracing::trace;

use super::config::MergeConfig;
use super::scene;
use super::types::Chunk;

/// Largest allowed distance between two scene ordinals for a fuse.
///
/// Keeps textually adjacent chunks from fusing across skipped or omitted
/// scenes.
pub const MAX_SCENE_GAP: i64 = 2;

/// Decides whether `left` (the running accumulator) and `right` may fuse.
///
/// Every gate must pass:
/// 1. at least one side is below `min_merge_size`,
/// 2. similarity reaches `similarity_threshold`,
/// 3. the fused size stays within `max_merged_size`,
/// 4. both chunks come from the same source file,
/// 5. their scenes sit within [`MAX_SCENE_GAP`] of each other.
///
/// Deterministic given the pair and the configuration; no history beyond the
/// pair itself.
pub fn should_merge(left: &Chunk, right: &Chunk, similarity: f32, config: &MergeConfig) -> bool {
    let has_small_side = left.metadata.token_count < config.min_merge_size
        || right.metadata.token_count < config.min_merge_size;
    let similar_enough = similarity >= config.similarity_threshold;
    let within_cap =
        left.metadata.token_count + right.metadata.token_count <= config.max_merged_size;
    let same_source = left.metadata.source_file == right.metadata.source_file;
    let scenes_close = scene::within_gap(left, right, MAX_SCENE_GAP);

    let fuse = has_small_side && similar_enough && within_cap && same_source && scenes_close;
    trace!(
        left = %left.id,
        right = %right.id,
        similarity,
        has_small_side,
        similar_enough,
        within_cap,
        same_source,
        scenes_close,
        fuse,
        "evaluated adjacent pair"
    );
    fuse
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_merge::types::ChunkMetadata;

    fn chunk(id: &str, tokens: usize, source: &str, scene: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: format!("content of {id}"),
            metadata: ChunkMetadata {
                token_count: tokens,
                source_file: source.to_string(),
                scene_id: scene.to_string(),
                ..Default::default()
            },
            merged_from: Vec::new(),
        }
    }

    fn config() -> MergeConfig {
        MergeConfig {
            similarity_threshold: 0.85,
            min_merge_size: 100,
            max_merged_size: 2000,
            ..Default::default()
        }
    }

    #[test]
    fn small_similar_same_file_pair_merges() {
        let a = chunk("a", 45, "f1", "f1_scene_4");
        let b = chunk("b", 380, "f1", "f1_scene_5");
        assert!(should_merge(&a, &b, 0.89, &config()));
    }

    #[test]
    fn low_similarity_blocks_the_merge() {
        let a = chunk("a", 45, "f1", "f1_scene_4");
        let b = chunk("b", 380, "f1", "f1_scene_5");
        assert!(!should_merge(&a, &b, 0.70, &config()));
    }

    #[test]
    fn cross_file_pair_never_merges() {
        let a = chunk("a", 45, "f1", "f1_scene_4");
        let b = chunk("b", 380, "f2", "f2_scene_5");
        assert!(!should_merge(&a, &b, 0.99, &config()));
    }

    #[test]
    fn two_large_chunks_never_merge() {
        let a = chunk("a", 150, "f1", "f1_scene_4");
        let b = chunk("b", 380, "f1", "f1_scene_5");
        assert!(!should_merge(&a, &b, 0.99, &config()));
    }

    #[test]
    fn size_cap_blocks_oversized_fusion() {
        let a = chunk("a", 50, "f1", "f1_scene_4");
        let b = chunk("b", 1990, "f1", "f1_scene_5");
        assert!(!should_merge(&a, &b, 0.99, &config()));
    }

    #[test]
    fn distant_scenes_never_merge() {
        let a = chunk("a", 45, "f1", "f1_scene_4");
        let b = chunk("b", 40, "f1", "f1_scene_9");
        assert!(!should_merge(&a, &b, 0.99, &config()));
    }

    #[test]
    fn unreachable_threshold_blocks_everything() {
        let hostile = MergeConfig {
            similarity_threshold: 1.0 + f32::EPSILON,
            ..config()
        };
        let a = chunk("a", 45, "f1", "f1_scene_4");
        let b = chunk("b", 40, "f1", "f1_scene_5");
        assert!(!should_merge(&a, &b, 1.0, &hostile));
    }
}
