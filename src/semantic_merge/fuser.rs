//! Fusion of two adjacent chunks into one fresh record.

use super::types::{Chunk, ChunkMetadata};

/// Separator placed between the two content bodies of a fused chunk.
pub const CONTENT_SEPARATOR: &str = "\n---\n";

/// Fuses `left` and `right` into a new chunk.
///
/// Field rules: content concatenates in order around [`CONTENT_SEPARATOR`];
/// `token_count` and `dialogue_count` sum; `characters` unions; `emotions`
/// unions with the right side winning on collision (later scene state
/// overrides earlier); `voice_refs` concatenates without de-duplication;
/// `location`, `bgm`, `scene_id`, and unmodeled `extra` fields carry from
/// the right chunk (falling back to the left for the two optionals);
/// `merged_from` flattens both lineages in order. The fused id derives from
/// the first constituent, so it stays stable as a chain grows.
///
/// Callers are expected to have accepted the pair via
/// [`should_merge`](super::decision::should_merge); in particular both
/// chunks share a `source_file`.
pub fn fuse(left: &Chunk, right: &Chunk) -> Chunk {
    let mut lineage: Vec<String> = if left.merged_from.is_empty() {
        vec![left.id.clone()]
    } else {
        left.merged_from.clone()
    };
    if right.merged_from.is_empty() {
        lineage.push(right.id.clone());
    } else {
        lineage.extend(right.merged_from.iter().cloned());
    }

    let root = left.merged_from.first().unwrap_or(&left.id);
    let id = format!("{root}_merged");

    let mut characters = left.metadata.characters.clone();
    characters.extend(right.metadata.characters.iter().cloned());

    let mut emotions = left.metadata.emotions.clone();
    emotions.extend(
        right
            .metadata
            .emotions
            .iter()
            .map(|(name, emotion)| (name.clone(), emotion.clone())),
    );

    let mut voice_refs = left.metadata.voice_refs.clone();
    voice_refs.extend(right.metadata.voice_refs.iter().cloned());

    Chunk {
        id,
        content: format!("{}{}{}", left.content, CONTENT_SEPARATOR, right.content),
        metadata: ChunkMetadata {
            token_count: left.metadata.token_count + right.metadata.token_count,
            source_file: right.metadata.source_file.clone(),
            scene_id: right.metadata.scene_id.clone(),
            characters,
            emotions,
            voice_refs,
            location: right
                .metadata
                .location
                .clone()
                .or_else(|| left.metadata.location.clone()),
            bgm: right
                .metadata
                .bgm
                .clone()
                .or_else(|| left.metadata.bgm.clone()),
            dialogue_count: left.metadata.dialogue_count + right.metadata.dialogue_count,
            extra: right.metadata.extra.clone(),
        },
        merged_from: lineage,
    }
}
