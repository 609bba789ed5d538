//! Chunk data model: validated chunks and their tolerant serde-facing twin.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::MergeError;

/// A contiguous unit of script text plus structured metadata.
///
/// Chunks are never mutated in place; fusing two chunks produces a fresh
/// record and leaves the originals untouched. Embedding vectors live in the
/// run's [`EmbeddingCache`](super::cache::EmbeddingCache), keyed by chunk id,
/// and are never serialized with the chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Ids of the source chunks this chunk was fused from, in narrative
    /// order. Empty for chunks that never participated in a merge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
}

/// Structured metadata attached to every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub token_count: usize,
    pub source_file: String,
    #[serde(default)]
    pub scene_id: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub characters: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub emotions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voice_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm: Option<String>,
    #[serde(default)]
    pub dialogue_count: usize,
    /// Metadata fields this crate does not model. Fusion carries them from
    /// the most recent chunk.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Chunk record as produced by the upstream parser, prior to validation.
///
/// Required fields are optional here so one malformed record can be skipped
/// with a warning instead of failing deserialization of the whole corpus.
/// Accepts both `id` and the legacy `chunk_id` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(default, alias = "chunk_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
}

/// Metadata payload of a [`ChunkRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub token_count: Option<usize>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub scene_id: Option<String>,
    #[serde(default)]
    pub characters: BTreeSet<String>,
    #[serde(default)]
    pub emotions: BTreeMap<String, String>,
    #[serde(default)]
    pub voice_refs: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bgm: Option<String>,
    #[serde(default)]
    pub dialogue_count: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ChunkRecord {
    /// Validates the record into a [`Chunk`].
    ///
    /// `id`, `content`, `metadata.token_count`, and `metadata.source_file`
    /// are required; everything else falls back to an empty value. Empty
    /// `location`/`bgm` strings normalize to absent, matching how the
    /// upstream parser emits them.
    pub fn into_chunk(self) -> Result<Chunk, MergeError> {
        let Some(id) = self.id.filter(|id| !id.is_empty()) else {
            return Err(MergeError::MalformedChunk {
                id: "<unidentified>".to_string(),
                missing: "id",
            });
        };
        let Some(content) = self.content.filter(|content| !content.is_empty()) else {
            return Err(MergeError::MalformedChunk {
                id,
                missing: "content",
            });
        };
        let Some(metadata) = self.metadata else {
            return Err(MergeError::MalformedChunk {
                id,
                missing: "metadata",
            });
        };
        let Some(token_count) = metadata.token_count else {
            return Err(MergeError::MalformedChunk {
                id,
                missing: "metadata.token_count",
            });
        };
        let Some(source_file) = metadata.source_file.filter(|source| !source.is_empty()) else {
            return Err(MergeError::MalformedChunk {
                id,
                missing: "metadata.source_file",
            });
        };

        Ok(Chunk {
            id,
            content,
            metadata: ChunkMetadata {
                token_count,
                source_file,
                scene_id: metadata.scene_id.unwrap_or_default(),
                characters: metadata.characters,
                emotions: metadata.emotions,
                voice_refs: metadata.voice_refs,
                location: metadata.location.filter(|location| !location.is_empty()),
                bgm: metadata.bgm.filter(|bgm| !bgm.is_empty()),
                dialogue_count: metadata.dialogue_count.unwrap_or(0),
                extra: metadata.extra,
            },
            merged_from: self.merged_from,
        })
    }
}

/// Input record rejected during validation, with the reason it was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedChunk {
    pub id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> serde_json::Value {
        json!({
            "chunk_id": "script01_scene_004",
            "content": "「おはよう」",
            "metadata": {
                "token_count": 45,
                "source_file": "script01.txt",
                "scene_id": "script01_scene_004",
                "characters": ["aoi"],
                "emotions": {"aoi": "happy"},
                "voice_refs": ["vo_adv_01"],
                "location": "",
                "bgm": "bgm_morning",
                "dialogue_count": 3,
                "overlap_prev": "…"
            }
        })
    }

    #[test]
    fn accepts_legacy_chunk_id_key() {
        let record: ChunkRecord = serde_json::from_value(full_record()).unwrap();
        let chunk = record.into_chunk().unwrap();
        assert_eq!(chunk.id, "script01_scene_004");
        assert_eq!(chunk.metadata.token_count, 45);
    }

    #[test]
    fn empty_location_normalizes_to_absent() {
        let record: ChunkRecord = serde_json::from_value(full_record()).unwrap();
        let chunk = record.into_chunk().unwrap();
        assert_eq!(chunk.metadata.location, None);
        assert_eq!(chunk.metadata.bgm.as_deref(), Some("bgm_morning"));
    }

    #[test]
    fn unmodeled_metadata_lands_in_extra() {
        let record: ChunkRecord = serde_json::from_value(full_record()).unwrap();
        let chunk = record.into_chunk().unwrap();
        assert_eq!(chunk.metadata.extra.get("overlap_prev"), Some(&json!("…")));
    }

    #[test]
    fn missing_content_is_malformed() {
        let mut value = full_record();
        value.as_object_mut().unwrap().remove("content");
        let record: ChunkRecord = serde_json::from_value(value).unwrap();
        let err = record.into_chunk().unwrap_err();
        assert!(matches!(
            err,
            MergeError::MalformedChunk {
                missing: "content",
                ..
            }
        ));
    }

    #[test]
    fn missing_token_count_is_malformed() {
        let mut value = full_record();
        value["metadata"].as_object_mut().unwrap().remove("token_count");
        let record: ChunkRecord = serde_json::from_value(value).unwrap();
        let err = record.into_chunk().unwrap_err();
        assert!(matches!(
            err,
            MergeError::MalformedChunk {
                missing: "metadata.token_count",
                ..
            }
        ));
    }

    #[test]
    fn missing_source_file_is_malformed() {
        let mut value = full_record();
        value["metadata"]["source_file"] = json!("");
        let record: ChunkRecord = serde_json::from_value(value).unwrap();
        assert!(record.into_chunk().is_err());
    }

    #[test]
    fn unmerged_chunk_serializes_without_merged_from() {
        let record: ChunkRecord = serde_json::from_value(full_record()).unwrap();
        let chunk = record.into_chunk().unwrap();
        let value = serde_json::to_value(&chunk).unwrap();
        assert!(value.get("merged_from").is_none());
    }
}
