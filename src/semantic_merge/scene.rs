//! Scene ordering keys used to bound how far apart two chunks may drift.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::Chunk;

static TRAILING_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*$").expect("trailing ordinal pattern compiles"));

/// Scene key for a chunk.
///
/// Oversized scenes are split upstream into sub-chunks whose ids look like
/// `{scene}_sub_{n}`; their key is the scene prefix so siblings of one scene
/// compare as related. Everything else keys on `metadata.scene_id`.
pub fn scene_key(chunk: &Chunk) -> &str {
    match chunk.id.split_once("_sub_") {
        Some((prefix, _)) => prefix,
        None => &chunk.metadata.scene_id,
    }
}

/// Trailing decimal run of a scene key, if any.
pub fn scene_ordinal(key: &str) -> Option<i64> {
    TRAILING_ORDINAL
        .captures(key)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Whether two chunks sit close enough in scene order to fuse.
///
/// Identical keys are always related. Keys without a parseable ordinal are
/// treated as related; with no ordering there is nothing to guard.
pub fn within_gap(left: &Chunk, right: &Chunk, max_gap: i64) -> bool {
    let left_key = scene_key(left);
    let right_key = scene_key(right);
    if left_key == right_key {
        return true;
    }
    match (scene_ordinal(left_key), scene_ordinal(right_key)) {
        (Some(a), Some(b)) => (a - b).abs() <= max_gap,
        _ => true,
    }
}
