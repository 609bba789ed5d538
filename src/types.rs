//! Crate-level error taxonomy shared across the merge pipeline.

use thiserror::Error;

/// Errors surfaced by the semantic merge pipeline.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Configuration rejected before any work started.
    #[error("invalid merge configuration: {0}")]
    Configuration(String),

    /// The embedding endpoint stayed unusable after bounded retries.
    #[error(
        "embedding service failure after {attempts} attempt(s) against {endpoint}: {message}"
    )]
    Service {
        endpoint: String,
        attempts: usize,
        message: String,
    },

    /// An input record is missing a required field.
    #[error("malformed chunk '{id}': missing {missing}")]
    MalformedChunk { id: String, missing: &'static str },
}
