//! Runtime configuration for the merge pipeline.

use url::Url;

use crate::types::MergeError;

/// Tunables for embedding retrieval and merge decisions.
///
/// The configuration travels explicitly into every component instead of being
/// read from ambient state, so the decision engine and the embedding client
/// stay independently testable with injected fixtures.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Base address of the embedding service; requests go to `/v1/embeddings`.
    pub embedding_endpoint: Url,
    /// Model identifier passed through to the embedding service.
    pub model: String,
    /// Minimum cosine similarity for two adjacent chunks to fuse.
    ///
    /// Drop to 0.82 when the upstream chunker runs in fine-grained mode and
    /// produces many small fragments.
    pub similarity_threshold: f32,
    /// A pair is only considered when at least one side is below this token
    /// count.
    pub min_merge_size: usize,
    /// Upper bound on the fused token count. 1800 suits fine-grained upstream
    /// output; the default chunker mode tolerates 2000 and above.
    pub max_merged_size: usize,
    /// Produce a coherence report instead of a merged chunk list.
    pub analyze_only: bool,
    /// Number of texts per embedding request. Latency tuning only; never
    /// changes merge results.
    pub batch_size: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            embedding_endpoint: Url::parse("http://127.0.0.1:9997")
                .expect("default endpoint is a valid URL"),
            model: "bge-m3".to_string(),
            similarity_threshold: 0.85,
            min_merge_size: 100,
            max_merged_size: 2000,
            analyze_only: false,
            batch_size: 10,
        }
    }
}

impl MergeConfig {
    /// Rejects out-of-range tunables before any network call is made.
    pub fn validate(&self) -> Result<(), MergeError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(MergeError::Configuration(format!(
                "similarity_threshold {} outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.max_merged_size == 0 {
            return Err(MergeError::Configuration(
                "max_merged_size must be positive".to_string(),
            ));
        }
        if self.min_merge_size > self.max_merged_size {
            return Err(MergeError::Configuration(format!(
                "min_merge_size {} exceeds max_merged_size {}",
                self.min_merge_size, self.max_merged_size
            )));
        }
        if self.batch_size == 0 {
            return Err(MergeError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MergeConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_threshold_above_one() {
        let config = MergeConfig {
            similarity_threshold: 1.2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MergeError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_negative_threshold() {
        let config = MergeConfig {
            similarity_threshold: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = MergeConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_size_bounds() {
        let config = MergeConfig {
            min_merge_size: 500,
            max_merged_size: 400,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
