//! Embedding-driven boundary optimization for ordered chunk streams.
//!
//! The upstream parser hands over a chunk list that is correct but often too
//! fragmented. The modules here fetch one embedding per chunk, score adjacent
//! pairs, and fuse small, semantically continuous neighbors in a single
//! ordered pass. A diagnostic analyzer reports corpus-wide coherence without
//! touching any boundary.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod decision;
pub mod embeddings;
pub mod fuser;
pub mod scene;
pub mod service;
pub mod similarity;
pub mod types;

pub use analyzer::{CoherenceReport, LOW_SIMILARITY_CUTOFF};
pub use cache::EmbeddingCache;
pub use config::MergeConfig;
pub use decision::{MAX_SCENE_GAP, should_merge};
pub use embeddings::{
    EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider, SharedEmbeddingProvider,
    StaticEmbeddingProvider,
};
pub use fuser::{CONTENT_SEPARATOR, fuse};
pub use service::{
    AnalysisOutcome, MergeOutcome, MergeTelemetry, RunOutput, SemanticMergeService,
    SemanticMergeServiceBuilder, merge_pass, validate_records,
};
pub use similarity::cosine_similarity;
pub use types::{Chunk, ChunkMetadata, ChunkRecord, RecordMetadata, SkippedChunk};
