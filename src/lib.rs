//! ```text
//! Parsed script chunks ──► semantic_merge::service ──► optimized chunk list
//!                                      │
//!                                      ├─► embeddings (batched fetch, retry, cache)
//!                                      ├─► decision + fuser (accumulator pass)
//!                                      └─► analyzer (coherence report)
//! ```
//!
pub mod semantic_merge;
pub mod types;

pub use semantic_merge::analyzer;
pub use semantic_merge::cache;
pub use semantic_merge::config;
pub use semantic_merge::decision;
pub use semantic_merge::embeddings;
pub use semantic_merge::fuser;
pub use semantic_merge::scene;
pub use semantic_merge::service;
pub use semantic_merge::similarity;
pub use semantic_merge::types as chunk_types;
