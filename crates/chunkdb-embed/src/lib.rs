//! chunkdb-embed
//!
//! The embedding model is an external collaborator; this crate holds the
//! deterministic feature-hashing embedder used when no model is wired, and
//! the bounded worker pool that keeps embedding off the query path.

pub mod hash;
pub mod pool;

pub use hash::{l2_normalize, HashEmbedder};
pub use pool::{embed_query, EmbedPool};
