//! Embedding generation and the local vector index.
//!
//! # Architecture
//!
//! - `embeddings`: `Embedder` seam, fastembed model, pipeline adapter
//! - `index`: In-memory vector index with cosine similarity search
//! - `storage`: Binary file I/O for vectors.bin persistence
//! - `preprocess`: Text preparation for embedding input

pub mod embeddings;
mod index;
mod preprocess;
mod storage;

pub use embeddings::{Embedder, EmbeddingAdapter, EmbeddingError, EmbeddingModel};
pub use index::{IndexError, VectorIndex};
pub use storage::{model_id_hash, VectorStorage, VectorStorageError};
#[cfg(test)]
pub use storage::backup_file_name;

/// Default embedding model name (384 dimensions)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
