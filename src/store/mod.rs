//! Vector store adapters.
//!
//! The pipeline only talks to `VectorStore`; backends decide where vectors live.

pub mod local;
pub mod pinecone;

pub use local::LocalStore;
pub use pinecone::PineconeStore;

use crate::memory::{Match, StoredMemory};
use crate::semantic::{IndexError, VectorStorageError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vector store is not configured: {0}")]
    NotConfigured(String),

    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector store returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed vector store response: {0}")]
    Malformed(String),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("snapshot error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// Operations the memory pipeline needs from a vector index.
pub trait VectorStore: Send + Sync {
    /// Fails fast when the backend cannot serve requests (e.g. missing credential).
    fn check_configured(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn upsert(&self, memory: &StoredMemory) -> Result<(), StoreError>;

    /// Top-k matches in the order the index ranks them.
    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError>;

    /// Remove exactly these ids. Unknown ids are not an error.
    fn delete(&self, ids: &[String]) -> Result<(), StoreError>;

    fn delete_all(&self) -> Result<(), StoreError>;

    fn name(&self) -> &'static str;
}
