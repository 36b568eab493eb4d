//! In-memory vector index with cosine similarity search.
//!
//! Stores memory embeddings together with their metadata.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::memory::{Match, MemoryMetadata, StoredMemory};

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// The embedding vector
    pub embedding: Vec<f32>,
    pub metadata: MemoryMetadata,
}

/// In-memory vector index for semantic search.
///
/// Stores embeddings keyed by memory ID, supporting:
/// - Insert/remove operations
/// - Cosine similarity top-k search
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: HashMap<String, VectorEntry>,
    /// Expected embedding dimensions
    dimensions: usize,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an entry.
    ///
    /// Returns an error if the embedding has the wrong length or zero norm.
    pub fn insert(&mut self, memory: StoredMemory) -> Result<(), IndexError> {
        if memory.vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: memory.vector.len(),
            });
        }

        if Self::l2_norm(&memory.vector) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.insert(
            memory.id,
            VectorEntry {
                embedding: memory.vector,
                metadata: memory.metadata,
            },
        );

        Ok(())
    }

    /// Remove an entry by ID. Unknown IDs are ignored.
    pub fn remove(&mut self, id: &str) -> Option<VectorEntry> {
        self.entries.remove(id)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&VectorEntry> {
        self.entries.get(id)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VectorEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Top-k search by cosine similarity.
    ///
    /// Results are sorted by score (highest first), ties by ID. Metadata is
    /// left empty when `include_metadata` is false.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = Self::l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut scored: Vec<(&String, &VectorEntry, f32)> = self
            .entries
            .iter()
            .map(|(id, entry)| {
                let score = Self::cosine_similarity(query, &entry.embedding, query_norm);
                (id, entry, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(id, entry, score)| Match {
                id: id.clone(),
                score,
                metadata: if include_metadata {
                    entry.metadata.clone()
                } else {
                    MemoryMetadata::default()
                },
            })
            .collect())
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Assumes query_norm is precomputed.
    fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}
