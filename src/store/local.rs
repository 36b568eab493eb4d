use std::sync::RwLock;

use crate::memory::{Match, StoredMemory};
use crate::semantic::{VectorIndex, VectorStorage, VectorStorageError};

use super::{StoreError, VectorStore};

/// In-process store; optionally snapshotted to `vectors.bin` after each write.
pub struct LocalStore {
    index: RwLock<VectorIndex>,
    persistence: Option<Persistence>,
}

struct Persistence {
    storage: VectorStorage,
    model_id: [u8; 32],
}

impl LocalStore {
    /// Memory-only store, lost on exit.
    pub fn in_memory(dimensions: usize) -> Self {
        Self {
            index: RwLock::new(VectorIndex::new(dimensions)),
            persistence: None,
        }
    }

    /// Load the snapshot if one exists and keep it up to date.
    ///
    /// A snapshot written by another model is parked as `vectors.bin.<model>`
    /// and comes back when that model is configured again.
    pub fn open(
        storage: VectorStorage,
        model_id: [u8; 32],
        dimensions: usize,
    ) -> Result<Self, StoreError> {
        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(idx) => {
                    log::info!("loaded {} vectors from storage", idx.len());
                    idx
                }
                Err(VectorStorageError::ModelMismatch { stored }) => {
                    let backup = storage.set_aside(&stored)?;
                    log::warn!("embedding model changed, previous index moved to {backup}");
                    Self::restore_or_fresh(&storage, &model_id, dimensions)?
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!("storage version {file_ver} unsupported, starting a fresh index");
                    VectorIndex::new(dimensions)
                }
                Err(e) => {
                    log::error!("failed to load vectors: {e}");
                    return Err(e.into());
                }
            }
        } else {
            Self::restore_or_fresh(&storage, &model_id, dimensions)?
        };

        Ok(Self {
            index: RwLock::new(index),
            persistence: Some(Persistence { storage, model_id }),
        })
    }

    fn restore_or_fresh(
        storage: &VectorStorage,
        model_id: &[u8; 32],
        dimensions: usize,
    ) -> Result<VectorIndex, StoreError> {
        if storage.restore(model_id)? {
            let idx = storage.load(model_id, dimensions)?;
            log::info!("restored {} vectors saved under this model", idx.len());
            return Ok(idx);
        }

        log::info!("no existing index, starting fresh");
        Ok(VectorIndex::new(dimensions))
    }

    pub fn len(&self) -> usize {
        self.index.read().map(|idx| idx.len()).unwrap_or(0)
    }

    /// Apply `f` and persist. With persistence the change is made on a copy that
    /// replaces the live index only once the snapshot is written.
    fn write_index<R>(
        &self,
        f: impl FnOnce(&mut VectorIndex) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self
            .index
            .write()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {e}")))?;

        let Some(p) = &self.persistence else {
            return f(&mut *guard);
        };

        let mut next = (*guard).clone();
        let result = f(&mut next)?;
        p.storage.save(&next, &p.model_id)?;
        *guard = next;

        Ok(result)
    }
}

impl VectorStore for LocalStore {
    fn upsert(&self, memory: &StoredMemory) -> Result<(), StoreError> {
        self.write_index(|idx| Ok(idx.insert(memory.clone())?))
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError> {
        let guard = self
            .index
            .read()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {e}")))?;

        Ok(guard.search(vector, top_k, include_metadata)?)
    }

    fn delete(&self, ids: &[String]) -> Result<(), StoreError> {
        self.write_index(|idx| {
            let removed = ids.iter().filter(|id| idx.remove(id).is_some()).count();
            log::debug!("removed {removed} of {} requested ids", ids.len());
            Ok(())
        })
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.write_index(|idx| {
            idx.clear();
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
