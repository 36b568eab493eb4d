//! Binary snapshot of the local vector index.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - id_len: u16, id: [u8; id_len] (UTF-8)
//! - embedding: [f32; dimensions] (little-endian)
//! - metadata_len: u32, metadata: [u8; metadata_len] (JSON)

use std::io::Read;

use sha2::{Digest, Sha256};

use crate::memory::{MemoryMetadata, StoredMemory};
use crate::semantic::index::VectorIndex;
use crate::storage::{BackendLocal, StorageManager};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

pub const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch { stored: [u8; 32] },

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// SHA256 of the model name, stamped into the snapshot header.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// File name a snapshot of `model_id` is parked under while another model is active.
pub fn backup_file_name(model_id: &[u8; 32]) -> String {
    let tag: String = model_id[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{VECTORS_FILE}.{tag}")
}

/// Reads and writes `vectors.bin` inside a storage directory.
#[derive(Debug, Clone)]
pub struct VectorStorage {
    backend: BackendLocal,
}

impl VectorStorage {
    pub fn new(backend: BackendLocal) -> Self {
        Self { backend }
    }

    pub fn exists(&self) -> bool {
        self.backend.exists(VECTORS_FILE)
    }

    /// Load the snapshot, validating it against the running model.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let bytes = self.backend.read(VECTORS_FILE)?;
        let mut reader = bytes.as_slice();

        let header = read_header(&mut reader)?;
        validate_header(&header, expected_model_id, expected_dimensions)?;

        let dimensions = header.dimensions as usize;

        // smallest entry: empty id, the vector, empty metadata
        let min_entry = 2 + dimensions * 4 + 4;
        if header.entry_count > (reader.len() / min_entry) as u64 {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{} entries do not fit in {} bytes",
                header.entry_count,
                reader.len()
            )));
        }

        let mut index = VectorIndex::with_capacity(dimensions, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let memory = read_entry(&mut reader, dimensions)?;
            let id = memory.id.clone();
            if let Err(err) = index.insert(memory) {
                log::warn!("skipping stored vector {id}: {err}");
            }
        }

        Ok(index)
    }

    /// Move the current snapshot to the backup slot of the model that wrote it.
    pub fn set_aside(&self, stored_model_id: &[u8; 32]) -> Result<String, VectorStorageError> {
        let backup = backup_file_name(stored_model_id);
        self.backend.rename(VECTORS_FILE, &backup)?;
        Ok(backup)
    }

    /// Bring back a parked snapshot of `model_id`. Returns false when there is none.
    pub fn restore(&self, model_id: &[u8; 32]) -> Result<bool, VectorStorageError> {
        let backup = backup_file_name(model_id);
        if !self.backend.exists(&backup) {
            return Ok(false);
        }

        self.backend.rename(&backup, VECTORS_FILE)?;
        Ok(true)
    }

    /// Save the index. Written atomically through the storage backend.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let bytes = encode(index, model_id)?;
        self.backend.write(VECTORS_FILE, &bytes)?;
        Ok(())
    }
}

fn encode(index: &VectorIndex, model_id: &[u8; 32]) -> Result<Vec<u8>, VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("{} dimensions do not fit", index.dimensions()))
    })?;

    let mut out = Vec::with_capacity(HEADER_SIZE + index.len() * (index.dimensions() * 4 + 256));

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes[0] = FORMAT_VERSION;
    header_bytes[1..33].copy_from_slice(model_id);
    header_bytes[33..35].copy_from_slice(&dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&(index.len() as u64).to_le_bytes());
    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&header_bytes);

    for (id, entry) in index.iter() {
        let id_len = u16::try_from(id.len())
            .map_err(|_| VectorStorageError::InvalidFormat(format!("id too long: {id}")))?;
        out.extend_from_slice(&id_len.to_le_bytes());
        out.extend_from_slice(id.as_bytes());

        for &value in &entry.embedding {
            out.extend_from_slice(&value.to_le_bytes());
        }

        let metadata = serde_json::to_vec(&entry.metadata)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;
        out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
        out.extend_from_slice(&metadata);
    }

    Ok(out)
}

/// File header structure.
#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn read_header(reader: &mut &[u8]) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes([
        header_bytes[43],
        header_bytes[44],
        header_bytes[45],
        header_bytes[46],
    ]);
    if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);
    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);

    Ok(Header {
        model_id,
        dimensions,
        entry_count: u64::from_le_bytes(count_bytes),
    })
}

fn validate_header(
    header: &Header,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), VectorStorageError> {
    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch {
            stored: header.model_id,
        });
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

/// Borrow the next `len` bytes, failing before anything is allocated when the file is shorter.
fn take<'a>(reader: &mut &'a [u8], len: usize) -> Result<&'a [u8], VectorStorageError> {
    if len > reader.len() {
        return Err(VectorStorageError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("need {len} bytes, {} left", reader.len()),
        )));
    }

    let (head, rest) = reader.split_at(len);
    *reader = rest;
    Ok(head)
}

fn read_entry(reader: &mut &[u8], dimensions: usize) -> Result<StoredMemory, VectorStorageError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let id_bytes = take(reader, u16::from_le_bytes(len_bytes) as usize)?;
    let id = String::from_utf8(id_bytes.to_vec())
        .map_err(|_| VectorStorageError::InvalidFormat("id is not valid utf8".into()))?;

    let mut vector = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        vector.push(f32::from_le_bytes(float_bytes));
    }

    let mut meta_len = [0u8; 4];
    reader.read_exact(&mut meta_len)?;
    let meta_bytes = take(reader, u32::from_le_bytes(meta_len) as usize)?;
    let metadata: MemoryMetadata = serde_json::from_slice(meta_bytes)
        .map_err(|e| VectorStorageError::InvalidFormat(format!("metadata for {id}: {e}")))?;

    Ok(StoredMemory {
        id,
        vector,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (VectorStorage, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let backend = BackendLocal::new(tmp.path().to_str().unwrap()).unwrap();
        (VectorStorage::new(backend), tmp)
    }

    fn memory(id: &str, vector: Vec<f32>) -> StoredMemory {
        StoredMemory {
            id: id.to_string(),
            vector,
            metadata: MemoryMetadata {
                title: "Rust – ownership".to_string(),
                url: format!("https://example.com/{id}"),
                content: "borrowck 日本語".to_string(),
                timestamp: "2024-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn test_save_and_load_empty() {
        let (storage, _tmp) = storage();
        let model_id = model_id_hash("all-MiniLM-L6-v2");

        storage.save(&VectorIndex::new(384), &model_id).unwrap();
        assert!(storage.exists());

        let loaded = storage.load(&model_id, 384).unwrap();
        assert_eq!(loaded.len(), 0);
        assert_eq!(loaded.dimensions(), 384);
    }

    #[test]
    fn test_save_and_load_with_entries() {
        let (storage, _tmp) = storage();
        let model_id = model_id_hash("all-MiniLM-L6-v2");

        let mut index = VectorIndex::new(3);
        index.insert(memory("id-1", vec![1.0, 0.0, 0.0])).unwrap();
        index.insert(memory("id-2", vec![0.0, 1.0, 0.5])).unwrap();
        storage.save(&index, &model_id).unwrap();

        let loaded = storage.load(&model_id, 3).unwrap();
        assert_eq!(loaded.len(), 2);

        let entry = loaded.get("id-2").unwrap();
        assert_eq!(entry.embedding, vec![0.0, 1.0, 0.5]);
        assert_eq!(entry.metadata.title, "Rust – ownership");
        assert_eq!(entry.metadata.content, "borrowck 日本語");
    }

    #[test]
    fn test_model_mismatch() {
        let (storage, _tmp) = storage();
        storage
            .save(&VectorIndex::new(3), &model_id_hash("model-a"))
            .unwrap();

        let result = storage.load(&model_id_hash("model-b"), 3);
        assert!(matches!(
            result,
            Err(VectorStorageError::ModelMismatch { stored }) if stored == model_id_hash("model-a")
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let (storage, _tmp) = storage();
        let model_id = model_id_hash("m");
        storage.save(&VectorIndex::new(3), &model_id).unwrap();

        let result = storage.load(&model_id, 384);
        assert!(matches!(result, Err(VectorStorageError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let (storage, tmp) = storage();
        let model_id = model_id_hash("m");
        let mut index = VectorIndex::new(3);
        index.insert(memory("a", vec![1.0, 0.0, 0.0])).unwrap();
        storage.save(&index, &model_id).unwrap();

        let path = tmp.path().join(VECTORS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[10] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = storage.load(&model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::ChecksumMismatch)));
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let (storage, tmp) = storage();
        let model_id = model_id_hash("m");
        let mut index = VectorIndex::new(3);
        index.insert(memory("a", vec![1.0, 0.0, 0.0])).unwrap();
        storage.save(&index, &model_id).unwrap();

        let path = tmp.path().join(VECTORS_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert!(matches!(
            storage.load(&model_id, 3),
            Err(VectorStorageError::Io(_))
        ));
    }

    #[test]
    fn test_oversized_metadata_length_is_rejected() {
        let (storage, tmp) = storage();
        let model_id = model_id_hash("m");
        let mut index = VectorIndex::new(3);
        index.insert(memory("a", vec![1.0, 0.0, 0.0])).unwrap();
        storage.save(&index, &model_id).unwrap();

        // header, id_len + "a", three floats, then metadata_len
        let meta_len_at = HEADER_SIZE + 2 + 1 + 3 * 4;
        let path = tmp.path().join(VECTORS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[meta_len_at..meta_len_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            storage.load(&model_id, 3),
            Err(VectorStorageError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn test_entry_count_beyond_file_size_is_rejected() {
        let (storage, tmp) = storage();
        let model_id = model_id_hash("m");
        let mut index = VectorIndex::new(3);
        index.insert(memory("a", vec![1.0, 0.0, 0.0])).unwrap();
        storage.save(&index, &model_id).unwrap();

        let path = tmp.path().join(VECTORS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[35..43].copy_from_slice(&u64::MAX.to_le_bytes());
        let checksum = crc32fast::hash(&bytes[0..43]);
        bytes[43..47].copy_from_slice(&checksum.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            storage.load(&model_id, 3),
            Err(VectorStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_set_aside_and_restore() {
        let (storage, tmp) = storage();
        let model_a = model_id_hash("model-a");
        let mut index = VectorIndex::new(3);
        index.insert(memory("a", vec![1.0, 0.0, 0.0])).unwrap();
        storage.save(&index, &model_a).unwrap();

        let backup = storage.set_aside(&model_a).unwrap();
        assert_eq!(backup, backup_file_name(&model_a));
        assert!(!storage.exists());
        assert!(tmp.path().join(&backup).exists());

        assert!(!storage.restore(&model_id_hash("model-b")).unwrap());
        assert!(storage.restore(&model_a).unwrap());
        assert_eq!(storage.load(&model_a, 3).unwrap().len(), 1);
    }
}
