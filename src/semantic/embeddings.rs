//! Embedding backends and the adapter the pipeline talks to.
//!
//! - `Embedder`: the seam every backend implements
//! - `EmbeddingModel`: fastembed-backed local model
//! - `EmbeddingAdapter`: deterministic input preparation and output checks

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::semantic::preprocess::prepare_input;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Model loading did not finish within {0:?}")]
    Timeout(Duration),
}

/// Turns text into a fixed-length vector.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Name used to tag persisted vectors.
    fn name(&self) -> &str;
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load the named model, downloading it into `cache_dir/models` on first use.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!(
            "loading embedding model '{}' (timeout {}s)",
            model_name,
            timeout.as_secs()
        );

        let (model, dimensions) = load_with_timeout(timeout, move || {
            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true);

            let mut model = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
            let dimensions = Self::probe_dimensions(&mut model)?;

            Ok((model, dimensions))
        })?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15Q)
            }
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5 (add -q suffix for quantized small models)",
                name
            ))),
        }
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Embedder for EmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Run `load` on its own thread and give up after `timeout`.
///
/// fastembed has no download timeout of its own. A loader that is still running
/// when the timeout fires is left to finish in the background.
fn load_with_timeout<T, F>(timeout: Duration, load: F) -> Result<T, EmbeddingError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EmbeddingError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    std::thread::Builder::new()
        .name("embedding-loader".to_string())
        .spawn(move || {
            let _ = tx.send(load());
        })
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to start model loader: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(EmbeddingError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(EmbeddingError::InitFailed(
            "Model loader exited without a result".to_string(),
        )),
    }
}

/// What the pipeline calls to embed text.
///
/// Input is trimmed and truncated to `max_input_chars` so the same text always
/// maps to the same model input. Blank input never reaches the model: it maps to
/// a fixed unit vector with equal components.
#[derive(Clone)]
pub struct EmbeddingAdapter {
    embedder: Arc<dyn Embedder>,
    max_input_chars: usize,
}

impl EmbeddingAdapter {
    pub fn new(embedder: Arc<dyn Embedder>, max_input_chars: usize) -> Self {
        Self {
            embedder,
            max_input_chars,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let dimensions = self.dimensions();

        let Some(input) = prepare_input(text, self.max_input_chars) else {
            log::debug!("blank embedding input, using sentinel vector");
            return Ok(sentinel_vector(dimensions));
        };

        let vector = self.embedder.embed(input)?;
        if vector.len() != dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                got: vector.len(),
            });
        }

        Ok(vector)
    }
}

/// Unit vector with equal components; stands in for blank text.
pub fn sentinel_vector(dimensions: usize) -> Vec<f32> {
    if dimensions == 0 {
        return Vec::new();
    }
    vec![1.0 / (dimensions as f32).sqrt(); dimensions]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
        dims: usize,
        seen: Mutex<Vec<String>>,
    }

    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            self.dims
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            let mut v = vec![0.0; self.dims];
            v[text.chars().count() % self.dims] = 1.0;
            Ok(v)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    fn counting(dims: usize) -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            calls: Default::default(),
            dims,
            seen: Mutex::new(vec![]),
        })
    }

    #[test]
    fn test_blank_input_uses_sentinel_without_model_call() {
        let inner = counting(8);
        let adapter = EmbeddingAdapter::new(inner.clone(), 100);

        let v = adapter.embed("   \n").unwrap();
        assert_eq!(v.len(), 8);
        assert_eq!(v, sentinel_vector(8));
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_input_truncated_before_model() {
        let inner = counting(8);
        let adapter = EmbeddingAdapter::new(inner.clone(), 5);

        adapter.embed("  abcdefghij  ").unwrap();
        assert_eq!(inner.seen.lock().unwrap().as_slice(), ["abcde"]);
    }

    #[test]
    fn test_same_text_same_vector() {
        let adapter = EmbeddingAdapter::new(counting(16), 100);
        let a = adapter.embed("hello world").unwrap();
        let b = adapter.embed("hello world").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let adapter = EmbeddingAdapter::new(Arc::new(ShortEmbedder), 100);
        assert!(matches!(
            adapter.embed("text"),
            Err(EmbeddingError::DimensionMismatch { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = std::env::temp_dir().join("sentinel-embed-invalid");
        let result = EmbeddingModel::new("nonexistent-model", temp_dir, None);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_load_within_timeout() {
        let loaded = load_with_timeout(Duration::from_secs(5), || Ok(42)).unwrap();
        assert_eq!(loaded, 42);

        let err = load_with_timeout::<(), _>(Duration::from_secs(5), || {
            Err(EmbeddingError::InitFailed("no network".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, EmbeddingError::InitFailed(msg) if msg == "no network"));
    }

    #[test]
    fn test_load_timeout_is_enforced() {
        let started = std::time::Instant::now();
        let err = load_with_timeout(Duration::from_millis(100), || {
            std::thread::sleep(Duration::from_secs(3));
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, EmbeddingError::Timeout(t) if t == Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_loader_panic_is_init_failure() {
        let err = load_with_timeout::<(), _>(Duration::from_secs(5), || panic!("boom")).unwrap_err();
        assert!(matches!(err, EmbeddingError::InitFailed(_)));
    }

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_model_dimensions_and_determinism() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), None)
            .unwrap();
        assert_eq!(model.dimensions(), 384);

        let a = model.embed("Hello, world!").unwrap();
        let b = model.embed("Hello, world!").unwrap();
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
    }
}
