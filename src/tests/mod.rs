//! Scenario tests with deterministic stand-ins for the model, the fetchers and the store.


use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use axum::Router;

use crate::app::MemoryService;
use crate::config::{EnrichmentConfig, MemoryConfig};
use crate::enrich::{Dispatcher, EnrichmentError, MediaFetcher, MediaInfo, TranscriptFetcher};
use crate::memory::{ActivityRecord, Match, StoredMemory};
use crate::semantic::{Embedder, EmbeddingAdapter, EmbeddingError};
use crate::store::{LocalStore, StoreError, VectorStore};

pub const DIMS: usize = 64;

/// Bag-of-words hashed into a fixed number of buckets, L2-normalised.
pub struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        DIMS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % DIMS;
            v[bucket] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            v[0] = 1.0;
            return Ok(v);
        }
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn name(&self) -> &str {
        "hashing-test"
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

pub fn embedder() -> EmbeddingAdapter {
    EmbeddingAdapter::new(Arc::new(HashingEmbedder), 4000)
}

pub struct ScriptedTranscripts {
    result: Result<String, EnrichmentError>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedTranscripts {
    pub fn ok(transcript: &str) -> Self {
        Self {
            result: Ok(transcript.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(EnrichmentError::Terminal("no captions available".into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl TranscriptFetcher for ScriptedTranscripts {
    fn fetch_transcript(&self, video_id: &str) -> Result<String, EnrichmentError> {
        self.calls.lock().unwrap().push(video_id.to_string());
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "scripted-transcripts"
    }
}

pub struct ScriptedMedia {
    result: Result<MediaInfo, EnrichmentError>,
    calls: AtomicUsize,
}

impl ScriptedMedia {
    pub fn ok(info: MediaInfo) -> Self {
        Self {
            result: Ok(info),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(EnrichmentError::Retryable("timed out".into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MediaFetcher for ScriptedMedia {
    fn fetch_media(&self, _url: &str) -> Result<MediaInfo, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "scripted-media"
    }
}

/// In-memory store that remembers what went through it.
pub struct RecordingStore {
    inner: LocalStore,
    configured: bool,
    pub upserts: Mutex<Vec<StoredMemory>>,
    pub calls: AtomicUsize,
}

impl RecordingStore {
    pub fn new(configured: bool) -> Self {
        Self {
            inner: LocalStore::in_memory(DIMS),
            configured,
            upserts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_upsert(&self) -> StoredMemory {
        self.upserts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("nothing was stored")
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl VectorStore for RecordingStore {
    fn check_configured(&self) -> Result<(), StoreError> {
        if self.configured {
            Ok(())
        } else {
            Err(StoreError::NotConfigured("set PINECONE_API_KEY".into()))
        }
    }

    fn upsert(&self, memory: &StoredMemory) -> Result<(), StoreError> {
        self.touch();
        self.upserts.lock().unwrap().push(memory.clone());
        self.inner.upsert(memory)
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError> {
        self.touch();
        self.inner.query(vector, top_k, include_metadata)
    }

    fn delete(&self, ids: &[String]) -> Result<(), StoreError> {
        self.touch();
        self.inner.delete(ids)
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.touch();
        self.inner.delete_all()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct Harness {
    pub service: MemoryService,
    pub store: Arc<RecordingStore>,
    pub transcripts: Arc<ScriptedTranscripts>,
    pub media: Arc<ScriptedMedia>,
}

impl Harness {
    pub fn new(transcripts: ScriptedTranscripts, media: ScriptedMedia) -> Self {
        Self::build(transcripts, media, RecordingStore::new(true))
    }

    /// Fetchers fail and the store is configured.
    pub fn offline() -> Self {
        Self::new(ScriptedTranscripts::failing(), ScriptedMedia::failing())
    }

    pub fn unconfigured() -> Self {
        Self::build(
            ScriptedTranscripts::failing(),
            ScriptedMedia::failing(),
            RecordingStore::new(false),
        )
    }

    fn build(transcripts: ScriptedTranscripts, media: ScriptedMedia, store: RecordingStore) -> Self {
        let transcripts = Arc::new(transcripts);
        let media = Arc::new(media);
        let store = Arc::new(store);

        let dispatcher = Dispatcher::new(
            transcripts.clone(),
            media.clone(),
            EnrichmentConfig::default(),
        );
        let service = MemoryService::new(
            dispatcher,
            embedder(),
            store.clone(),
            MemoryConfig::default(),
        );

        Self {
            service,
            store,
            transcripts,
            media,
        }
    }
}

/// Serve the router built by `app` on a random local port from a background thread.
///
/// The server gets its own runtime so blocking clients can call it from plain tests.
pub fn serve(app: impl FnOnce(SocketAddr) -> Router + Send + 'static) -> SocketAddr {
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tx.send(addr).unwrap();
            axum::serve(listener, app(addr)).await.unwrap();
        });
    });

    rx.recv().unwrap()
}

pub fn record(title: &str, url: &str, content: &str) -> ActivityRecord {
    ActivityRecord {
        title: title.to_string(),
        url: url.to_string(),
        content: content.to_string(),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
    }
}
