use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use homedir::my_home;

use crate::{
    app::MemoryService,
    config::{Config, StoreBackend},
    enrich::{Dispatcher, HttpFetch, SocialMediaFetcher, YouTubeTranscriptFetcher},
    semantic::{model_id_hash, EmbeddingAdapter, EmbeddingModel, VectorStorage},
    storage,
    store::{LocalStore, PineconeStore, VectorStore},
};

/// Wires config, embedder, store and fetchers into a `MemoryService`.
pub struct AppFactory;

impl AppFactory {
    /// Load config from the base path, creating both if needed.
    pub fn load_config() -> Result<Config> {
        let base_path = Self::get_base_path()?;

        std::fs::create_dir_all(&base_path)
            .with_context(|| format!("Failed to create application base directory {base_path}"))?;

        Config::load_with(&base_path)
    }

    /// Build the full pipeline. Blocking HTTP clients are created here, so call
    /// this before entering an async runtime.
    pub fn create_service(config: &Config) -> Result<MemoryService> {
        let embedder = Self::create_embedder(config)?;
        let store = Self::create_store(config, &embedder)?;

        if let Err(e) = store.check_configured() {
            log::warn!("{e}; memory requests will fail until this is fixed");
        }

        let dispatcher = Self::create_dispatcher(config)?;

        log::info!(
            "memory service ready (store={}, model={}, dims={})",
            store.name(),
            embedder.model_name(),
            embedder.dimensions()
        );

        Ok(MemoryService::new(
            dispatcher,
            embedder,
            store,
            config.memory.clone(),
        ))
    }

    /// Enrichment only; no model or store needed.
    pub fn create_dispatcher(config: &Config) -> Result<Dispatcher> {
        let enrichment = config.enrichment.clone();
        if !enrichment.enabled {
            log::info!("enrichment disabled, external sources will not be contacted");
            return Ok(Dispatcher::offline(enrichment));
        }

        let http = HttpFetch::new(&enrichment).context("Failed to build enrichment HTTP client")?;
        Ok(Dispatcher::new(
            Arc::new(YouTubeTranscriptFetcher::new(http.clone())),
            Arc::new(SocialMediaFetcher::new(http)),
            enrichment,
        ))
    }

    fn create_embedder(config: &Config) -> Result<EmbeddingAdapter> {
        let model = EmbeddingModel::new(
            &config.embedding.model,
            PathBuf::from(config.base_path()),
            Some(Duration::from_secs(config.embedding.download_timeout_secs)),
        )
        .context("Failed to load embedding model")?;

        Ok(EmbeddingAdapter::new(
            Arc::new(model),
            config.embedding.max_input_chars,
        ))
    }

    fn create_store(
        config: &Config,
        embedder: &EmbeddingAdapter,
    ) -> Result<Arc<dyn VectorStore>> {
        match config.store.backend {
            StoreBackend::Pinecone => {
                let store =
                    PineconeStore::new(&config.store).context("Failed to build Pinecone client")?;
                Ok(Arc::new(store))
            }
            StoreBackend::Local => {
                let backend = storage::BackendLocal::new(config.base_path())
                    .context("Failed to open local storage")?;
                let store = LocalStore::open(
                    VectorStorage::new(backend),
                    model_id_hash(embedder.model_name()),
                    embedder.dimensions(),
                )
                .context("Failed to open local vector store")?;
                log::info!("local store opened with {} memories", store.len());
                Ok(Arc::new(store))
            }
        }
    }

    /// `SENTINEL_BASE_PATH`, or `~/.local/share/sentinel`.
    fn get_base_path() -> Result<String> {
        if let Ok(base_path) = std::env::var("SENTINEL_BASE_PATH") {
            if !base_path.trim().is_empty() {
                return Ok(base_path);
            }
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(format!("{}/.local/share/sentinel", home.to_string_lossy()))
    }
}
