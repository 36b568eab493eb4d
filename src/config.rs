use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::storage::{self, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_BIND: &str = "0.0.0.0:8000";

const DEFAULT_EMBEDDING_MODEL: &str = crate::semantic::DEFAULT_MODEL;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_INPUT_CHARS: usize = 4000;

const DEFAULT_INDEX_NAME: &str = "sentinel-memory";
const DEFAULT_API_KEY_ENV: &str = "PINECONE_API_KEY";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 15;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FETCH_RETRIES: u8 = 1;
const DEFAULT_TRANSCRIPT_BUDGET: usize = 2000;
const DEFAULT_YOUTUBE_MIN_CONTENT: usize = 100;
const DEFAULT_SOCIAL_MIN_CONTENT: usize = 50;

/// Canonical cap for the content snippet kept in metadata
const DEFAULT_CONTENT_CAP: usize = 2000;
const DEFAULT_RECALL_TOP_K: usize = 5;
const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address. The `PORT` env variable overrides the port.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Timeout in seconds for loading the model, including the first-use download
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Input longer than this (in characters) is truncated before embedding
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Hosted Pinecone index
    #[default]
    Pinecone,
    /// In-process index persisted to `vectors.bin`
    Local,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Pinecone index name, used to resolve the host when `index_host` is unset
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Data-plane host, e.g. `https://sentinel-memory-abc123.svc.pinecone.io`
    #[serde(default)]
    pub index_host: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Inline credential. Prefer the environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the credential
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            index_name: default_index_name(),
            index_host: None,
            namespace: None,
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Allow outbound calls to transcript/metadata sources
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-request timeout for every external call
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts on transient failures (timeouts, 5xx, 429)
    #[serde(default = "default_fetch_retries")]
    pub retries: u8,

    /// Transcript characters kept in the enriched text
    #[serde(default = "default_transcript_budget")]
    pub transcript_budget: usize,

    /// Caller content at least this long beats the title/url stub for videos
    #[serde(default = "default_youtube_min_content")]
    pub youtube_min_content: usize,

    /// Caller content at least this long skips the social scrape
    #[serde(default = "default_social_min_content")]
    pub social_min_content: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            retries: DEFAULT_FETCH_RETRIES,
            transcript_budget: DEFAULT_TRANSCRIPT_BUDGET,
            youtube_min_content: DEFAULT_YOUTUBE_MIN_CONTENT,
            social_min_content: DEFAULT_SOCIAL_MIN_CONTENT,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum characters of enriched content stored in metadata
    #[serde(default = "default_content_cap")]
    pub content_cap: usize,

    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: usize,

    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            content_cap: DEFAULT_CONTENT_CAP,
            recall_top_k: DEFAULT_RECALL_TOP_K,
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_store_timeout_secs() -> u64 {
    DEFAULT_STORE_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_fetch_retries() -> u8 {
    DEFAULT_FETCH_RETRIES
}

fn default_transcript_budget() -> usize {
    DEFAULT_TRANSCRIPT_BUDGET
}

fn default_youtube_min_content() -> usize {
    DEFAULT_YOUTUBE_MIN_CONTENT
}

fn default_social_min_content() -> usize {
    DEFAULT_SOCIAL_MIN_CONTENT
}

fn default_content_cap() -> usize {
    DEFAULT_CONTENT_CAP
}

fn default_recall_top_k() -> usize {
    DEFAULT_RECALL_TOP_K
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.download_timeout_secs == 0 {
            bail!("embedding.download_timeout_secs must be greater than 0");
        }
        if self.embedding.max_input_chars == 0 {
            bail!("embedding.max_input_chars must be greater than 0");
        }

        if self.store.timeout_secs == 0 {
            bail!("store.timeout_secs must be greater than 0");
        }
        if self.store.backend == StoreBackend::Pinecone
            && self.store.index_host.is_none()
            && self.store.index_name.trim().is_empty()
        {
            bail!("store.index_name or store.index_host is required for the pinecone backend");
        }

        if self.enrichment.timeout_secs == 0 {
            bail!("enrichment.timeout_secs must be greater than 0");
        }

        let mem = &self.memory;
        if mem.content_cap == 0 {
            bail!("memory.content_cap must be greater than 0");
        }
        if !(1..=crate::app::MAX_TOP_K).contains(&mem.recall_top_k) {
            bail!(
                "memory.recall_top_k must be between 1 and {}, got {}",
                crate::app::MAX_TOP_K,
                mem.recall_top_k
            );
        }
        if !(1..=crate::app::MAX_LIST_LIMIT).contains(&mem.list_limit) {
            bail!(
                "memory.list_limit must be between 1 and {}, got {}",
                crate::app::MAX_LIST_LIMIT,
                mem.list_limit
            );
        }

        Ok(())
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Listen address with the `PORT` override applied.
    pub fn bind_addr(&self) -> String {
        match std::env::var("PORT") {
            Ok(port) if !port.trim().is_empty() => {
                let host = self
                    .server
                    .bind
                    .rsplit_once(':')
                    .map(|(host, _)| host)
                    .unwrap_or("0.0.0.0");
                format!("{host}:{}", port.trim())
            }
            _ => self.server.bind.clone(),
        }
    }
}
