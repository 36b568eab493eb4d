use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::{AppError, MAX_LIST_LIMIT, MAX_TOP_K};
use crate::config::MemoryConfig;
use crate::enrich::Dispatcher;
use crate::memory::{
    truncate_chars, ActivityRecord, DeleteRequest, DeleteStatus, IngestReceipt, ListedMemory,
    MemoryMetadata, RecalledMemory, StoredMemory, PREVIEW_CHARS,
};
use crate::semantic::EmbeddingAdapter;
use crate::store::VectorStore;

pub const HEALTH_MESSAGE: &str = "Sentinel memory service is online";

/// Component value of the listing probe. Small but non-zero so cosine backends accept it.
const LIST_PROBE_VALUE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub store: String,
    pub store_configured: bool,
    pub model: String,
    pub dimensions: usize,
}

/// The memory pipeline: enrich, embed, store, recall.
///
/// Holds no lock of its own; concurrent calls share the embedder and store handles.
pub struct MemoryService {
    dispatcher: Dispatcher,
    embedder: EmbeddingAdapter,
    store: Arc<dyn VectorStore>,
    config: MemoryConfig,
}

impl MemoryService {
    pub fn new(
        dispatcher: Dispatcher,
        embedder: EmbeddingAdapter,
        store: Arc<dyn VectorStore>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            dispatcher,
            embedder,
            store,
            config,
        }
    }

    pub fn health(&self) -> Health {
        Health {
            status: HEALTH_MESSAGE.to_string(),
            store: self.store.name().to_string(),
            store_configured: self.store.check_configured().is_ok(),
            model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
        }
    }

    /// Text the record would be stored under, without touching the store.
    pub fn enrich(&self, record: &ActivityRecord) -> String {
        self.dispatcher.enrich(record)
    }

    pub fn ingest(&self, record: ActivityRecord) -> Result<IngestReceipt, AppError> {
        record.validate()?;
        self.store.check_configured()?;

        let enriched = self.dispatcher.enrich(&record);
        let vector = self.embedder.embed(&enriched)?;

        let memory = StoredMemory {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: MemoryMetadata {
                title: record.title,
                url: record.url,
                content: truncate_chars(&enriched, self.config.content_cap).to_string(),
                timestamp: record.timestamp,
            },
        };

        self.store.upsert(&memory)?;

        log::info!(
            "stored memory {} for {} ({} chars)",
            memory.id,
            memory.metadata.url,
            memory.metadata.content.chars().count()
        );

        Ok(IngestReceipt {
            status: "success".to_string(),
            content_preview: truncate_chars(&memory.metadata.content, PREVIEW_CHARS).to_string(),
            id: memory.id,
        })
    }

    /// Nearest memories to `text`, best first. No score threshold is applied.
    pub fn recall(&self, text: &str, top_k: Option<usize>) -> Result<Vec<RecalledMemory>, AppError> {
        let top_k = top_k.unwrap_or(self.config.recall_top_k);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(AppError::InvalidRequest(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }

        self.store.check_configured()?;

        let vector = self.embedder.embed(text)?;
        let matches = self.store.query(&vector, top_k, true)?;
        log::debug!("recall returned {} matches", matches.len());

        Ok(matches.into_iter().map(RecalledMemory::from).collect())
    }

    /// Approximate listing: a similarity query against a uniform probe vector.
    ///
    /// Completeness and order are whatever the index returns for that probe.
    pub fn list_all(&self, limit: Option<usize>) -> Result<Vec<ListedMemory>, AppError> {
        let limit = limit.unwrap_or(self.config.list_limit);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(AppError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}, got {limit}"
            )));
        }

        self.store.check_configured()?;

        let probe = vec![LIST_PROBE_VALUE; self.embedder.dimensions()];
        let matches = self.store.query(&probe, limit, true)?;

        Ok(matches.into_iter().map(ListedMemory::from).collect())
    }

    /// `delete_all` wins over `ids`; an empty request never reaches the store.
    pub fn delete(&self, request: DeleteRequest) -> Result<DeleteStatus, AppError> {
        if request.delete_all {
            self.store.check_configured()?;
            self.store.delete_all()?;
            log::warn!("all memories deleted");
            return Ok(DeleteStatus::DeletedAll);
        }

        let ids: Vec<String> = request
            .ids
            .unwrap_or_default()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        if ids.is_empty() {
            log::debug!("delete request without ids, nothing to do");
            return Ok(DeleteStatus::Noop);
        }

        self.store.check_configured()?;
        self.store.delete(&ids)?;
        log::info!("deleted {} memories", ids.len());

        Ok(DeleteStatus::Deleted { count: ids.len() })
    }
}
