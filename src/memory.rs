use serde::{Deserialize, Serialize};

use crate::app::AppError;
use crate::enrich::is_youtube_url;

/// Length of the enriched-content preview returned from ingest.
pub const PREVIEW_CHARS: usize = 200;

/// A snippet of browsing activity as sent by the extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub title: String,
    pub url: String,
    pub content: String,
    /// ISO-8601 timestamp with offset, e.g. `2024-01-01T00:00:00Z`
    pub timestamp: String,
}

impl ActivityRecord {
    /// Reject records the pipeline cannot store meaningfully.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.url.trim().is_empty() {
            return Err(AppError::InvalidRequest("url must not be empty".into()));
        }

        if chrono::DateTime::parse_from_rfc3339(self.timestamp.trim()).is_err() {
            return Err(AppError::InvalidRequest(format!(
                "timestamp {:?} is not an ISO-8601 date-time",
                self.timestamp
            )));
        }

        Ok(())
    }
}

/// Descriptive fields stored next to every vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Enriched content, capped to the configured length
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

/// A memory as it lives in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMemory {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: MemoryMetadata,
}

/// A single similarity-query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

/// Recall result in the shape the UI consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalledMemory {
    pub content: String,
    pub title: String,
    pub url: String,
    pub time: String,
    pub score: f32,
}

impl From<Match> for RecalledMemory {
    fn from(m: Match) -> Self {
        Self {
            content: m.metadata.content,
            title: m.metadata.title,
            url: m.metadata.url,
            time: m.metadata.timestamp,
            score: m.score,
        }
    }
}

/// Coarse display hint derived from the stored url.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Youtube,
    Other,
}

impl Platform {
    pub fn from_url(url: &str) -> Self {
        if is_youtube_url(url) {
            Platform::Youtube
        } else {
            Platform::Other
        }
    }
}

/// An entry returned from bulk listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedMemory {
    pub id: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub time: String,
    pub platform: Platform,
}

impl From<Match> for ListedMemory {
    fn from(m: Match) -> Self {
        let platform = Platform::from_url(&m.metadata.url);
        Self {
            id: m.id,
            title: m.metadata.title,
            url: m.metadata.url,
            content: m.metadata.content,
            time: m.metadata.timestamp,
            platform,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub ids: Option<Vec<String>>,

    /// Wipes the whole store; wins over `ids`
    #[serde(default)]
    pub delete_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    DeletedAll,
    Deleted { count: usize },
    Noop,
}

impl DeleteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteStatus::DeletedAll => "deleted_all",
            DeleteStatus::Deleted { .. } => "deleted",
            DeleteStatus::Noop => "noop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub status: String,
    pub id: String,
    pub content_preview: String,
}

/// Cut `text` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
