//! Pinecone data-plane client.
//!
//! Uses the REST API directly:
//! - `POST {host}/vectors/upsert`
//! - `POST {host}/query`
//! - `POST {host}/vectors/delete`
//!
//! The index host is either configured or resolved once through the control plane.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::memory::{Match, MemoryMetadata, StoredMemory};

use super::{StoreError, VectorStore};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

pub struct PineconeStore {
    client: Client,
    control_plane: String,
    index_name: String,
    namespace: Option<String>,
    api_key: Option<String>,
    api_key_env: String,
    host: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a MemoryMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    delete_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

impl PineconeStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            control_plane: CONTROL_PLANE_URL.to_string(),
            index_name: config.index_name.clone(),
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            api_key_env: config.api_key_env.clone(),
            host: RwLock::new(config.index_host.as_deref().map(normalize_host)),
        })
    }

    /// Point host resolution at a different control plane.
    pub fn with_control_plane(mut self, url: &str) -> Self {
        self.control_plane = url.trim_end_matches('/').to_string();
        self
    }

    /// Inline key first, then the environment. Read on every call so a key
    /// exported after startup is picked up.
    fn api_key(&self) -> Result<String, StoreError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }

        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(StoreError::NotConfigured(format!(
                "set {} or store.api_key",
                self.api_key_env
            ))),
        }
    }

    fn host(&self, api_key: &str) -> Result<String, StoreError> {
        if let Ok(guard) = self.host.read() {
            if let Some(host) = guard.as_ref() {
                return Ok(host.clone());
            }
        }

        let url = format!("{}/indexes/{}", self.control_plane, self.index_name);
        log::info!("resolving pinecone host for index '{}'", self.index_name);

        let resp = self.authorized(self.client.get(&url), api_key).send()?;
        let described: DescribeIndexResponse = parse_json(resp)?;
        let host = normalize_host(&described.host);

        if let Ok(mut guard) = self.host.write() {
            *guard = Some(host.clone());
        }

        Ok(host)
    }

    fn authorized(&self, builder: RequestBuilder, api_key: &str) -> RequestBuilder {
        builder
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::blocking::Response, StoreError> {
        let api_key = self.api_key()?;
        let host = self.host(&api_key)?;
        let url = format!("{host}{path}");

        log::debug!("pinecone: POST {path}");
        let resp = self
            .authorized(self.client.post(&url), &api_key)
            .json(body)
            .send()?;

        check_status(resp)
    }
}

impl VectorStore for PineconeStore {
    fn check_configured(&self) -> Result<(), StoreError> {
        self.api_key().map(|_| ())
    }

    fn upsert(&self, memory: &StoredMemory) -> Result<(), StoreError> {
        let body = UpsertRequest {
            vectors: vec![UpsertVector {
                id: &memory.id,
                values: &memory.vector,
                metadata: &memory.metadata,
            }],
            namespace: self.namespace.as_deref(),
        };

        self.post("/vectors/upsert", &body)?;
        Ok(())
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };

        let resp = self.post("/query", &body)?;
        let parsed: QueryResponse = parse_json(resp)?;
        Ok(parsed.matches)
    }

    fn delete(&self, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let body = DeleteRequest {
            ids: Some(ids),
            delete_all: false,
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/delete", &body)?;
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        let body = DeleteRequest {
            ids: None,
            delete_all: true,
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/delete", &body)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pinecone"
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn check_status(
    resp: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().unwrap_or_default();
    log::warn!("pinecone returned {status}: {body}");
    Err(StoreError::Status { status, body })
}

fn parse_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::blocking::Response,
) -> Result<T, StoreError> {
    let resp = check_status(resp)?;
    let bytes = resp.bytes()?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed(e.to_string()))
}
