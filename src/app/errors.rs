use crate::semantic::EmbeddingError;
use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Store credential or backend missing; the process keeps serving.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotConfigured(msg) => AppError::Configuration(msg),
            other => AppError::Store(other),
        }
    }
}
