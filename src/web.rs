use crate::{
    app::{AppError, Health, MemoryService},
    memory::{ActivityRecord, DeleteRequest, DeleteStatus, IngestReceipt, ListedMemory, RecalledMemory},
};
use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct SharedState {
    service: Arc<MemoryService>,
}

pub fn router(service: Arc<MemoryService>) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .route("/", get(health))
        .route("/ingest", post(ingest))
        .route("/recall", post(recall))
        .route("/memories", get(list))
        .route("/delete", post(delete))
        // the browser extension calls from its own origin
        .layer(CorsLayer::permissive())
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(service: Arc<MemoryService>, bind: &str) -> anyhow::Result<()> {
    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                log::error!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        };

        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    log::error!("failed to install signal handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        log::warn!("shutting down");
    }

    let app = router(service);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    log::info!("listening on {bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

/// Serve until Ctrl-C / SIGTERM.
pub fn start_daemon(service: MemoryService, bind: &str) -> anyhow::Result<()> {
    // The last handle is dropped outside the runtime; blocking HTTP clients
    // inside the service cannot be dropped from async context.
    let service = Arc::new(service);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(start_app(service.clone(), bind))?;

    drop(service);
    Ok(())
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => {
                log::warn!("{}", self.0);
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Store(_) => {
                log::error!("{self:?}");
                StatusCode::BAD_GATEWAY
            }
            AppError::Embedding(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<Health> {
    Json(state.service.health())
}

async fn ingest(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ActivityRecord>,
) -> Result<Json<IngestReceipt>, HttpError> {
    log::debug!("ingest: {} ({} chars)", payload.url, payload.content.len());
    let service = state.service.clone();

    tokio::task::block_in_place(move || service.ingest(payload))
        .map(Json)
        .map_err(Into::into)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecallRequest {
    pub text: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecallResponse {
    pub memories: Vec<RecalledMemory>,
}

async fn recall(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RecallRequest>,
) -> Result<Json<RecallResponse>, HttpError> {
    let service = state.service.clone();

    let memories =
        tokio::task::block_in_place(move || service.recall(&payload.text, payload.top_k))?;
    Ok(Json(RecallResponse { memories }))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListResponse {
    pub memories: Vec<ListedMemory>,
}

async fn list(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, HttpError> {
    let service = state.service.clone();

    let memories = tokio::task::block_in_place(move || service.list_all(params.limit))?;
    Ok(Json(ListResponse { memories }))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeleteResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
}

impl From<DeleteStatus> for DeleteResponse {
    fn from(status: DeleteStatus) -> Self {
        let deleted = match status {
            DeleteStatus::Deleted { count } => Some(count),
            _ => None,
        };
        Self {
            status: status.as_str().to_string(),
            deleted,
        }
    }
}

async fn delete(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, HttpError> {
    log::debug!("delete: {payload:?}");
    let service = state.service.clone();

    let status = tokio::task::block_in_place(move || service.delete(payload))?;
    Ok(Json(status.into()))
}
