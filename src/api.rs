use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::ToSocketAddrs;

use crate::host;
use crate::netns::ProcfsResolver;
use crate::stats::Accumulator;

/// Upper bound for a single stats stream upload.
const MAX_STREAM_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, serde::Deserialize)]
pub struct CollectParams {
    /// Number of samples to read from the request body.
    pub count: usize,
    /// Process id whose network namespace is used for interface counters.
    pub pid: u32,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct MemoryCapacity {
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct AppState {
    accumulator: Arc<Accumulator<ProcfsResolver>>,
    proc_root: PathBuf,
}

impl AppState {
    pub fn new(accumulator: Accumulator<ProcfsResolver>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            accumulator: Arc::new(accumulator),
            proc_root: proc_root.into(),
        }
    }
}

/// Normalizes the newline-delimited stats stream in the request body into a series.
async fn collect_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<CollectParams>,
    body: Bytes,
) -> Response {
    let accumulator = Arc::clone(&state.accumulator);
    let container_id = id.clone();
    let result = tokio::task::spawn_blocking(move || {
        accumulator.collect(body.as_ref(), params.count, container_id, params.pid)
    })
    .await;

    match result {
        Ok(Ok(series)) => (StatusCode::OK, Json(series)).into_response(),
        Ok(Err(err)) if err.is_configuration_fault() => {
            log::debug!("Rejected stats request for container {}: {}", id, err);
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Ok(Err(err)) => {
            log::warn!("Failed to collect stats for container {}: {}", id, err);
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response()
        }
        Err(err) => {
            log::error!("Stats collection task for container {} failed: {}", id, err);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to collect stats").into_response()
        }
    }
}

async fn memory_capacity(State(state): State<AppState>) -> Response {
    match host::memory_capacity(&state.proc_root) {
        Ok(total_bytes) => (StatusCode::OK, Json(MemoryCapacity { total_bytes })).into_response(),
        Err(err) => {
            log::error!("Failed to query memory capacity: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to query memory capacity",
            )
                .into_response()
        }
    }
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(state: AppState) -> Self {
        let router = axum::Router::new()
            .route("/containers/{id}/stats", post(collect_stats))
            .route("/host/memory", get(memory_capacity))
            .layer(DefaultBodyLimit::max(MAX_STREAM_BYTES))
            .with_state(state);
        Self { router }
    }

    pub fn into_router(self) -> axum::Router {
        self.router
    }

    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router.into_make_service()).await
    }
}
