//! Defines routes for the file vault API.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST   /upload` — multipart upload (`file` part + `note` display name)
//!   - `GET    /files` — list all indexed files
//!   - `DELETE /files/{key}` — delete a blob by storage key
//!
//! - **Operational endpoints**
//!   - `GET /metrics` — Prometheus text exposition
//!   - `GET /healthz` — liveness
//!   - `GET /readyz`  — readiness (staging-directory I/O)
//!
//! Anything else falls through to the static file server for the public
//! directory (the upload UI).

use crate::{
    handlers::{
        file_handlers::{delete_file, list_files, upload_file},
        health_handlers::{healthz, readyz},
        metrics_handlers::metrics,
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::path::Path;
use tower_http::services::ServeDir;

/// Build and return the router for the whole HTTP surface.
///
/// The router carries shared state (`AppState`) to all handlers; static
/// assets under `public_dir` are served as the fallback.
pub fn routes(public_dir: &Path) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // file endpoints
        .route("/upload", post(upload_file))
        .route("/files", get(list_files))
        .route("/files/{key}", delete(delete_file))
        // metrics scrape endpoint
        .route("/metrics", get(metrics))
        .fallback_service(ServeDir::new(public_dir))
}
