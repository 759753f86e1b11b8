//! Prometheus scrape endpoint.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

/// `GET /metrics` — render every registered metric in the text exposition
/// format for a pull-based scraper.
pub async fn metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let text = state.metrics.render().map_err(|err| {
        tracing::error!("failed to render metrics: {}", err);
        AppError::internal("Failed to render metrics.")
    })?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response())
}
