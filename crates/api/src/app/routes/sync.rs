use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::app::errors;
use crate::app::services::AppServices;

/// `POST /sync`: run one full pass and return its summary.
///
/// Overlapping requests run concurrently but share the single dispatch lane.
/// The closing drain is lane-wide, so a run that overlaps another returns only
/// after the other run's in-flight tasks have finished too. Counters stay per run.
pub async fn run_sync(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.runner.run().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => errors::sync_error_to_response(err),
    }
}

/// `GET /status`: dispatch lane diagnostics.
pub async fn status(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let dispatcher = services.dispatcher();
    Json(json!({
        "lane": dispatcher.config().name,
        "pending": dispatcher.pending(),
        "stats": services.dispatcher_stats(),
    }))
}
