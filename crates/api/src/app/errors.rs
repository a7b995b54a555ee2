use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use omiesync_infra::{RunSummary, SyncError};

/// A run that could not start dispatching: 500 with the `erro_critico` summary.
pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::RecordFetch(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RunSummary::critical(format!(
                "falha ao buscar registros de origem: {e}"
            ))),
        )
            .into_response(),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
