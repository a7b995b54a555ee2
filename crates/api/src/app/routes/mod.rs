use axum::{
    Router,
    routing::{get, post},
};

pub mod sync;
pub mod system;

/// Router for the sync endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/sync", post(sync::run_sync))
        .route("/status", get(sync::status))
}
