use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use orgtree_core::repositories::HierarchyStore;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

/// GET /health
pub async fn health_check<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            service: state.app.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
