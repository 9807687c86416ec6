// ============================================================================
// OrgTree API - Group Handlers
// File: crates/orgtree-api/src/handlers/groups.rs
// ============================================================================

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use orgtree_core::domain::{Group, GroupPatch, NewGroup};
use orgtree_core::repositories::HierarchyStore;
use orgtree_core::services::{DeleteResult, WriteOutcome};

use super::actor_from_headers;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// POST /api/v1/tenants/{tenant_id}/groups
pub async fn create_group<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<NewGroup>,
) -> Result<(StatusCode, Json<ApiResponse<WriteOutcome<Group>>>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let outcome = state.service.create_group(tenant_id, actor, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

/// PATCH /api/v1/tenants/{tenant_id}/groups/{group_id}
pub async fn update_group<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path((tenant_id, group_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(patch): Json<GroupPatch>,
) -> Result<Json<ApiResponse<WriteOutcome<Group>>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let outcome = state.service.update_group(tenant_id, actor, group_id, patch).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// DELETE /api/v1/tenants/{tenant_id}/groups/{group_id}
pub async fn delete_group<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path((tenant_id, group_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<WriteOutcome<DeleteResult>>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let outcome = state.service.delete_group_by_id(tenant_id, actor, group_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
