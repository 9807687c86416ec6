// ============================================================================
// OrgTree API - Hierarchy Handlers
// File: crates/orgtree-api/src/handlers/hierarchy.rs
// ============================================================================
//! Tenant-wide hierarchy operations: CRM sync, import, reset, membership
//! reconciliation and subtree reads.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orgtree_core::domain::{GroupSubtree, SubtreeRequest};
use orgtree_core::repositories::HierarchyStore;
use orgtree_core::services::{
    ImportOutcome, MembershipChange, ResetResult, SyncMode, SyncOutcome, WriteOutcome,
};

use super::actor_from_headers;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub mode: SyncMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportParams {
    pub since: Option<DateTime<Utc>>,
}

/// Query string of a subtree read; `viewable_group_ids` is comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct TreeParams {
    pub root_group_id: Option<Uuid>,
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub hydrate_members: bool,
    #[serde(default)]
    pub hydrate_crm_roles: bool,
    #[serde(default)]
    pub simplify: bool,
    pub active_only: Option<bool>,
    #[serde(default)]
    pub use_manager_names: bool,
    #[serde(default)]
    pub exclude_manager_users: bool,
    pub viewable_group_ids: Option<String>,
}

impl TreeParams {
    pub fn into_request(self, tenant_id: Uuid) -> Result<SubtreeRequest, ApiError> {
        let viewable_group_ids = match self.viewable_group_ids.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    Uuid::parse_str(s)
                        .map_err(|_| ApiError::BadRequest(format!("Invalid viewable group id: {}", s)))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let mut request = SubtreeRequest::new(tenant_id);
        request.root_group_id = self.root_group_id;
        request.max_depth = self.max_depth;
        request.hydrate_members = self.hydrate_members;
        request.hydrate_crm_roles = self.hydrate_crm_roles;
        request.simplify = self.simplify;
        request.active_only = self.active_only.unwrap_or(true);
        request.use_manager_names = self.use_manager_names;
        request.exclude_manager_users = self.exclude_manager_users;
        request.viewable_group_ids = viewable_group_ids;
        Ok(request)
    }
}

#[derive(Debug, Serialize)]
pub struct SyncStateResponse {
    pub crm_synced: bool,
}

/// POST /api/v1/tenants/{tenant_id}/hierarchy/sync
pub async fn sync_groups<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<SyncParams>,
) -> ApiResult<WriteOutcome<SyncOutcome>> {
    let outcome = state.service.sync_groups(tenant_id, params.mode).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/tenants/{tenant_id}/hierarchy/crm-roles/import
pub async fn import_crm_roles<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<ImportParams>,
) -> ApiResult<WriteOutcome<ImportOutcome>> {
    let outcome = state.service.import_crm_roles(tenant_id, params.since).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/tenants/{tenant_id}/hierarchy/reset
pub async fn reset_hierarchy<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<WriteOutcome<ResetResult>> {
    let actor = actor_from_headers(&headers)?;
    let outcome = state.service.reset_hierarchy(tenant_id, actor).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/tenants/{tenant_id}/hierarchy/people/reconcile
pub async fn reconcile_people<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<WriteOutcome<Vec<MembershipChange>>> {
    let outcome = state.service.update_person_groups(tenant_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// GET /api/v1/tenants/{tenant_id}/hierarchy/tree
pub async fn get_tree<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<TreeParams>,
) -> ApiResult<GroupSubtree> {
    let request = params.into_request(tenant_id)?;
    let tree = state.service.get_group_subtree(request).await?;
    Ok(Json(ApiResponse::success(tree)))
}

/// GET /api/v1/tenants/{tenant_id}/hierarchy/sync-state
pub async fn get_sync_state<S: HierarchyStore + 'static>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<SyncStateResponse> {
    let crm_synced = state.service.is_crm_synced(tenant_id).await?;
    Ok(Json(ApiResponse::success(SyncStateResponse { crm_synced })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_params_defaults_to_active_only() {
        let tenant_id = Uuid::new_v4();
        let request = TreeParams::default().into_request(tenant_id).unwrap();
        assert!(request.active_only);
        assert!(request.viewable_group_ids.is_empty());
        assert_eq!(request.tenant_id, tenant_id);
    }

    #[test]
    fn test_tree_params_parses_viewable_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let params = TreeParams {
            viewable_group_ids: Some(format!("{}, {},", a, b)),
            active_only: Some(false),
            ..Default::default()
        };
        let request = params.into_request(Uuid::new_v4()).unwrap();
        assert_eq!(request.viewable_group_ids, vec![a, b]);
        assert!(!request.active_only);
    }

    #[test]
    fn test_tree_params_rejects_bad_viewable_id() {
        let params = TreeParams {
            viewable_group_ids: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.into_request(Uuid::new_v4()), Err(ApiError::BadRequest(_))));
    }
}
