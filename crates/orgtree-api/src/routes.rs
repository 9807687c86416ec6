//! Router assembly

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use orgtree_core::repositories::HierarchyStore;

use crate::handlers::{groups, health, hierarchy};
use crate::state::AppState;

pub fn build_router<S: HierarchyStore + 'static>(state: AppState<S>) -> Router {
    let tenant_routes = Router::new()
        .route("/hierarchy/sync", post(hierarchy::sync_groups::<S>))
        .route("/hierarchy/crm-roles/import", post(hierarchy::import_crm_roles::<S>))
        .route("/hierarchy/reset", post(hierarchy::reset_hierarchy::<S>))
        .route("/hierarchy/people/reconcile", post(hierarchy::reconcile_people::<S>))
        .route("/hierarchy/tree", get(hierarchy::get_tree::<S>))
        .route("/hierarchy/sync-state", get(hierarchy::get_sync_state::<S>))
        .route("/groups", post(groups::create_group::<S>))
        .route(
            "/groups/{group_id}",
            patch(groups::update_group::<S>).delete(groups::delete_group::<S>),
        );

    Router::new()
        .route("/health", get(health::health_check::<S>))
        .nest("/api/v1/tenants/{tenant_id}", tenant_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::{DateTime, Utc};
    use mockall::mock;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use orgtree_core::domain::{CrmRole, Tenant};
    use orgtree_core::error::DomainError;
    use orgtree_core::repositories::{CrmRoleFeed, CrmRolePage, InMemoryHierarchyStore, PermissionCache};
    use orgtree_core::services::HierarchyService;
    use orgtree_shared::config::{AppSettings, EngineSettings};

    mock! {
        Cache {}
        #[async_trait]
        impl PermissionCache for Cache {
            async fn invalidate(&self, tenant_id: Uuid, user_id: Uuid) -> Result<(), DomainError>;
            async fn invalidate_many(&self, tenant_id: Uuid, user_ids: &[Uuid]) -> Result<(), DomainError>;
        }
    }

    mock! {
        Feed {}
        #[async_trait]
        impl CrmRoleFeed for Feed {
            async fn get_latest_changed_roles(
                &self,
                tenant_id: Uuid,
                since: Option<DateTime<Utc>>,
                page_token: Option<String>,
            ) -> Result<CrmRolePage, DomainError>;
        }
    }

    fn app(store: Arc<InMemoryHierarchyStore>) -> Router {
        let mut cache = MockCache::new();
        cache.expect_invalidate_many().returning(|_, _| Ok(()));
        let service = HierarchyService::new(
            store,
            Arc::new(cache),
            Arc::new(MockFeed::new()),
            EngineSettings::default(),
        );
        build_router(AppState {
            service: Arc::new(service),
            app: AppSettings {
                env: "test".to_string(),
                host: "127.0.0.1".to_string(),
                port: 0,
                name: "orgtree-test".to_string(),
            },
        })
    }

    fn seeded() -> (Arc<InMemoryHierarchyStore>, Uuid) {
        let store = Arc::new(InMemoryHierarchyStore::new());
        let tenant_id = Uuid::new_v4();
        store.insert_tenant(Tenant::new(tenant_id, "Acme".to_string()));
        (store, tenant_id)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: String, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-actor-id", Uuid::new_v4().to_string())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (store, _) = seeded();
        let (status, body) = send(
            app(store),
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "orgtree-test");
    }

    #[tokio::test]
    async fn test_create_group_then_read_tree() {
        let (store, tenant_id) = seeded();
        let router = app(store.clone());

        let (status, body) = send(
            router.clone(),
            json_request("POST", format!("/api/v1/tenants/{}/groups", tenant_id), json!({"name": "Sales"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["value"]["name"], "Sales");

        let (status, body) = send(
            router,
            Request::builder()
                .uri(format!("/api/v1/tenants/{}/hierarchy/tree", tenant_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["roots"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["depth"], 1);
    }

    #[tokio::test]
    async fn test_self_parent_is_conflict() {
        let (store, tenant_id) = seeded();
        let router = app(store.clone());
        let (_, created) = send(
            router.clone(),
            json_request("POST", format!("/api/v1/tenants/{}/groups", tenant_id), json!({"name": "Ops"})),
        )
        .await;
        let group_id = created["data"]["value"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            router,
            json_request(
                "PATCH",
                format!("/api/v1/tenants/{}/groups/{}", tenant_id, group_id),
                json!({"parent_id": group_id}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let (store, _) = seeded();
        let (status, body) = send(
            app(store),
            Request::builder()
                .uri(format!("/api/v1/tenants/{}/hierarchy/tree", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_actor_header_is_rejected() {
        let (store, tenant_id) = seeded();
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/tenants/{}/hierarchy/reset", tenant_id))
            .header("x-actor-id", "someone")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app(store), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_group_without_actor_is_rejected() {
        let (store, tenant_id) = seeded();
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/tenants/{}/groups", tenant_id))
            .header("content-type", "application/json")
            .body(Body::from(json!({"name": "Sales"}).to_string()))
            .unwrap();

        let (status, body) = send(app(store.clone()), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(store.groups(tenant_id).is_empty());
    }

    #[tokio::test]
    async fn test_sync_builds_groups_from_roles() {
        let (store, tenant_id) = seeded();
        store.insert_crm_role(CrmRole::new(tenant_id, "A", "Sales", None));
        store.insert_crm_role(CrmRole::new(tenant_id, "B", "Sales East", Some("A".to_string())));

        let (status, body) = send(
            app(store.clone()),
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/tenants/{}/hierarchy/sync", tenant_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["value"]["status"], "synced");
        assert_eq!(body["data"]["value"]["created"], 2);
        assert_eq!(store.groups(tenant_id).len(), 2);
    }
}
