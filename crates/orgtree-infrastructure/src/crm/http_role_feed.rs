// ============================================================================
// OrgTree Infrastructure - HTTP CRM Role Feed
// File: crates/orgtree-infrastructure/src/crm/http_role_feed.rs
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use orgtree_core::domain::CrmRole;
use orgtree_core::error::DomainError;
use orgtree_core::repositories::{CrmRoleFeed, CrmRolePage};
use orgtree_shared::config::CrmSettings;

#[derive(Debug, Deserialize)]
struct RoleChangesResponse {
    #[serde(default)]
    roles: Vec<RoleEntry>,
    #[serde(default)]
    total: u64,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    id: String,
    name: String,
    parent_id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl RoleChangesResponse {
    fn into_page(self, tenant_id: Uuid) -> CrmRolePage {
        let roles = self
            .roles
            .into_iter()
            .map(|entry| {
                let mut role = CrmRole::new(tenant_id, entry.id, entry.name, entry.parent_id);
                if let Some(updated_at) = entry.updated_at {
                    role.updated_at = updated_at;
                }
                role
            })
            .collect();
        CrmRolePage {
            roles,
            total: self.total,
            next_page_token: self.next_page_token.filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct HttpCrmRoleFeed {
    client: Client,
    base_url: String,
    page_size: u32,
}

impl HttpCrmRoleFeed {
    pub fn new(settings: &CrmSettings) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            page_size: settings.page_size,
        }
    }

    fn changes_url(
        &self,
        tenant_id: Uuid,
        since: Option<DateTime<Utc>>,
        page_token: Option<&str>,
    ) -> Result<Url, DomainError> {
        let mut params = vec![("page_size", self.page_size.to_string())];
        if let Some(since) = since {
            params.push(("since", since.to_rfc3339()));
        }
        if let Some(token) = page_token {
            params.push(("page_token", token.to_string()));
        }
        let base = format!("{}/tenants/{}/roles/changes", self.base_url, tenant_id);
        Url::parse_with_params(&base, &params)
            .map_err(|e| DomainError::CrmFeedError(format!("invalid feed url {}: {}", base, e)))
    }
}

#[async_trait]
impl CrmRoleFeed for HttpCrmRoleFeed {
    async fn get_latest_changed_roles(
        &self,
        tenant_id: Uuid,
        since: Option<DateTime<Utc>>,
        page_token: Option<String>,
    ) -> Result<CrmRolePage, DomainError> {
        let url = self.changes_url(tenant_id, since, page_token.as_deref())?;
        debug!("Fetching CRM role changes: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            error!("CRM feed request failed for tenant {}: {}", tenant_id, e);
            DomainError::CrmFeedError(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("CRM feed error for tenant {} ({}): {}", tenant_id, status, body);
            return Err(DomainError::CrmFeedError(format!("CRM feed returned {}: {}", status, body)));
        }

        let body: RoleChangesResponse = response.json().await.map_err(|e| {
            error!("Failed to parse CRM feed response: {}", e);
            DomainError::CrmFeedError(e.to_string())
        })?;
        Ok(body.into_page(tenant_id))
    }
}
