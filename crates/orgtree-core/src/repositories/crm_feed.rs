//! CRM role feed (port)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::CrmRole;
use crate::error::DomainError;

/// One page of changed roles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmRolePage {
    pub roles: Vec<CrmRole>,
    pub total: u64,
    /// More pages follow while this is set
    pub next_page_token: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrmRoleFeed: Send + Sync {
    async fn get_latest_changed_roles(
        &self,
        tenant_id: Uuid,
        since: Option<DateTime<Utc>>,
        page_token: Option<String>,
    ) -> Result<CrmRolePage, DomainError>;
}
