//! Permission cache invalidation (port)
//!
//! Not transactional with the hierarchy store: callers invalidate only after
//! a successful commit.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionCache: Send + Sync {
    async fn invalidate(&self, tenant_id: Uuid, user_id: Uuid) -> Result<(), DomainError>;
    async fn invalidate_many(&self, tenant_id: Uuid, user_ids: &[Uuid]) -> Result<(), DomainError>;
}
