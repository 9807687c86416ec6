//! Domain errors

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DomainError {
    // Validation (client-caused, rejected before a transaction opens)
    #[error("Invalid tenant id")]
    InvalidTenantId,

    #[error("Validation error: {0}")]
    ValidationError(String),

    // Conflicts (client-caused, rejected before commit)
    #[error("CRM roles {crm_role_ids:?} already linked to active group {group_id}")]
    DuplicateCrmRoles { crm_role_ids: Vec<String>, group_id: Uuid },

    #[error("Group {0} cannot be its own parent")]
    SelfParent(Uuid),

    #[error("Moving group {group_id} under {parent_id} would create a cycle")]
    ParentCycle { group_id: Uuid, parent_id: Uuid },

    // Lookups
    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Group not found: {0}")]
    GroupNotFound(Uuid),

    #[error("Parent group not found: {0}")]
    ParentNotFound(Uuid),

    // Consistency
    #[error("Groups unreachable from any root (parent cycle): {0:?}")]
    HierarchyCycle(Vec<Uuid>),

    // Storage and collaborators
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("CRM feed error: {0}")]
    CrmFeedError(String),

    #[error("Permission cache error: {0}")]
    CacheError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("{op} failed for tenant {tenant_id}: {source}")]
    Operation {
        op: &'static str,
        tenant_id: Uuid,
        #[source]
        source: Box<DomainError>,
    },
}

impl DomainError {
    /// Wraps the error with the operation name and tenant. Already wrapped
    /// errors are returned unchanged.
    pub fn context(self, op: &'static str, tenant_id: Uuid) -> Self {
        match self {
            DomainError::Operation { .. } => self,
            other => DomainError::Operation {
                op,
                tenant_id,
                source: Box::new(other),
            },
        }
    }

    /// The error with any operation context removed.
    pub fn root(&self) -> &DomainError {
        match self {
            DomainError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self.root(),
            DomainError::InvalidTenantId | DomainError::ValidationError(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self.root(),
            DomainError::DuplicateCrmRoles { .. }
                | DomainError::SelfParent(_)
                | DomainError::ParentCycle { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            DomainError::TenantNotFound(_)
                | DomainError::GroupNotFound(_)
                | DomainError::ParentNotFound(_)
        )
    }

    /// Client-caused errors; everything else is the server's fault.
    pub fn is_client_error(&self) -> bool {
        self.is_validation() || self.is_conflict() || self.is_not_found()
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::ValidationError(errors.to_string())
    }
}
