//! Hierarchy store traits (port)
//!
//! Writes always go through a [`HierarchyTx`]; every engine stage of one
//! logical operation shares the same transaction so later stages see earlier
//! stages' uncommitted writes. Dropping a transaction without committing
//! discards it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{CrmRole, Group, GroupSyncState, GroupType, GroupWithMembers, Person, Tenant};
use crate::error::DomainError;

/// Flat subtree lookup by materialized path containment
#[derive(Debug, Clone)]
pub struct SubtreeQuery {
    pub tenant_id: Uuid,
    /// Groups to start from; the tenant's root groups when empty
    pub root_group_ids: Vec<Uuid>,
    /// Hops below each root; unlimited when `None`
    pub max_depth: Option<u32>,
    pub active_only: bool,
}

#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Opens a write transaction scoped to one tenant.
    async fn begin(&self, tenant_id: Uuid) -> Result<Box<dyn HierarchyTx>, DomainError>;

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, DomainError>;
    async fn fetch_subtree(&self, query: &SubtreeQuery) -> Result<Vec<GroupWithMembers>, DomainError>;
    async fn find_people_by_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Person>, DomainError>;
    async fn find_crm_roles_by_ids(&self, tenant_id: Uuid, ids: &[String]) -> Result<Vec<CrmRole>, DomainError>;
}

#[async_trait]
pub trait HierarchyTx: Send {
    // Tenants
    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, DomainError>;
    async fn set_group_sync_state(&mut self, tenant_id: Uuid, state: GroupSyncState) -> Result<(), DomainError>;
    async fn mark_crm_roles_synced(&mut self, tenant_id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError>;

    // Groups
    /// Every group of the tenant, active and inactive.
    async fn list_groups(&mut self, tenant_id: Uuid) -> Result<Vec<Group>, DomainError>;
    async fn find_group(&mut self, tenant_id: Uuid, group_id: Uuid) -> Result<Option<Group>, DomainError>;
    /// Inserts or replaces on `(tenant_id, id)`.
    async fn upsert_group(&mut self, group: &Group) -> Result<(), DomainError>;
    async fn update_group_paths(&mut self, tenant_id: Uuid, updates: &[(Uuid, String)]) -> Result<(), DomainError>;
    async fn update_group_types(&mut self, tenant_id: Uuid, updates: &[(Uuid, GroupType)]) -> Result<(), DomainError>;
    /// Hard delete of every group; only used by a hierarchy reset.
    async fn delete_all_groups(&mut self, tenant_id: Uuid) -> Result<u64, DomainError>;

    // People
    async fn list_people(&mut self, tenant_id: Uuid) -> Result<Vec<Person>, DomainError>;
    async fn update_person_groups(&mut self, tenant_id: Uuid, updates: &[(Uuid, Option<Uuid>)]) -> Result<(), DomainError>;
    async fn update_person_types(&mut self, tenant_id: Uuid, updates: &[(Uuid, GroupType)]) -> Result<(), DomainError>;
    /// Unsets every person's group; returns the people that had one.
    async fn clear_person_groups(&mut self, tenant_id: Uuid) -> Result<Vec<Uuid>, DomainError>;

    // CRM roles
    async fn list_crm_roles(&mut self, tenant_id: Uuid) -> Result<Vec<CrmRole>, DomainError>;
    async fn upsert_crm_roles(&mut self, roles: &[CrmRole]) -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
