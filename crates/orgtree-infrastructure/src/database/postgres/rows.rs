//! Internal row types for SQLx mapping

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use orgtree_core::domain::{
    CrmRole, Group, GroupStatus, GroupSyncState, GroupType, Person, PersonStatus, Tenant,
};

pub(super) const TENANT_COLUMNS: &str =
    "id, name, group_sync_state, crm_roles_synced_at, created_at, updated_at";

pub(super) const GROUP_COLUMNS: &str = r#"
    tenant_id, id, name, type AS group_type, status,
    role_ids, crm_role_ids, parent_id, path, "order" AS sort_order,
    sync_filter, opportunity_filter,
    created_at, created_by, updated_at, updated_by
"#;

pub(super) const PERSON_COLUMNS: &str = r#"
    tenant_id, id, first_name, last_name, email,
    group_id, role_ids, crm_role_ids, type AS person_type,
    is_provisioned, is_synced, status, created_at, updated_at
"#;

pub(super) const CRM_ROLE_COLUMNS: &str = "tenant_id, id, name, parent_id, updated_at";

#[derive(Debug, FromRow)]
pub(super) struct TenantRow {
    pub id: Uuid,
    pub name: String,
    pub group_sync_state: String,
    pub crm_roles_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            name: row.name,
            group_sync_state: GroupSyncState::from_str(&row.group_sync_state).unwrap_or_default(),
            crm_roles_synced_at: row.crm_roles_synced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct GroupRow {
    pub tenant_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub group_type: String,
    pub status: String,
    pub role_ids: Vec<Uuid>,
    pub crm_role_ids: Vec<String>,
    pub parent_id: Option<Uuid>,
    pub path: String,
    pub sort_order: i32,
    pub sync_filter: Option<serde_json::Value>,
    pub opportunity_filter: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            group_type: GroupType::from_str(&row.group_type).unwrap_or_default(),
            status: GroupStatus::from_str(&row.status).unwrap_or_default(),
            role_ids: row.role_ids,
            crm_role_ids: row.crm_role_ids,
            parent_id: row.parent_id,
            path: row.path,
            order: row.sort_order,
            sync_filter: row.sync_filter,
            opportunity_filter: row.opportunity_filter,
            created_at: row.created_at,
            created_by: row.created_by,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct PersonRow {
    pub tenant_id: Uuid,
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub group_id: Option<Uuid>,
    pub role_ids: Vec<Uuid>,
    pub crm_role_ids: Vec<String>,
    pub person_type: String,
    pub is_provisioned: bool,
    pub is_synced: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Person {
            id: row.id,
            tenant_id: row.tenant_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            group_id: row.group_id,
            role_ids: row.role_ids,
            crm_role_ids: row.crm_role_ids,
            person_type: GroupType::from_str(&row.person_type).unwrap_or_default(),
            is_provisioned: row.is_provisioned,
            is_synced: row.is_synced,
            status: PersonStatus::from_str(&row.status).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct CrmRoleRow {
    pub tenant_id: Uuid,
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<CrmRoleRow> for CrmRole {
    fn from(row: CrmRoleRow) -> Self {
        CrmRole {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            parent_id: row.parent_id,
            updated_at: row.updated_at,
        }
    }
}
