// ============================================================================
// OrgTree Infrastructure - PostgreSQL Hierarchy Store
// File: crates/orgtree-infrastructure/src/database/postgres/hierarchy_store_impl.rs
// ============================================================================
//! Every write transaction takes a transaction-scoped advisory lock on the
//! tenant, so concurrent writers for one tenant are serialized by Postgres
//! as well as by the in-process tenant lock.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use orgtree_core::domain::{
    CrmRole, Group, GroupSyncState, GroupType, GroupWithMembers, Person, Tenant, TreeMember,
};
use orgtree_core::error::DomainError;
use orgtree_core::repositories::{HierarchyStore, HierarchyTx, SubtreeQuery};

use super::rows::{
    CrmRoleRow, GroupRow, PersonRow, TenantRow, CRM_ROLE_COLUMNS, GROUP_COLUMNS, PERSON_COLUMNS,
    TENANT_COLUMNS,
};

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |e: sqlx::Error| {
        error!("Database error {}: {}", context, e);
        DomainError::DatabaseError(e.to_string())
    }
}

/// Advisory lock key of a tenant: the high 64 bits of its id.
pub(crate) fn advisory_lock_key(tenant_id: Uuid) -> i64 {
    let (high, _) = tenant_id.as_u64_pair();
    high as i64
}

/// Keeps the first occurrence of each `(tenant_id, id)`; Postgres rejects an
/// upsert batch that touches the same row twice.
pub(crate) fn distinct_crm_roles(roles: &[CrmRole]) -> Vec<&CrmRole> {
    let mut seen = HashSet::new();
    roles
        .iter()
        .filter(|r| seen.insert((r.tenant_id, r.id.as_str())))
        .collect()
}

/// Depths past this are unlimited in practice; keeps arithmetic on the bound
/// parameter inside INT4.
const MAX_DEPTH_LIMIT: i32 = i32::MAX - 1;

fn depth_limit(max_depth: Option<u32>) -> Option<i32> {
    max_depth.map(|d| i32::try_from(d).unwrap_or(MAX_DEPTH_LIMIT).min(MAX_DEPTH_LIMIT))
}

pub struct PgHierarchyStore {
    pool: PgPool,
}

impl PgHierarchyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_subtree_groups(&self, query: &SubtreeQuery) -> Result<Vec<Group>, DomainError> {
        let rows: Vec<GroupRow> = if query.root_group_ids.is_empty() {
            let sql = format!(
                r#"
                SELECT {GROUP_COLUMNS}
                FROM groups
                WHERE tenant_id = $1
                  AND (NOT $2 OR status = 'active')
                  AND ($3::INT4 IS NULL OR array_length(string_to_array(path, '.'), 1) - 1 <= $3)
                ORDER BY path
                "#
            );
            sqlx::query_as(&sql)
                .bind(query.tenant_id)
                .bind(query.active_only)
                .bind(depth_limit(query.max_depth))
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("fetching tenant tree"))?
        } else {
            let sql = format!(
                r#"
                SELECT {GROUP_COLUMNS}
                FROM groups g
                WHERE g.tenant_id = $1
                  AND (NOT $2 OR g.status = 'active')
                  AND EXISTS (
                      SELECT 1 FROM groups r
                      WHERE r.tenant_id = $1
                        AND r.id = ANY($4)
                        AND (NOT $2 OR r.status = 'active')
                        AND (g.path = r.path OR g.path LIKE r.path || '.%')
                        AND ($3::INT4 IS NULL
                             OR array_length(string_to_array(g.path, '.'), 1)
                                - array_length(string_to_array(r.path, '.'), 1) <= $3)
                  )
                ORDER BY g.path
                "#
            );
            sqlx::query_as(&sql)
                .bind(query.tenant_id)
                .bind(query.active_only)
                .bind(depth_limit(query.max_depth))
                .bind(&query.root_group_ids)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("fetching subtree"))?
        };
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn fetch_members(&self, tenant_id: Uuid, group_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TreeMember>>, DomainError> {
        let sql = format!(
            r#"
            SELECT {PERSON_COLUMNS}
            FROM people
            WHERE tenant_id = $1 AND status = 'active' AND group_id = ANY($2)
            "#
        );
        let rows: Vec<PersonRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(group_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetching group members"))?;

        let mut members: HashMap<Uuid, Vec<TreeMember>> = HashMap::new();
        for person in rows.into_iter().map(Person::from) {
            let Some(group_id) = person.group_id else { continue };
            members.entry(group_id).or_default().push(TreeMember {
                id: person.id,
                name: person.full_name(),
                person: None,
            });
        }
        for list in members.values_mut() {
            list.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(members)
    }
}

#[async_trait]
impl HierarchyStore for PgHierarchyStore {
    async fn begin(&self, tenant_id: Uuid) -> Result<Box<dyn HierarchyTx>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("opening transaction"))?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_lock_key(tenant_id))
            .execute(&mut *tx)
            .await
            .map_err(db_error("taking tenant lock"))?;
        debug!("Opened hierarchy transaction for tenant {}", tenant_id);
        Ok(Box::new(PgHierarchyTx { tx }))
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, DomainError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1");
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("finding tenant"))?;
        Ok(row.map(Tenant::from))
    }

    async fn fetch_subtree(&self, query: &SubtreeQuery) -> Result<Vec<GroupWithMembers>, DomainError> {
        let groups = self.fetch_subtree_groups(query).await?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = groups.iter().map(|g| g.id).collect();
        let mut members = self.fetch_members(query.tenant_id, &ids).await?;

        Ok(groups
            .into_iter()
            .map(|group| GroupWithMembers {
                members: members.remove(&group.id).unwrap_or_default(),
                group,
            })
            .collect())
    }

    async fn find_people_by_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Person>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {PERSON_COLUMNS} FROM people WHERE tenant_id = $1 AND id = ANY($2)");
        let rows: Vec<PersonRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("finding people"))?;
        Ok(rows.into_iter().map(Person::from).collect())
    }

    async fn find_crm_roles_by_ids(&self, tenant_id: Uuid, ids: &[String]) -> Result<Vec<CrmRole>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {CRM_ROLE_COLUMNS} FROM crm_roles WHERE tenant_id = $1 AND id = ANY($2)");
        let rows: Vec<CrmRoleRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("finding CRM roles"))?;
        Ok(rows.into_iter().map(CrmRole::from).collect())
    }
}

/// Open write transaction; rolled back by sqlx when dropped uncommitted.
pub struct PgHierarchyTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl HierarchyTx for PgHierarchyTx {
    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, DomainError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1");
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("finding tenant"))?;
        Ok(row.map(Tenant::from))
    }

    async fn set_group_sync_state(&mut self, tenant_id: Uuid, state: GroupSyncState) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE tenants SET group_sync_state = $2, updated_at = NOW() WHERE id = $1")
            .bind(tenant_id)
            .bind(state.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("setting group sync state"))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TenantNotFound(tenant_id));
        }
        Ok(())
    }

    async fn mark_crm_roles_synced(&mut self, tenant_id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE tenants SET crm_roles_synced_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(tenant_id)
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("marking CRM roles synced"))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TenantNotFound(tenant_id));
        }
        Ok(())
    }

    async fn list_groups(&mut self, tenant_id: Uuid) -> Result<Vec<Group>, DomainError> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE tenant_id = $1 ORDER BY id");
        let rows: Vec<GroupRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("listing groups"))?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn find_group(&mut self, tenant_id: Uuid, group_id: Uuid) -> Result<Option<Group>, DomainError> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE tenant_id = $1 AND id = $2");
        let row: Option<GroupRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(group_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("finding group"))?;
        Ok(row.map(Group::from))
    }

    async fn upsert_group(&mut self, group: &Group) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO groups (
                tenant_id, id, name, type, status,
                role_ids, crm_role_ids, parent_id, path, "order",
                sync_filter, opportunity_filter,
                created_at, created_by, updated_at, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (tenant_id, id) DO UPDATE SET
                name = EXCLUDED.name,
                type = EXCLUDED.type,
                status = EXCLUDED.status,
                role_ids = EXCLUDED.role_ids,
                crm_role_ids = EXCLUDED.crm_role_ids,
                parent_id = EXCLUDED.parent_id,
                path = EXCLUDED.path,
                "order" = EXCLUDED."order",
                sync_filter = EXCLUDED.sync_filter,
                opportunity_filter = EXCLUDED.opportunity_filter,
                updated_at = EXCLUDED.updated_at,
                updated_by = EXCLUDED.updated_by
            "#,
        )
        .bind(group.tenant_id)
        .bind(group.id)
        .bind(&group.name)
        .bind(group.group_type.as_str())
        .bind(group.status.as_str())
        .bind(&group.role_ids)
        .bind(&group.crm_role_ids)
        .bind(group.parent_id)
        .bind(&group.path)
        .bind(group.order)
        .bind(&group.sync_filter)
        .bind(&group.opportunity_filter)
        .bind(group.created_at)
        .bind(group.created_by)
        .bind(group.updated_at)
        .bind(group.updated_by)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("upserting group"))?;
        Ok(())
    }

    async fn update_group_paths(&mut self, tenant_id: Uuid, updates: &[(Uuid, String)]) -> Result<(), DomainError> {
        if updates.is_empty() {
            return Ok(());
        }
        let (ids, paths): (Vec<Uuid>, Vec<String>) = updates.iter().cloned().unzip();
        sqlx::query(
            r#"
            UPDATE groups AS g SET path = u.path
            FROM UNNEST($2::UUID[], $3::TEXT[]) AS u(id, path)
            WHERE g.tenant_id = $1 AND g.id = u.id
            "#,
        )
        .bind(tenant_id)
        .bind(&ids)
        .bind(&paths)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("updating group paths"))?;
        Ok(())
    }

    async fn update_group_types(&mut self, tenant_id: Uuid, updates: &[(Uuid, GroupType)]) -> Result<(), DomainError> {
        if updates.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = updates.iter().map(|(id, _)| *id).collect();
        let types: Vec<&str> = updates.iter().map(|(_, t)| t.as_str()).collect();
        sqlx::query(
            r#"
            UPDATE groups AS g SET type = u.type
            FROM UNNEST($2::UUID[], $3::TEXT[]) AS u(id, type)
            WHERE g.tenant_id = $1 AND g.id = u.id
            "#,
        )
        .bind(tenant_id)
        .bind(&ids)
        .bind(&types)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("updating group types"))?;
        Ok(())
    }

    async fn delete_all_groups(&mut self, tenant_id: Uuid) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM groups WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("deleting groups"))?;
        Ok(result.rows_affected())
    }

    async fn list_people(&mut self, tenant_id: Uuid) -> Result<Vec<Person>, DomainError> {
        let sql = format!("SELECT {PERSON_COLUMNS} FROM people WHERE tenant_id = $1 ORDER BY id");
        let rows: Vec<PersonRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("listing people"))?;
        Ok(rows.into_iter().map(Person::from).collect())
    }

    async fn update_person_groups(&mut self, tenant_id: Uuid, updates: &[(Uuid, Option<Uuid>)]) -> Result<(), DomainError> {
        if updates.is_empty() {
            return Ok(());
        }
        let (ids, group_ids): (Vec<Uuid>, Vec<Option<Uuid>>) = updates.iter().copied().unzip();
        sqlx::query(
            r#"
            UPDATE people AS p SET group_id = u.group_id, updated_at = NOW()
            FROM UNNEST($2::UUID[], $3::UUID[]) AS u(id, group_id)
            WHERE p.tenant_id = $1 AND p.id = u.id
            "#,
        )
        .bind(tenant_id)
        .bind(&ids)
        .bind(&group_ids)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("updating person groups"))?;
        Ok(())
    }

    async fn update_person_types(&mut self, tenant_id: Uuid, updates: &[(Uuid, GroupType)]) -> Result<(), DomainError> {
        if updates.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = updates.iter().map(|(id, _)| *id).collect();
        let types: Vec<&str> = updates.iter().map(|(_, t)| t.as_str()).collect();
        sqlx::query(
            r#"
            UPDATE people AS p SET type = u.type
            FROM UNNEST($2::UUID[], $3::TEXT[]) AS u(id, type)
            WHERE p.tenant_id = $1 AND p.id = u.id
            "#,
        )
        .bind(tenant_id)
        .bind(&ids)
        .bind(&types)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("updating person types"))?;
        Ok(())
    }

    async fn clear_person_groups(&mut self, tenant_id: Uuid) -> Result<Vec<Uuid>, DomainError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE people SET group_id = NULL, updated_at = NOW()
            WHERE tenant_id = $1 AND group_id IS NOT NULL
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("clearing person groups"))?;
        Ok(ids)
    }

    async fn list_crm_roles(&mut self, tenant_id: Uuid) -> Result<Vec<CrmRole>, DomainError> {
        let sql = format!("SELECT {CRM_ROLE_COLUMNS} FROM crm_roles WHERE tenant_id = $1 ORDER BY id");
        let rows: Vec<CrmRoleRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("listing CRM roles"))?;
        Ok(rows.into_iter().map(CrmRole::from).collect())
    }

    async fn upsert_crm_roles(&mut self, roles: &[CrmRole]) -> Result<(), DomainError> {
        let roles = distinct_crm_roles(roles);
        if roles.is_empty() {
            return Ok(());
        }
        let tenant_ids: Vec<Uuid> = roles.iter().map(|r| r.tenant_id).collect();
        let ids: Vec<&str> = roles.iter().map(|r| r.id.as_str()).collect();
        let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        let parent_ids: Vec<Option<&str>> = roles.iter().map(|r| r.parent_id.as_deref()).collect();
        let updated_at: Vec<DateTime<Utc>> = roles.iter().map(|r| r.updated_at).collect();

        sqlx::query(
            r#"
            INSERT INTO crm_roles (tenant_id, id, name, parent_id, updated_at)
            SELECT * FROM UNNEST($1::UUID[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::TIMESTAMPTZ[])
            ON CONFLICT (tenant_id, id) DO UPDATE SET
                name = EXCLUDED.name,
                parent_id = EXCLUDED.parent_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&tenant_ids)
        .bind(&ids)
        .bind(&names)
        .bind(&parent_ids)
        .bind(&updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("upserting CRM roles"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(db_error("committing transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(db_error("rolling back transaction"))
    }
}
