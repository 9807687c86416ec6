// ============================================================================
// OrgTree Core - Role-to-Group Synchronizer
// File: crates/orgtree-core/src/services/group_sync.rs
// Description: Derives the group tree from a tenant's CRM roles
// ============================================================================
//! Each live CRM role ends up backed by exactly one active group carrying
//! `crm_role_ids = [role]`. Existing groups keep their identity and the fields
//! people edit by hand (name, permission roles, order, filters); the
//! synchronizer owns linkage, parent, type and status.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{CrmRole, Group, GroupStatus, GroupType};
use crate::error::DomainError;
use crate::repositories::HierarchyTx;

/// Groups the synchronizer writes
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub upserts: Vec<Group>,
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupSyncReport {
    pub created: usize,
    pub updated: usize,
}

/// Which existing active group backs each live role. Groups are visited in id
/// order and each claims the first live role it lists that is still free.
pub fn backing_groups(roles: &[CrmRole], groups: &[Group]) -> HashMap<String, Uuid> {
    let live: HashSet<&str> = roles.iter().map(|r| r.id.as_str()).collect();
    let active: BTreeMap<Uuid, &Group> = groups
        .iter()
        .filter(|g| g.is_active())
        .map(|g| (g.id, g))
        .collect();

    let mut claims: HashMap<String, Uuid> = HashMap::new();
    for group in active.values() {
        let claimed = group
            .crm_role_ids
            .iter()
            .find(|id| live.contains(id.as_str()) && !claims.contains_key(id.as_str()));
        if let Some(role_id) = claimed {
            claims.insert(role_id.clone(), group.id);
        }
    }
    claims
}

pub fn plan_group_sync(tenant_id: Uuid, roles: &[CrmRole], groups: &[Group]) -> SyncPlan {
    let roles: BTreeMap<&str, &CrmRole> = roles.iter().map(|r| (r.id.as_str(), r)).collect();
    let role_list: Vec<CrmRole> = roles.values().map(|r| (*r).clone()).collect();
    let existing: HashMap<Uuid, &Group> = groups.iter().map(|g| (g.id, g)).collect();
    let claims = backing_groups(&role_list, groups);
    let claimed_ids: HashSet<Uuid> = claims.values().copied().collect();

    let has_children: HashSet<&str> = roles
        .values()
        .filter_map(|r| r.parent_id.as_deref())
        .filter(|p| roles.contains_key(p))
        .collect();

    // First pass: settle the group id of every role
    let mut group_for_role: HashMap<&str, Uuid> = HashMap::with_capacity(roles.len());
    for (role_id, role) in &roles {
        let id = match claims.get(*role_id) {
            Some(id) => *id,
            None => {
                let derived = role.derived_group_id();
                if claimed_ids.contains(&derived) {
                    Uuid::new_v4()
                } else {
                    derived
                }
            }
        };
        group_for_role.insert(*role_id, id);
    }

    let mut plan = SyncPlan::default();
    for (role_id, role) in &roles {
        let Some(&id) = group_for_role.get(role_id) else { continue };
        let parent_id = role
            .parent_id
            .as_deref()
            .and_then(|p| group_for_role.get(p).copied())
            .filter(|p| *p != id);

        let base = existing.get(&id).copied();
        let mut desired = match base {
            Some(group) => group.clone(),
            None => Group::new(tenant_id, id, role.name.clone(), None),
        };
        desired.crm_role_ids = vec![role.id.clone()];
        desired.parent_id = parent_id;
        desired.status = GroupStatus::Active;
        if !desired.is_internal() {
            desired.group_type = if has_children.contains(role_id) {
                GroupType::Manager
            } else {
                GroupType::Ic
            };
        }

        match base {
            Some(group) if group.same_structure(&desired) => {}
            Some(_) => {
                desired.touch(None);
                plan.updated += 1;
                plan.upserts.push(desired);
            }
            None => {
                plan.created += 1;
                plan.upserts.push(desired);
            }
        }
    }
    plan
}

/// Active groups that back no live role. Non-internal ones are soft-deleted;
/// internal ones only lose their stale CRM linkage.
pub fn plan_unsynced_groups(roles: &[CrmRole], groups: &[Group]) -> Vec<Group> {
    let backing: HashSet<Uuid> = backing_groups(roles, groups).into_values().collect();

    let mut retired: Vec<Group> = groups
        .iter()
        .filter(|g| g.is_active() && !backing.contains(&g.id))
        .filter_map(|g| {
            let mut next = g.clone();
            if g.is_internal() {
                if g.crm_role_ids.is_empty() {
                    return None;
                }
                next.crm_role_ids.clear();
                next.touch(None);
            } else {
                next.soft_delete(None);
            }
            Some(next)
        })
        .collect();
    retired.sort_by(|a, b| a.id.cmp(&b.id));
    retired
}

/// Upserts one group per live CRM role.
pub async fn sync_groups(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<GroupSyncReport, DomainError> {
    let roles = tx.list_crm_roles(tenant_id).await?;
    let groups = tx.list_groups(tenant_id).await?;
    let plan = plan_group_sync(tenant_id, &roles, &groups);

    for group in &plan.upserts {
        tx.upsert_group(group).await?;
    }
    info!(
        "Synchronized {} CRM roles for tenant {}: {} groups created, {} updated",
        roles.len(),
        tenant_id,
        plan.created,
        plan.updated
    );
    Ok(GroupSyncReport {
        created: plan.created,
        updated: plan.updated,
    })
}

/// Soft-deletes groups no live CRM role maps to. Returns the ids of the
/// groups that were retired.
pub async fn delete_unsynced_groups(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<Vec<Uuid>, DomainError> {
    let roles = tx.list_crm_roles(tenant_id).await?;
    let groups = tx.list_groups(tenant_id).await?;
    let unsynced = plan_unsynced_groups(&roles, &groups);

    let mut retired = Vec::new();
    for group in &unsynced {
        tx.upsert_group(group).await?;
        if !group.is_active() {
            retired.push(group.id);
        }
    }
    debug!("Retired {} unsynced groups for tenant {}", retired.len(), tenant_id);
    Ok(retired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(tenant_id: Uuid, id: &str, parent: Option<&str>) -> CrmRole {
        CrmRole::new(tenant_id, id, format!("Role {}", id), parent.map(|p| p.to_string()))
    }

    #[test]
    fn test_roles_become_groups() {
        let tenant_id = Uuid::new_v4();
        let a = role(tenant_id, "A", None);
        let b = role(tenant_id, "B", Some("A"));

        let plan = plan_group_sync(tenant_id, &[a.clone(), b.clone()], &[]);
        assert_eq!(plan.created, 2);

        let ga = plan.upserts.iter().find(|g| g.id == a.derived_group_id()).unwrap();
        let gb = plan.upserts.iter().find(|g| g.id == b.derived_group_id()).unwrap();
        assert_eq!(ga.name, "Role A");
        assert_eq!(ga.group_type, GroupType::Manager);
        assert_eq!(ga.parent_id, None);
        assert_eq!(gb.group_type, GroupType::Ic);
        assert_eq!(gb.parent_id, Some(ga.id));
        assert_eq!(gb.crm_role_ids, vec!["B".to_string()]);
        assert_eq!(gb.created_by, None);
    }

    #[test]
    fn test_existing_group_keeps_identity_and_name() {
        let tenant_id = Uuid::new_v4();
        let a = role(tenant_id, "A", None);
        let mut existing = Group::new(tenant_id, Uuid::new_v4(), "Renamed by hand".to_string(), None);
        existing.crm_role_ids = vec!["A".to_string(), "GONE".to_string()];
        existing.order = 7;

        let plan = plan_group_sync(tenant_id, &[a], &[existing.clone()]);
        assert_eq!(plan.created, 0);
        assert_eq!(plan.updated, 1);
        let group = &plan.upserts[0];
        assert_eq!(group.id, existing.id);
        assert_eq!(group.name, "Renamed by hand");
        assert_eq!(group.order, 7);
        assert_eq!(group.crm_role_ids, vec!["A".to_string()]);
    }

    #[test]
    fn test_unchanged_groups_are_not_written() {
        let tenant_id = Uuid::new_v4();
        let roles = vec![role(tenant_id, "A", None), role(tenant_id, "B", Some("A"))];
        let first = plan_group_sync(tenant_id, &roles, &[]);

        let second = plan_group_sync(tenant_id, &roles, &first.upserts);
        assert!(second.upserts.is_empty());
    }

    #[test]
    fn test_internal_type_survives_sync() {
        let tenant_id = Uuid::new_v4();
        let a = role(tenant_id, "A", None);
        let mut existing = Group::new(tenant_id, Uuid::new_v4(), "Bots".to_string(), None);
        existing.group_type = GroupType::Internal;
        existing.crm_role_ids = vec!["A".to_string()];

        let plan = plan_group_sync(tenant_id, &[a], &[existing]);
        assert!(plan.upserts.is_empty());
    }

    #[test]
    fn test_unbacked_groups_are_retired() {
        let tenant_id = Uuid::new_v4();
        let a = role(tenant_id, "A", None);
        let mut backing = Group::new(tenant_id, Uuid::new_v4(), "A".to_string(), None);
        backing.crm_role_ids = vec!["A".to_string()];
        let mut stale = Group::new(tenant_id, Uuid::new_v4(), "Old".to_string(), None);
        stale.crm_role_ids = vec!["OLD".to_string()];
        let mut internal = Group::new(tenant_id, Uuid::new_v4(), "Bots".to_string(), None);
        internal.group_type = GroupType::Internal;

        let retired = plan_unsynced_groups(&[a], &[backing, stale.clone(), internal]);
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].id, stale.id);
        assert!(!retired[0].is_active());
        assert!(retired[0].crm_role_ids.is_empty());
    }

    #[test]
    fn test_lowest_id_claims_shared_role() {
        let tenant_id = Uuid::new_v4();
        let a = role(tenant_id, "A", None);
        let mut g1 = Group::new(tenant_id, Uuid::new_v4(), "One".to_string(), None);
        g1.crm_role_ids = vec!["A".to_string()];
        let mut g2 = Group::new(tenant_id, Uuid::new_v4(), "Two".to_string(), None);
        g2.crm_role_ids = vec!["A".to_string()];

        let claims = backing_groups(&[a], &[g1.clone(), g2.clone()]);
        assert_eq!(claims["A"], g1.id.min(g2.id));
    }
}
