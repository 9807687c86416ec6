// ============================================================================
// OrgTree Core - Tenant Sync-State Machine
// File: crates/orgtree-core/src/services/sync_state.rs
// Description: Derives and persists a tenant's group sync state
// ============================================================================
//! The state is a pure function over [`SyncFacts`]; only the resulting
//! [`GroupSyncState`] is stored on the tenant.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{CrmRole, Group, GroupSyncState};
use crate::error::DomainError;
use crate::repositories::HierarchyTx;

/// Counts the state machine is evaluated over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFacts {
    pub crm_roles: usize,
    /// Roles not backed by exactly one active group
    pub roles_without_single_group: usize,
    /// Roles backed by more than one active group
    pub roles_with_multiple_groups: usize,
    pub active_groups: usize,
    pub active_groups_with_crm_roles: usize,
    pub groups_with_multiple_crm_roles: usize,
    pub inactive_groups_with_crm_roles: usize,
    pub human_created_groups: usize,
}

impl SyncFacts {
    pub fn collect(roles: &[CrmRole], groups: &[Group]) -> Self {
        let mut backing: HashMap<&str, usize> = roles.iter().map(|r| (r.id.as_str(), 0)).collect();
        let mut facts = SyncFacts {
            crm_roles: backing.len(),
            ..Default::default()
        };

        for group in groups {
            if group.created_by.is_some() {
                facts.human_created_groups += 1;
            }
            if !group.is_active() {
                if !group.crm_role_ids.is_empty() {
                    facts.inactive_groups_with_crm_roles += 1;
                }
                continue;
            }
            facts.active_groups += 1;
            if !group.crm_role_ids.is_empty() {
                facts.active_groups_with_crm_roles += 1;
            }
            if group.crm_role_ids.len() > 1 {
                facts.groups_with_multiple_crm_roles += 1;
            }
            for role in &group.crm_role_ids {
                if let Some(count) = backing.get_mut(role.as_str()) {
                    *count += 1;
                }
            }
        }

        facts.roles_without_single_group = backing.values().filter(|n| **n != 1).count();
        facts.roles_with_multiple_groups = backing.values().filter(|n| **n > 1).count();
        facts
    }
}

/// The hierarchy is fully CRM-derived.
pub fn is_crm_synced(facts: &SyncFacts) -> bool {
    facts.crm_roles > 0
        && facts.roles_without_single_group == 0
        && facts.groups_with_multiple_crm_roles == 0
        && facts.inactive_groups_with_crm_roles == 0
        && facts.human_created_groups == 0
}

/// The synchronizer may rewrite the hierarchy without adopting it: either
/// nothing active exists yet, or every group is system-made and the only gap
/// to `Active` is roles that have no group yet.
pub fn accepts_crm_sync(facts: &SyncFacts) -> bool {
    facts.active_groups == 0
        || (facts.roles_with_multiple_groups == 0
            && facts.groups_with_multiple_crm_roles == 0
            && facts.inactive_groups_with_crm_roles == 0
            && facts.human_created_groups == 0)
}

/// At least part of the membership is CRM-derived.
pub fn check_people_sync_state(facts: &SyncFacts) -> bool {
    facts.active_groups_with_crm_roles > 0
}

pub fn evaluate(facts: &SyncFacts) -> GroupSyncState {
    if is_crm_synced(facts) {
        GroupSyncState::Active
    } else if check_people_sync_state(facts) {
        GroupSyncState::PeopleOnly
    } else {
        GroupSyncState::Inactive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateTransition {
    pub previous: GroupSyncState,
    pub current: GroupSyncState,
    pub changed: bool,
}

impl SyncStateTransition {
    pub fn unchanged(state: GroupSyncState) -> Self {
        Self {
            previous: state,
            current: state,
            changed: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResult {
    /// People whose group assignment was cleared
    pub cleared_people: Vec<Uuid>,
    pub deleted_groups: u64,
}

pub async fn load_sync_facts(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<SyncFacts, DomainError> {
    let roles = tx.list_crm_roles(tenant_id).await?;
    let groups = tx.list_groups(tenant_id).await?;
    Ok(SyncFacts::collect(&roles, &groups))
}

/// Recomputes the tenant's state and stores it when it differs.
pub async fn ensure_tenant_group_sync_state(
    tx: &mut dyn HierarchyTx,
    tenant_id: Uuid,
) -> Result<SyncStateTransition, DomainError> {
    let tenant = tx
        .find_tenant(tenant_id)
        .await?
        .ok_or(DomainError::TenantNotFound(tenant_id))?;
    let facts = load_sync_facts(tx, tenant_id).await?;
    let current = evaluate(&facts);

    if current == tenant.group_sync_state {
        return Ok(SyncStateTransition::unchanged(current));
    }

    tx.set_group_sync_state(tenant_id, current).await?;
    info!(
        "Tenant {} group sync state: {} -> {}",
        tenant_id,
        tenant.group_sync_state.as_str(),
        current.as_str()
    );
    Ok(SyncStateTransition {
        previous: tenant.group_sync_state,
        current,
        changed: true,
    })
}

/// Clears every membership, hard-deletes all groups and forces the tenant to
/// `Inactive`.
pub async fn reset_hierarchy(
    tx: &mut dyn HierarchyTx,
    tenant_id: Uuid,
) -> Result<(ResetResult, SyncStateTransition), DomainError> {
    let tenant = tx
        .find_tenant(tenant_id)
        .await?
        .ok_or(DomainError::TenantNotFound(tenant_id))?;

    let cleared_people = tx.clear_person_groups(tenant_id).await?;
    let deleted_groups = tx.delete_all_groups(tenant_id).await?;
    tx.set_group_sync_state(tenant_id, GroupSyncState::Inactive).await?;

    warn!(
        "Hierarchy reset for tenant {}: {} groups deleted, {} people ungrouped",
        tenant_id,
        deleted_groups,
        cleared_people.len()
    );
    let previous = tenant.group_sync_state;
    Ok((
        ResetResult {
            cleared_people,
            deleted_groups,
        },
        SyncStateTransition {
            previous,
            current: GroupSyncState::Inactive,
            changed: previous != GroupSyncState::Inactive,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked(tenant_id: Uuid, crm: &[&str]) -> Group {
        let mut g = Group::new(tenant_id, Uuid::new_v4(), "G".to_string(), None);
        g.crm_role_ids = crm.iter().map(|s| s.to_string()).collect();
        g
    }

    fn roles(tenant_id: Uuid, ids: &[&str]) -> Vec<CrmRole> {
        ids.iter().map(|id| CrmRole::new(tenant_id, *id, *id, None)).collect()
    }

    #[test]
    fn test_fully_linked_hierarchy_is_active() {
        let tenant_id = Uuid::new_v4();
        let facts = SyncFacts::collect(
            &roles(tenant_id, &["A", "B"]),
            &[linked(tenant_id, &["A"]), linked(tenant_id, &["B"])],
        );
        assert_eq!(evaluate(&facts), GroupSyncState::Active);
    }

    #[test]
    fn test_no_roles_is_never_synced() {
        let facts = SyncFacts::collect(&[], &[]);
        assert!(!is_crm_synced(&facts));
        assert_eq!(evaluate(&facts), GroupSyncState::Inactive);
    }

    #[test]
    fn test_partial_linkage_is_people_only() {
        let tenant_id = Uuid::new_v4();
        let facts = SyncFacts::collect(&roles(tenant_id, &["A", "B"]), &[linked(tenant_id, &["A"])]);
        assert_eq!(facts.roles_without_single_group, 1);
        assert_eq!(evaluate(&facts), GroupSyncState::PeopleOnly);
    }

    #[test]
    fn test_human_created_group_blocks_active() {
        let tenant_id = Uuid::new_v4();
        let mut manual = linked(tenant_id, &[]);
        manual.created_by = Some(Uuid::new_v4());
        let facts = SyncFacts::collect(&roles(tenant_id, &["A"]), &[linked(tenant_id, &["A"]), manual]);
        assert_eq!(evaluate(&facts), GroupSyncState::PeopleOnly);
    }

    #[test]
    fn test_stale_inactive_linkage_blocks_active() {
        let tenant_id = Uuid::new_v4();
        let mut inactive = linked(tenant_id, &["B"]);
        inactive.status = crate::domain::GroupStatus::Inactive;
        let facts = SyncFacts::collect(&roles(tenant_id, &["A"]), &[linked(tenant_id, &["A"]), inactive]);
        assert_eq!(facts.inactive_groups_with_crm_roles, 1);
        assert!(!is_crm_synced(&facts));
    }

    #[test]
    fn test_new_role_without_group_still_accepts_sync() {
        let tenant_id = Uuid::new_v4();
        let facts = SyncFacts::collect(&roles(tenant_id, &["A", "B"]), &[linked(tenant_id, &["A"])]);
        assert!(!is_crm_synced(&facts));
        assert!(accepts_crm_sync(&facts));

        let mut manual = linked(tenant_id, &[]);
        manual.created_by = Some(Uuid::new_v4());
        let facts = SyncFacts::collect(&roles(tenant_id, &["A", "B"]), &[linked(tenant_id, &["A"]), manual]);
        assert!(!accepts_crm_sync(&facts));
    }

    #[test]
    fn test_doubly_backed_role_refuses_sync() {
        let tenant_id = Uuid::new_v4();
        let facts = SyncFacts::collect(
            &roles(tenant_id, &["A"]),
            &[linked(tenant_id, &["A"]), linked(tenant_id, &["A"])],
        );
        assert_eq!(facts.roles_with_multiple_groups, 1);
        assert!(!accepts_crm_sync(&facts));
    }

    #[test]
    fn test_multi_role_group_blocks_active() {
        let tenant_id = Uuid::new_v4();
        let facts = SyncFacts::collect(&roles(tenant_id, &["A", "B"]), &[linked(tenant_id, &["A", "B"])]);
        assert!(!is_crm_synced(&facts));
        assert!(check_people_sync_state(&facts));
    }
}
