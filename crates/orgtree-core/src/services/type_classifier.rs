// ============================================================================
// OrgTree Core - Type Classifier
// File: crates/orgtree-core/src/services/type_classifier.rs
// Description: Derives group types from tree shape and mirrors them on people
// ============================================================================

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Group, GroupType, Person};
use crate::error::DomainError;
use crate::repositories::HierarchyTx;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeChanges {
    pub groups: usize,
    pub people: usize,
}

/// `manager` for active non-internal groups with at least one active child,
/// `ic` otherwise. Returns only the groups whose type changes.
pub fn plan_group_types(groups: &[Group]) -> Vec<(Uuid, GroupType)> {
    let active: HashSet<Uuid> = groups.iter().filter(|g| g.is_active()).map(|g| g.id).collect();
    let parents: HashSet<Uuid> = groups
        .iter()
        .filter(|g| g.is_active())
        .filter_map(|g| g.parent_id)
        .filter(|p| active.contains(p))
        .collect();

    let mut updates: Vec<(Uuid, GroupType)> = groups
        .iter()
        .filter(|g| g.is_active() && !g.is_internal())
        .filter_map(|g| {
            let derived = if parents.contains(&g.id) {
                GroupType::Manager
            } else {
                GroupType::Ic
            };
            (derived != g.group_type).then_some((g.id, derived))
        })
        .collect();
    updates.sort_by(|a, b| a.0.cmp(&b.0));
    updates
}

/// Every active person takes the type of the active group holding them, `ic`
/// when ungrouped.
pub fn plan_person_types(groups: &[Group], people: &[Person]) -> Vec<(Uuid, GroupType)> {
    let types: HashMap<Uuid, GroupType> = groups
        .iter()
        .filter(|g| g.is_active())
        .map(|g| (g.id, g.group_type))
        .collect();

    let mut updates: Vec<(Uuid, GroupType)> = people
        .iter()
        .filter(|p| p.is_active())
        .filter_map(|p| {
            let derived = p
                .group_id
                .and_then(|id| types.get(&id).copied())
                .unwrap_or(GroupType::Ic);
            (derived != p.person_type).then_some((p.id, derived))
        })
        .collect();
    updates.sort_by(|a, b| a.0.cmp(&b.0));
    updates
}

/// Mirrors group types onto people.
pub async fn update_person_types(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<usize, DomainError> {
    let groups = tx.list_groups(tenant_id).await?;
    let people = tx.list_people(tenant_id).await?;
    let updates = plan_person_types(&groups, &people);
    if !updates.is_empty() {
        tx.update_person_types(tenant_id, &updates).await?;
    }
    Ok(updates.len())
}

/// Reclassifies groups, then mirrors the result onto people.
pub async fn update_group_types(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<TypeChanges, DomainError> {
    let groups = tx.list_groups(tenant_id).await?;
    let updates = plan_group_types(&groups);
    if !updates.is_empty() {
        tx.update_group_types(tenant_id, &updates).await?;
    }

    let people = update_person_types(tx, tenant_id).await?;
    debug!(
        "Reclassified {} groups and {} people for tenant {}",
        updates.len(),
        people,
        tenant_id
    );
    Ok(TypeChanges {
        groups: updates.len(),
        people,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(tenant_id: Uuid, parent: Option<Uuid>) -> Group {
        let mut g = Group::new(tenant_id, Uuid::new_v4(), "G".to_string(), None);
        g.parent_id = parent;
        g
    }

    #[test]
    fn test_branch_is_manager_and_leaf_is_ic() {
        let tenant_id = Uuid::new_v4();
        let a = group(tenant_id, None);
        let b = group(tenant_id, Some(a.id));

        let updates: HashMap<Uuid, GroupType> = plan_group_types(&[a.clone(), b.clone()]).into_iter().collect();
        assert_eq!(updates[&a.id], GroupType::Manager);
        assert_eq!(updates[&b.id], GroupType::Ic);
    }

    #[test]
    fn test_inactive_children_do_not_count() {
        let tenant_id = Uuid::new_v4();
        let mut a = group(tenant_id, None);
        a.group_type = GroupType::Manager;
        let mut b = group(tenant_id, Some(a.id));
        b.soft_delete(None);

        assert_eq!(plan_group_types(&[a.clone(), b]), vec![(a.id, GroupType::Ic)]);
    }

    #[test]
    fn test_internal_groups_keep_their_type() {
        let tenant_id = Uuid::new_v4();
        let mut a = group(tenant_id, None);
        a.group_type = GroupType::Internal;
        let mut b = group(tenant_id, Some(a.id));
        b.group_type = GroupType::Ic;

        assert!(plan_group_types(&[a, b]).is_empty());
    }

    #[test]
    fn test_people_mirror_group_type() {
        let tenant_id = Uuid::new_v4();
        let mut manager = group(tenant_id, None);
        manager.group_type = GroupType::Manager;

        let mut boss = Person::new(tenant_id, "boss@example.com".to_string(), true);
        boss.group_id = Some(manager.id);
        let mut loner = Person::new(tenant_id, "loner@example.com".to_string(), true);
        loner.person_type = GroupType::Manager;

        let updates: HashMap<Uuid, GroupType> = plan_person_types(&[manager], &[boss.clone(), loner.clone()])
            .into_iter()
            .collect();
        assert_eq!(updates[&boss.id], GroupType::Manager);
        assert_eq!(updates[&loner.id], GroupType::Ic);
    }
}
