// ============================================================================
// OrgTree Core - Person-Group Reconciler
// File: crates/orgtree-core/src/services/person_reconciler.rs
// Description: Re-assigns people to groups after hierarchy changes
// ============================================================================
//! Synced people follow their CRM roles. Manually placed people stay where
//! they are while their group is active and follow the group's parent link
//! when it is retired.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::{Group, Person};
use crate::error::DomainError;
use crate::repositories::HierarchyTx;

/// One person's group assignment changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    pub person_id: Uuid,
    pub previous_group_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

/// Group a synced person belongs in: the first of their CRM roles that an
/// active group carries, lowest group id on ties.
fn synced_target(person: &Person, by_crm_role: &HashMap<&str, Uuid>) -> Option<Uuid> {
    person
        .crm_role_ids
        .iter()
        .find_map(|role| by_crm_role.get(role.as_str()).copied())
}

fn manual_target(person: &Person, groups: &HashMap<Uuid, &Group>) -> Option<Uuid> {
    let current = person.group_id?;
    match groups.get(&current) {
        Some(group) if group.is_active() => Some(current),
        Some(group) => group
            .parent_id
            .filter(|parent| groups.get(parent).map_or(false, |p| p.is_active())),
        None => None,
    }
}

pub fn plan_person_groups(groups: &[Group], people: &[Person]) -> Vec<MembershipChange> {
    let by_id: HashMap<Uuid, &Group> = groups.iter().map(|g| (g.id, g)).collect();

    // BTreeMap iteration keeps the lowest id first for roles held twice
    let active_sorted: BTreeMap<Uuid, &Group> = groups
        .iter()
        .filter(|g| g.is_active())
        .map(|g| (g.id, g))
        .collect();
    let mut by_crm_role: HashMap<&str, Uuid> = HashMap::new();
    for group in active_sorted.values() {
        for role in &group.crm_role_ids {
            by_crm_role.entry(role.as_str()).or_insert(group.id);
        }
    }

    let mut changes: Vec<MembershipChange> = people
        .iter()
        .filter_map(|person| {
            let target = if person.is_synced {
                synced_target(person, &by_crm_role)
            } else {
                manual_target(person, &by_id)
            };
            (target != person.group_id).then_some(MembershipChange {
                person_id: person.id,
                previous_group_id: person.group_id,
                group_id: target,
            })
        })
        .collect();
    changes.sort_by(|a, b| a.person_id.cmp(&b.person_id));
    changes
}

/// Reconciles every person of the tenant and persists the changed assignments.
pub async fn update_person_groups(
    tx: &mut dyn HierarchyTx,
    tenant_id: Uuid,
) -> Result<Vec<MembershipChange>, DomainError> {
    let groups = tx.list_groups(tenant_id).await?;
    let people = tx.list_people(tenant_id).await?;
    let changes = plan_person_groups(&groups, &people);

    if !changes.is_empty() {
        let updates: Vec<(Uuid, Option<Uuid>)> = changes.iter().map(|c| (c.person_id, c.group_id)).collect();
        tx.update_person_groups(tenant_id, &updates).await?;
        info!("Reassigned {} people for tenant {}", changes.len(), tenant_id);
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(tenant_id: Uuid, crm: &[&str]) -> Group {
        let mut g = Group::new(tenant_id, Uuid::new_v4(), "G".to_string(), None);
        g.crm_role_ids = crm.iter().map(|s| s.to_string()).collect();
        g
    }

    fn synced(tenant_id: Uuid, crm: &[&str]) -> Person {
        let mut p = Person::new(tenant_id, format!("{}@example.com", Uuid::new_v4()), true);
        p.crm_role_ids = crm.iter().map(|s| s.to_string()).collect();
        p
    }

    #[test]
    fn test_synced_person_follows_first_backed_role() {
        let tenant_id = Uuid::new_v4();
        let g1 = group(tenant_id, &["R1"]);
        let g2 = group(tenant_id, &["R2"]);
        let person = synced(tenant_id, &["R9", "R2", "R1"]);

        let changes = plan_person_groups(&[g1, g2.clone()], &[person.clone()]);
        assert_eq!(
            changes,
            vec![MembershipChange {
                person_id: person.id,
                previous_group_id: None,
                group_id: Some(g2.id),
            }]
        );
    }

    #[test]
    fn test_duplicate_backing_picks_lowest_group_id() {
        let tenant_id = Uuid::new_v4();
        let g1 = group(tenant_id, &["R1"]);
        let g2 = group(tenant_id, &["R1"]);
        let lowest = g1.id.min(g2.id);
        let person = synced(tenant_id, &["R1"]);

        let changes = plan_person_groups(&[g1, g2], &[person]);
        assert_eq!(changes[0].group_id, Some(lowest));
    }

    #[test]
    fn test_synced_person_without_match_is_ungrouped() {
        let tenant_id = Uuid::new_v4();
        let mut g = group(tenant_id, &["R1"]);
        let mut person = synced(tenant_id, &["R1"]);
        person.group_id = Some(g.id);
        g.soft_delete(None);

        let changes = plan_person_groups(&[g], &[person]);
        assert_eq!(changes[0].group_id, None);
    }

    #[test]
    fn test_manual_placement_is_preserved() {
        let tenant_id = Uuid::new_v4();
        let g = group(tenant_id, &["R1"]);
        let other = group(tenant_id, &["R2"]);
        let mut person = Person::new(tenant_id, "manual@example.com".to_string(), false);
        person.crm_role_ids = vec!["R1".to_string()];
        person.group_id = Some(other.id);

        assert!(plan_person_groups(&[g, other], &[person]).is_empty());
    }

    #[test]
    fn test_manual_person_follows_retired_group_to_parent() {
        let tenant_id = Uuid::new_v4();
        let parent = group(tenant_id, &[]);
        let mut retired = group(tenant_id, &[]);
        retired.parent_id = Some(parent.id);
        retired.soft_delete(None);

        let mut person = Person::new(tenant_id, "manual@example.com".to_string(), false);
        person.group_id = Some(retired.id);

        let changes = plan_person_groups(&[parent.clone(), retired], &[person]);
        assert_eq!(changes[0].group_id, Some(parent.id));
    }
}
