// ============================================================================
// OrgTree Core - Path Maintainer
// File: crates/orgtree-core/src/services/path_maintainer.rs
// Description: Recomputes materialized paths from the parent chain
// ============================================================================
//! Every active group's `path` is `root.….parent.self`. Roots are groups with
//! no parent or whose parent is not active. Only paths that differ from the
//! stored value are written, so a pass over a correct tree is a no-op.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, error};
use uuid::Uuid;

use crate::domain::Group;
use crate::error::DomainError;
use crate::repositories::HierarchyTx;
use orgtree_shared::constants::PATH_SEPARATOR;

/// Computes the path of every active group and returns the ones that changed.
pub fn plan_group_paths(groups: &[Group]) -> Result<Vec<(Uuid, String)>, DomainError> {
    let active: HashMap<Uuid, &Group> = groups
        .iter()
        .filter(|g| g.is_active())
        .map(|g| (g.id, g))
        .collect();

    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut roots: Vec<Uuid> = Vec::new();
    for group in active.values() {
        match group.parent_id {
            Some(parent_id) if active.contains_key(&parent_id) => {
                children.entry(parent_id).or_default().push(group.id)
            }
            _ => roots.push(group.id),
        }
    }
    roots.sort();

    let mut computed: HashMap<Uuid, String> = HashMap::with_capacity(active.len());
    let mut queue: VecDeque<Uuid> = VecDeque::new();
    for root in roots {
        if let Some(group) = active.get(&root) {
            computed.insert(root, group.label());
            queue.push_back(root);
        }
    }

    while let Some(id) = queue.pop_front() {
        let Some(kids) = children.get(&id) else { continue };
        let base = computed.get(&id).cloned().unwrap_or_default();
        for child in kids {
            if computed.contains_key(child) {
                continue;
            }
            if let Some(group) = active.get(child) {
                computed.insert(*child, format!("{}{}{}", base, PATH_SEPARATOR, group.label()));
                queue.push_back(*child);
            }
        }
    }

    if computed.len() != active.len() {
        let reached: HashSet<&Uuid> = computed.keys().collect();
        let mut stranded: Vec<Uuid> = active
            .keys()
            .filter(|id| !reached.contains(id))
            .copied()
            .collect();
        stranded.sort();
        return Err(DomainError::HierarchyCycle(stranded));
    }

    let mut updates: Vec<(Uuid, String)> = computed
        .into_iter()
        .filter(|(id, path)| active.get(id).map_or(false, |g| g.path != *path))
        .collect();
    updates.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(updates)
}

/// Recomputes and persists active group paths. Returns the number of groups
/// whose path changed.
pub async fn update_group_paths(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<usize, DomainError> {
    let groups = tx.list_groups(tenant_id).await?;
    let updates = plan_group_paths(&groups).map_err(|e| {
        error!("Path maintenance failed for tenant {}: {}", tenant_id, e);
        e
    })?;

    if !updates.is_empty() {
        tx.update_group_paths(tenant_id, &updates).await?;
    }
    debug!("Updated {} group paths for tenant {}", updates.len(), tenant_id);
    Ok(updates.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::path_label;

    fn group(tenant_id: Uuid, parent: Option<Uuid>) -> Group {
        let mut g = Group::new(tenant_id, Uuid::new_v4(), "G".to_string(), None);
        g.parent_id = parent;
        g
    }

    #[test]
    fn test_paths_follow_parent_chain() {
        let tenant_id = Uuid::new_v4();
        let a = group(tenant_id, None);
        let b = group(tenant_id, Some(a.id));
        let c = group(tenant_id, Some(b.id));

        let updates: HashMap<Uuid, String> = plan_group_paths(&[a.clone(), b.clone(), c.clone()])
            .unwrap()
            .into_iter()
            .collect();

        // `a` already carries its own label
        assert!(!updates.contains_key(&a.id));
        assert_eq!(updates[&b.id], format!("{}.{}", path_label(a.id), path_label(b.id)));
        assert_eq!(
            updates[&c.id],
            format!("{}.{}.{}", path_label(a.id), path_label(b.id), path_label(c.id))
        );
    }

    #[test]
    fn test_correct_tree_needs_no_writes() {
        let tenant_id = Uuid::new_v4();
        let a = group(tenant_id, None);
        let mut b = group(tenant_id, Some(a.id));
        b.path = format!("{}.{}", a.path, b.label());

        assert!(plan_group_paths(&[a, b]).unwrap().is_empty());
    }

    #[test]
    fn test_child_of_inactive_parent_becomes_root() {
        let tenant_id = Uuid::new_v4();
        let mut a = group(tenant_id, None);
        a.soft_delete(None);
        let mut b = group(tenant_id, Some(a.id));
        b.path = format!("{}.{}", a.path, b.label());

        let updates = plan_group_paths(&[a, b.clone()]).unwrap();
        assert_eq!(updates, vec![(b.id, path_label(b.id))]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let tenant_id = Uuid::new_v4();
        let root = group(tenant_id, None);
        let mut x = group(tenant_id, None);
        let mut y = group(tenant_id, None);
        x.parent_id = Some(y.id);
        y.parent_id = Some(x.id);

        let err = plan_group_paths(&[root, x.clone(), y.clone()]).unwrap_err();
        match err {
            DomainError::HierarchyCycle(ids) => {
                let mut expected = vec![x.id, y.id];
                expected.sort();
                assert_eq!(ids, expected);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
