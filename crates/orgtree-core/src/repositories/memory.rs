// ============================================================================
// OrgTree Core - In-Memory Hierarchy Store
// File: crates/orgtree-core/src/repositories/memory.rs
// Description: Process-local store with copy-on-begin transactions
// ============================================================================
//! A transaction works on a private copy of the committed state and replaces
//! it on commit. Writers are serialized through one async mutex, matching the
//! single-writer-per-tenant assumption of the engine.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    path_depth, path_is_within, CrmRole, Group, GroupSyncState, GroupType, GroupWithMembers,
    Person, Tenant, TreeMember,
};
use crate::error::DomainError;
use crate::repositories::hierarchy_store::{HierarchyStore, HierarchyTx, SubtreeQuery};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tenants: BTreeMap<Uuid, Tenant>,
    groups: BTreeMap<(Uuid, Uuid), Group>,
    people: BTreeMap<(Uuid, Uuid), Person>,
    crm_roles: BTreeMap<(Uuid, String), CrmRole>,
    /// Mutating statements applied, for asserting no-op passes
    writes: u64,
}

impl MemoryState {
    fn groups_of(&self, tenant_id: Uuid) -> impl Iterator<Item = &Group> {
        self.groups.values().filter(move |g| g.tenant_id == tenant_id)
    }

    fn people_of(&self, tenant_id: Uuid) -> impl Iterator<Item = &Person> {
        self.people.values().filter(move |p| p.tenant_id == tenant_id)
    }

    fn subtree(&self, query: &SubtreeQuery) -> Vec<GroupWithMembers> {
        let candidates: Vec<&Group> = self
            .groups_of(query.tenant_id)
            .filter(|g| !query.active_only || g.is_active())
            .collect();

        let root_paths: Vec<&str> = candidates
            .iter()
            .filter(|g| query.root_group_ids.contains(&g.id))
            .map(|g| g.path.as_str())
            .collect();

        let within_depth = |path: &str, base: usize| match query.max_depth {
            Some(max) => path_depth(path).saturating_sub(base) <= max as usize,
            None => true,
        };

        let mut selected: Vec<&Group> = candidates
            .into_iter()
            .filter(|g| {
                if query.root_group_ids.is_empty() {
                    within_depth(&g.path, 1)
                } else {
                    root_paths
                        .iter()
                        .any(|root| path_is_within(&g.path, root) && within_depth(&g.path, path_depth(root)))
                }
            })
            .collect();
        selected.sort_by(|a, b| a.path.cmp(&b.path));

        selected
            .into_iter()
            .map(|group| {
                let mut members: Vec<TreeMember> = self
                    .people_of(query.tenant_id)
                    .filter(|p| p.is_active() && p.group_id == Some(group.id))
                    .map(|p| TreeMember {
                        id: p.id,
                        name: p.full_name(),
                        person: None,
                    })
                    .collect();
                members.sort_by(|a, b| a.name.cmp(&b.name));
                GroupWithMembers {
                    group: group.clone(),
                    members,
                }
            })
            .collect()
    }
}

/// In-process [`HierarchyStore`]
#[derive(Clone, Default)]
pub struct InMemoryHierarchyStore {
    committed: Arc<RwLock<MemoryState>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryHierarchyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.committed.write().tenants.insert(tenant.id, tenant);
    }

    pub fn insert_group(&self, group: Group) {
        self.committed
            .write()
            .groups
            .insert((group.tenant_id, group.id), group);
    }

    pub fn insert_person(&self, person: Person) {
        self.committed
            .write()
            .people
            .insert((person.tenant_id, person.id), person);
    }

    pub fn insert_crm_role(&self, role: CrmRole) {
        self.committed
            .write()
            .crm_roles
            .insert((role.tenant_id, role.id.clone()), role);
    }

    pub fn tenant(&self, tenant_id: Uuid) -> Option<Tenant> {
        self.committed.read().tenants.get(&tenant_id).cloned()
    }

    pub fn group(&self, tenant_id: Uuid, group_id: Uuid) -> Option<Group> {
        self.committed.read().groups.get(&(tenant_id, group_id)).cloned()
    }

    pub fn groups(&self, tenant_id: Uuid) -> Vec<Group> {
        self.committed.read().groups_of(tenant_id).cloned().collect()
    }

    pub fn person(&self, tenant_id: Uuid, person_id: Uuid) -> Option<Person> {
        self.committed.read().people.get(&(tenant_id, person_id)).cloned()
    }

    pub fn people(&self, tenant_id: Uuid) -> Vec<Person> {
        self.committed.read().people_of(tenant_id).cloned().collect()
    }

    pub fn write_count(&self) -> u64 {
        self.committed.read().writes
    }

    fn read_subtree(&self, query: &SubtreeQuery) -> Vec<GroupWithMembers> {
        self.committed.read().subtree(query)
    }

    fn read_people(&self, tenant_id: Uuid, ids: &[Uuid]) -> Vec<Person> {
        let state = self.committed.read();
        ids.iter()
            .filter_map(|id| state.people.get(&(tenant_id, *id)).cloned())
            .collect()
    }

    fn read_crm_roles(&self, tenant_id: Uuid, ids: &[String]) -> Vec<CrmRole> {
        let state = self.committed.read();
        ids.iter()
            .filter_map(|id| state.crm_roles.get(&(tenant_id, id.clone())).cloned())
            .collect()
    }
}

#[async_trait]
impl HierarchyStore for InMemoryHierarchyStore {
    async fn begin(&self, _tenant_id: Uuid) -> Result<Box<dyn HierarchyTx>, DomainError> {
        let guard = self.writer.clone().lock_owned().await;
        let state = self.committed.read().clone();
        Ok(Box::new(InMemoryTx {
            state,
            committed: self.committed.clone(),
            _guard: guard,
        }))
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, DomainError> {
        Ok(self.tenant(tenant_id))
    }

    async fn fetch_subtree(&self, query: &SubtreeQuery) -> Result<Vec<GroupWithMembers>, DomainError> {
        Ok(self.read_subtree(query))
    }

    async fn find_people_by_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Person>, DomainError> {
        Ok(self.read_people(tenant_id, ids))
    }

    async fn find_crm_roles_by_ids(&self, tenant_id: Uuid, ids: &[String]) -> Result<Vec<CrmRole>, DomainError> {
        Ok(self.read_crm_roles(tenant_id, ids))
    }
}

struct InMemoryTx {
    state: MemoryState,
    committed: Arc<RwLock<MemoryState>>,
    _guard: OwnedMutexGuard<()>,
}

impl InMemoryTx {
    fn group_mut(&mut self, tenant_id: Uuid, group_id: Uuid) -> Result<&mut Group, DomainError> {
        self.state
            .groups
            .get_mut(&(tenant_id, group_id))
            .ok_or(DomainError::GroupNotFound(group_id))
    }

    fn person_mut(&mut self, tenant_id: Uuid, person_id: Uuid) -> Result<&mut Person, DomainError> {
        self.state
            .people
            .get_mut(&(tenant_id, person_id))
            .ok_or_else(|| DomainError::DatabaseError(format!("person {} not found", person_id)))
    }
}

#[async_trait]
impl HierarchyTx for InMemoryTx {
    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, DomainError> {
        Ok(self.state.tenants.get(&tenant_id).cloned())
    }

    async fn set_group_sync_state(&mut self, tenant_id: Uuid, state: GroupSyncState) -> Result<(), DomainError> {
        let tenant = self
            .state
            .tenants
            .get_mut(&tenant_id)
            .ok_or(DomainError::TenantNotFound(tenant_id))?;
        tenant.group_sync_state = state;
        tenant.updated_at = Some(Utc::now());
        self.state.writes += 1;
        Ok(())
    }

    async fn mark_crm_roles_synced(&mut self, tenant_id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError> {
        let tenant = self
            .state
            .tenants
            .get_mut(&tenant_id)
            .ok_or(DomainError::TenantNotFound(tenant_id))?;
        tenant.crm_roles_synced_at = Some(at);
        self.state.writes += 1;
        Ok(())
    }

    async fn list_groups(&mut self, tenant_id: Uuid) -> Result<Vec<Group>, DomainError> {
        Ok(self.state.groups_of(tenant_id).cloned().collect())
    }

    async fn find_group(&mut self, tenant_id: Uuid, group_id: Uuid) -> Result<Option<Group>, DomainError> {
        Ok(self.state.groups.get(&(tenant_id, group_id)).cloned())
    }

    async fn upsert_group(&mut self, group: &Group) -> Result<(), DomainError> {
        self.state
            .groups
            .insert((group.tenant_id, group.id), group.clone());
        self.state.writes += 1;
        Ok(())
    }

    async fn update_group_paths(&mut self, tenant_id: Uuid, updates: &[(Uuid, String)]) -> Result<(), DomainError> {
        for (group_id, path) in updates {
            self.group_mut(tenant_id, *group_id)?.path = path.clone();
        }
        if !updates.is_empty() {
            self.state.writes += 1;
        }
        Ok(())
    }

    async fn update_group_types(&mut self, tenant_id: Uuid, updates: &[(Uuid, GroupType)]) -> Result<(), DomainError> {
        for (group_id, group_type) in updates {
            self.group_mut(tenant_id, *group_id)?.group_type = *group_type;
        }
        if !updates.is_empty() {
            self.state.writes += 1;
        }
        Ok(())
    }

    async fn delete_all_groups(&mut self, tenant_id: Uuid) -> Result<u64, DomainError> {
        let before = self.state.groups.len();
        self.state.groups.retain(|(tid, _), _| *tid != tenant_id);
        self.state.writes += 1;
        Ok((before - self.state.groups.len()) as u64)
    }

    async fn list_people(&mut self, tenant_id: Uuid) -> Result<Vec<Person>, DomainError> {
        Ok(self.state.people_of(tenant_id).cloned().collect())
    }

    async fn update_person_groups(&mut self, tenant_id: Uuid, updates: &[(Uuid, Option<Uuid>)]) -> Result<(), DomainError> {
        let now = Utc::now();
        for (person_id, group_id) in updates {
            let person = self.person_mut(tenant_id, *person_id)?;
            person.group_id = *group_id;
            person.updated_at = Some(now);
        }
        if !updates.is_empty() {
            self.state.writes += 1;
        }
        Ok(())
    }

    async fn update_person_types(&mut self, tenant_id: Uuid, updates: &[(Uuid, GroupType)]) -> Result<(), DomainError> {
        for (person_id, person_type) in updates {
            self.person_mut(tenant_id, *person_id)?.person_type = *person_type;
        }
        if !updates.is_empty() {
            self.state.writes += 1;
        }
        Ok(())
    }

    async fn clear_person_groups(&mut self, tenant_id: Uuid) -> Result<Vec<Uuid>, DomainError> {
        let now = Utc::now();
        let mut cleared = Vec::new();
        for person in self.state.people.values_mut() {
            if person.tenant_id == tenant_id && person.group_id.is_some() {
                person.group_id = None;
                person.updated_at = Some(now);
                cleared.push(person.id);
            }
        }
        self.state.writes += 1;
        Ok(cleared)
    }

    async fn list_crm_roles(&mut self, tenant_id: Uuid) -> Result<Vec<CrmRole>, DomainError> {
        Ok(self
            .state
            .crm_roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn upsert_crm_roles(&mut self, roles: &[CrmRole]) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for role in roles {
            if seen.insert((role.tenant_id, role.id.clone())) {
                self.state
                    .crm_roles
                    .insert((role.tenant_id, role.id.clone()), role.clone());
            }
        }
        if !roles.is_empty() {
            self.state.writes += 1;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryTx { state, committed, _guard } = *self;
        *committed.write() = state;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::path_label;

    fn group_with_path(tenant_id: Uuid, name: &str, parent: Option<&Group>) -> Group {
        let mut group = Group::new(tenant_id, Uuid::new_v4(), name.to_string(), None);
        group.parent_id = parent.map(|p| p.id);
        group.path = match parent {
            Some(p) => format!("{}.{}", p.path, path_label(group.id)),
            None => path_label(group.id),
        };
        group
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryHierarchyStore::new();
        let tenant_id = Uuid::new_v4();
        store.insert_tenant(Tenant::new(tenant_id, "Acme".to_string()));

        let mut tx = store.begin(tenant_id).await.unwrap();
        tx.set_group_sync_state(tenant_id, GroupSyncState::Active).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.tenant(tenant_id).unwrap().group_sync_state, GroupSyncState::Inactive);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = InMemoryHierarchyStore::new();
        let tenant_id = Uuid::new_v4();
        store.insert_tenant(Tenant::new(tenant_id, "Acme".to_string()));
        let group = Group::new(tenant_id, Uuid::new_v4(), "Sales".to_string(), None);

        let mut tx = store.begin(tenant_id).await.unwrap();
        tx.upsert_group(&group).await.unwrap();
        assert!(store.group(tenant_id, group.id).is_none());
        tx.commit().await.unwrap();

        assert_eq!(store.group(tenant_id, group.id), Some(group));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_writer() {
        let store = InMemoryHierarchyStore::new();
        let tenant_id = Uuid::new_v4();

        let tx = store.begin(tenant_id).await.unwrap();
        drop(tx);

        let tx = tokio::time::timeout(std::time::Duration::from_secs(1), store.begin(tenant_id)).await;
        assert!(tx.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_subtree_by_path() {
        let store = InMemoryHierarchyStore::new();
        let tenant_id = Uuid::new_v4();
        let root = group_with_path(tenant_id, "Root", None);
        let mid = group_with_path(tenant_id, "Mid", Some(&root));
        let leaf = group_with_path(tenant_id, "Leaf", Some(&mid));
        let other_root = group_with_path(tenant_id, "Other", None);
        for g in [&root, &mid, &leaf, &other_root] {
            store.insert_group(g.clone());
        }
        let mut person = Person::new(tenant_id, "ann@example.com".to_string(), true);
        person.group_id = Some(mid.id);
        store.insert_person(person.clone());

        let rows = store
            .fetch_subtree(&SubtreeQuery {
                tenant_id,
                root_group_ids: vec![mid.id],
                max_depth: None,
                active_only: true,
            })
            .await
            .unwrap();
        let ids: Vec<Uuid> = rows.iter().map(|r| r.group.id).collect();
        assert_eq!(ids, vec![mid.id, leaf.id]);
        assert_eq!(rows[0].members.len(), 1);
        assert_eq!(rows[0].members[0].id, person.id);

        let rows = store
            .fetch_subtree(&SubtreeQuery {
                tenant_id,
                root_group_ids: Vec::new(),
                max_depth: Some(1),
                active_only: true,
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.group.id != leaf.id));
    }
}
