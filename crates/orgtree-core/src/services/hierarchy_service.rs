// ============================================================================
// OrgTree Core - Hierarchy Service
// File: crates/orgtree-core/src/services/hierarchy_service.rs
// Description: Transactional orchestration of the hierarchy engine
// ============================================================================
//! Every write runs its stages in a fixed order inside one transaction:
//! synchronizer, paths, types, reconciliation, sync state. Writes for one
//! tenant are serialized and bounded by the configured operation timeout.
//! Permission caches are invalidated after commit; a failed invalidation is
//! reported in the outcome and never undoes the commit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use orgtree_shared::config::EngineSettings;
use orgtree_shared::types::ActorId;

use crate::domain::{
    CrmRole, Group, GroupPatch, GroupSubtree, NewGroup, PatchEffects, SubtreeRequest, Tenant,
};
use crate::error::DomainError;
use crate::repositories::{CrmRoleFeed, HierarchyStore, HierarchyTx, PermissionCache};
use crate::services::group_sync::{self, GroupSyncReport};
use crate::services::path_maintainer;
use crate::services::person_reconciler::{self, MembershipChange};
use crate::services::subtree_builder::SubtreeBuilder;
use crate::services::sync_state::{self, ResetResult, SyncFacts, SyncStateTransition};
use crate::services::type_classifier::{self, TypeChanges};

/// When the synchronizer may rewrite a tenant's groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Only when the hierarchy is already CRM-derived or still empty
    #[default]
    IfSynced,
    /// Take over an existing hand-built hierarchy
    Adopt,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub retired: Vec<Uuid>,
    pub paths_updated: usize,
    pub group_types_updated: usize,
    pub person_types_updated: usize,
    pub memberships: Vec<MembershipChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped { reason: String },
    Synced(SyncSummary),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub roles_imported: usize,
    pub pages: usize,
    pub sync: SyncOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub group_id: Uuid,
    /// Children moved up to the deleted group's parent
    pub reparented_children: Vec<Uuid>,
    pub memberships: Vec<MembershipChange>,
    /// Set when the delete removed the last active group
    pub reset: Option<ResetResult>,
}

/// Result of a committed write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOutcome<T> {
    pub value: T,
    /// People whose permission cache entries were invalidated
    pub invalidated: Vec<Uuid>,
    pub invalidation_error: Option<String>,
    pub sync_state: SyncStateTransition,
}

/// What a transaction produced before commit
struct Staged<T> {
    value: T,
    invalidate: Vec<Uuid>,
    sync_state: SyncStateTransition,
}

type StageFuture<'t, T> = BoxFuture<'t, Result<Staged<T>, DomainError>>;

/// Changes made by the shared tail of every write
#[derive(Debug, Default)]
struct Consistency {
    paths: usize,
    types: TypeChanges,
    memberships: Vec<MembershipChange>,
    sync_state: Option<SyncStateTransition>,
}

impl Consistency {
    fn changed_people(&self) -> Vec<Uuid> {
        self.memberships.iter().map(|c| c.person_id).collect()
    }

    fn transition(&self, tenant: &Tenant) -> SyncStateTransition {
        self.sync_state
            .unwrap_or_else(|| SyncStateTransition::unchanged(tenant.group_sync_state))
    }
}

pub struct HierarchyService<S: HierarchyStore> {
    store: Arc<S>,
    permission_cache: Arc<dyn PermissionCache>,
    crm_feed: Arc<dyn CrmRoleFeed>,
    settings: EngineSettings,
    tenant_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    subtree_builder: SubtreeBuilder<S>,
}

impl<S: HierarchyStore> HierarchyService<S> {
    pub fn new(
        store: Arc<S>,
        permission_cache: Arc<dyn PermissionCache>,
        crm_feed: Arc<dyn CrmRoleFeed>,
        settings: EngineSettings,
    ) -> Self {
        let subtree_builder = SubtreeBuilder::new(store.clone(), &settings);
        Self {
            store,
            permission_cache,
            crm_feed,
            settings,
            tenant_locks: DashMap::new(),
            subtree_builder,
        }
    }

    /// Derives groups from the tenant's stored CRM roles.
    #[instrument(skip(self))]
    pub async fn sync_groups(&self, tenant_id: Uuid, mode: SyncMode) -> Result<WriteOutcome<SyncOutcome>, DomainError> {
        validate_tenant_id(tenant_id)?;
        self.execute("sync_groups", tenant_id, move |tx| Box::pin(sync_stage(tx, tenant_id, mode)))
            .await
    }

    /// Drains the CRM feed, stores the roles, then synchronizes groups if the
    /// hierarchy is CRM-derived.
    #[instrument(skip(self))]
    pub async fn import_crm_roles(
        &self,
        tenant_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<WriteOutcome<ImportOutcome>, DomainError> {
        validate_tenant_id(tenant_id)?;
        let (roles, pages) = self
            .drain_crm_feed(tenant_id, since)
            .await
            .map_err(|e| e.context("import_crm_roles", tenant_id))?;

        self.execute("import_crm_roles", tenant_id, move |tx| {
            Box::pin(import_stage(tx, tenant_id, roles, pages))
        })
        .await
    }

    /// Creates a hand-made group. An acting user is required: groups without
    /// a creator are the synchronizer's and may be retired by the next sync.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_group(
        &self,
        tenant_id: Uuid,
        actor: ActorId,
        input: NewGroup,
    ) -> Result<WriteOutcome<Group>, DomainError> {
        validate_tenant_id(tenant_id)?;
        let Some(actor_id) = actor else {
            return Err(DomainError::ValidationError(
                "Creating a group requires an acting user".to_string(),
            ));
        };
        input.validate()?;
        let group = input.into_group(tenant_id, Uuid::new_v4(), Some(actor_id));
        validate_group_name(&group.name)?;

        self.execute("create_group", tenant_id, move |tx| Box::pin(create_stage(tx, group)))
            .await
    }

    #[instrument(skip(self, patch))]
    pub async fn update_group(
        &self,
        tenant_id: Uuid,
        actor: ActorId,
        group_id: Uuid,
        patch: GroupPatch,
    ) -> Result<WriteOutcome<Group>, DomainError> {
        validate_tenant_id(tenant_id)?;
        if let Some(name) = &patch.name {
            validate_group_name(name.trim())?;
        }

        self.execute("update_group", tenant_id, move |tx| {
            Box::pin(update_stage(tx, tenant_id, actor, group_id, patch))
        })
        .await
    }

    /// Soft-deletes a group and moves its children to its parent. Removing the
    /// last active group resets the tenant's hierarchy.
    #[instrument(skip(self))]
    pub async fn delete_group_by_id(
        &self,
        tenant_id: Uuid,
        actor: ActorId,
        group_id: Uuid,
    ) -> Result<WriteOutcome<DeleteResult>, DomainError> {
        validate_tenant_id(tenant_id)?;
        self.execute("delete_group", tenant_id, move |tx| {
            Box::pin(delete_stage(tx, tenant_id, actor, group_id))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn reset_hierarchy(&self, tenant_id: Uuid, actor: ActorId) -> Result<WriteOutcome<ResetResult>, DomainError> {
        validate_tenant_id(tenant_id)?;
        self.execute("reset_hierarchy", tenant_id, move |tx| Box::pin(reset_stage(tx, tenant_id, actor)))
            .await
    }

    /// Re-runs membership reconciliation for the whole tenant.
    #[instrument(skip(self))]
    pub async fn update_person_groups(&self, tenant_id: Uuid) -> Result<WriteOutcome<Vec<MembershipChange>>, DomainError> {
        validate_tenant_id(tenant_id)?;
        self.execute("update_person_groups", tenant_id, move |tx| {
            Box::pin(reconcile_stage(tx, tenant_id))
        })
        .await
    }

    pub async fn get_group_subtree(&self, request: SubtreeRequest) -> Result<GroupSubtree, DomainError> {
        let tenant_id = request.tenant_id;
        validate_tenant_id(tenant_id)?;
        self.store
            .find_tenant(tenant_id)
            .await?
            .ok_or(DomainError::TenantNotFound(tenant_id))
            .map_err(|e| e.context("get_group_subtree", tenant_id))?;

        self.subtree_builder
            .build(&request)
            .await
            .map_err(|e| e.context("get_group_subtree", tenant_id))
    }

    /// Evaluates the sync facts without writing anything.
    pub async fn is_crm_synced(&self, tenant_id: Uuid) -> Result<bool, DomainError> {
        validate_tenant_id(tenant_id)?;
        let mut tx = self.store.begin(tenant_id).await?;
        let facts = match read_facts(tx.as_mut(), tenant_id).await {
            Ok(facts) => facts,
            Err(e) => {
                rollback_quietly(tx, tenant_id).await;
                return Err(e.context("is_crm_synced", tenant_id));
            }
        };
        tx.rollback().await?;
        Ok(sync_state::is_crm_synced(&facts))
    }

    fn tenant_lock(&self, tenant_id: Uuid) -> Arc<Mutex<()>> {
        self.tenant_locks.entry(tenant_id).or_default().value().clone()
    }

    /// Runs `stages` in a transaction under the tenant lock and the operation
    /// timeout, then invalidates caches for the affected people.
    async fn execute<T, F>(&self, op: &'static str, tenant_id: Uuid, stages: F) -> Result<WriteOutcome<T>, DomainError>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn HierarchyTx) -> StageFuture<'t, T> + Send,
    {
        let lock = self.tenant_lock(tenant_id);
        let _guard = lock.lock().await;

        let limit = Duration::from_millis(self.settings.operation_timeout_ms);
        let staged = match tokio::time::timeout(limit, self.run_in_transaction(tenant_id, stages)).await {
            Ok(Ok(staged)) => staged,
            Ok(Err(e)) => {
                error!("{} failed for tenant {}: {}", op, tenant_id, e);
                return Err(e.context(op, tenant_id));
            }
            Err(_) => {
                warn!("{} timed out after {:?} for tenant {}", op, limit, tenant_id);
                return Err(DomainError::Timeout(format!("{} exceeded {} ms", op, limit.as_millis()))
                    .context(op, tenant_id));
            }
        };

        Ok(self.invalidate_after_commit(tenant_id, staged).await)
    }

    async fn run_in_transaction<T, F>(&self, tenant_id: Uuid, stages: F) -> Result<Staged<T>, DomainError>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn HierarchyTx) -> StageFuture<'t, T>,
    {
        let mut tx = self.store.begin(tenant_id).await?;
        match stages(tx.as_mut()).await {
            Ok(staged) => {
                tx.commit().await?;
                Ok(staged)
            }
            Err(e) => {
                rollback_quietly(tx, tenant_id).await;
                Err(e)
            }
        }
    }

    async fn invalidate_after_commit<T>(&self, tenant_id: Uuid, staged: Staged<T>) -> WriteOutcome<T> {
        let Staged {
            value,
            mut invalidate,
            sync_state,
        } = staged;
        invalidate.sort();
        invalidate.dedup();

        let mut invalidation_error = None;
        if !invalidate.is_empty() {
            if let Err(e) = self.permission_cache.invalidate_many(tenant_id, &invalidate).await {
                warn!(
                    "Permission cache invalidation failed for {} people in tenant {}: {}",
                    invalidate.len(),
                    tenant_id,
                    e
                );
                invalidation_error = Some(e.to_string());
            }
        }

        WriteOutcome {
            value,
            invalidated: invalidate,
            invalidation_error,
            sync_state,
        }
    }

    async fn drain_crm_feed(
        &self,
        tenant_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<(Vec<CrmRole>, usize), DomainError> {
        let mut latest: BTreeMap<String, CrmRole> = BTreeMap::new();
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .crm_feed
                .get_latest_changed_roles(tenant_id, since, token.clone())
                .await?;
            pages += 1;
            for mut role in page.roles {
                role.tenant_id = tenant_id;
                latest.insert(role.id.clone(), role);
            }

            let Some(next) = page.next_page_token else { break };
            if !seen_tokens.insert(next.clone()) {
                return Err(DomainError::CrmFeedError(format!("feed repeated page token {}", next)));
            }
            token = Some(next);
        }

        info!(
            "Drained {} CRM roles in {} pages for tenant {}",
            latest.len(),
            pages,
            tenant_id
        );
        Ok((latest.into_values().collect(), pages))
    }
}

fn validate_tenant_id(tenant_id: Uuid) -> Result<(), DomainError> {
    if tenant_id.is_nil() {
        return Err(DomainError::InvalidTenantId);
    }
    Ok(())
}

fn validate_group_name(name: &str) -> Result<(), DomainError> {
    let len = name.chars().count();
    if len == 0 || len > 200 {
        return Err(DomainError::ValidationError(
            "Group name must be between 1 and 200 characters".to_string(),
        ));
    }
    Ok(())
}

async fn rollback_quietly(tx: Box<dyn HierarchyTx>, tenant_id: Uuid) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback failed for tenant {}: {}", tenant_id, e);
    }
}

async fn require_tenant(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<Tenant, DomainError> {
    tx.find_tenant(tenant_id)
        .await?
        .ok_or(DomainError::TenantNotFound(tenant_id))
}

async fn read_facts(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<SyncFacts, DomainError> {
    require_tenant(tx, tenant_id).await?;
    sync_state::load_sync_facts(tx, tenant_id).await
}

/// Rejects `group` when another active group already carries one of its CRM roles.
fn check_duplicate_crm_roles(group: &Group, groups: &[Group]) -> Result<(), DomainError> {
    if !group.is_active() || group.crm_role_ids.is_empty() {
        return Ok(());
    }
    let conflict = groups
        .iter()
        .filter(|other| other.id != group.id && other.is_active())
        .find(|other| other.shares_crm_role_with(&group.crm_role_ids));

    match conflict {
        Some(other) => Err(DomainError::DuplicateCrmRoles {
            crm_role_ids: group
                .crm_role_ids
                .iter()
                .filter(|id| other.has_crm_role(id))
                .cloned()
                .collect(),
            group_id: other.id,
        }),
        None => Ok(()),
    }
}

/// `parent_id` must be an active group that is not `group_id` or below it.
fn check_parent(groups: &[Group], group_id: Uuid, parent_id: Uuid) -> Result<(), DomainError> {
    if parent_id == group_id {
        return Err(DomainError::SelfParent(group_id));
    }
    let by_id: HashMap<Uuid, &Group> = groups.iter().map(|g| (g.id, g)).collect();
    if !by_id.get(&parent_id).map_or(false, |p| p.is_active()) {
        return Err(DomainError::ParentNotFound(parent_id));
    }

    let mut visited = HashSet::new();
    let mut cursor = Some(parent_id);
    while let Some(id) = cursor {
        if id == group_id {
            return Err(DomainError::ParentCycle { group_id, parent_id });
        }
        if !visited.insert(id) {
            break;
        }
        cursor = by_id.get(&id).and_then(|g| g.parent_id);
    }
    Ok(())
}

/// Paths, types, reconciliation and sync state, as far as `effects` asks.
async fn restore_consistency(
    tx: &mut dyn HierarchyTx,
    tenant_id: Uuid,
    effects: PatchEffects,
) -> Result<Consistency, DomainError> {
    let mut consistency = Consistency::default();
    if effects.paths {
        consistency.paths = path_maintainer::update_group_paths(tx, tenant_id).await?;
    }
    if effects.types {
        consistency.types = type_classifier::update_group_types(tx, tenant_id).await?;
    }
    if effects.reconcile {
        consistency.memberships = person_reconciler::update_person_groups(tx, tenant_id).await?;
        if !consistency.memberships.is_empty() {
            consistency.types.people += type_classifier::update_person_types(tx, tenant_id).await?;
        }
    }
    if effects.sync_state {
        consistency.sync_state = Some(sync_state::ensure_tenant_group_sync_state(tx, tenant_id).await?);
    }
    Ok(consistency)
}

async fn sync_stage(tx: &mut dyn HierarchyTx, tenant_id: Uuid, mode: SyncMode) -> Result<Staged<SyncOutcome>, DomainError> {
    let tenant = require_tenant(tx, tenant_id).await?;
    let facts = sync_state::load_sync_facts(tx, tenant_id).await?;
    let gate = SyncGate::evaluate(&facts, mode);
    run_sync(tx, &tenant, gate).await
}

/// Whether a sync may proceed, decided from the hierarchy as it stood before
/// any roles were stored in the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SyncGate {
    has_roles: bool,
    accepted: bool,
}

impl SyncGate {
    fn evaluate(facts: &SyncFacts, mode: SyncMode) -> Self {
        Self {
            has_roles: facts.crm_roles > 0,
            accepted: mode == SyncMode::Adopt || sync_state::accepts_crm_sync(facts),
        }
    }
}

async fn run_sync(tx: &mut dyn HierarchyTx, tenant: &Tenant, gate: SyncGate) -> Result<Staged<SyncOutcome>, DomainError> {
    let tenant_id = tenant.id;
    if !gate.has_roles {
        info!("Skipping group sync for tenant {}: no CRM roles", tenant_id);
        return Ok(Staged {
            value: SyncOutcome::Skipped {
                reason: "tenant has no CRM roles".to_string(),
            },
            invalidate: Vec::new(),
            sync_state: SyncStateTransition::unchanged(tenant.group_sync_state),
        });
    }
    if !gate.accepted {
        info!("Skipping group sync for tenant {}: hierarchy is not CRM-synced", tenant_id);
        let sync_state = sync_state::ensure_tenant_group_sync_state(tx, tenant_id).await?;
        return Ok(Staged {
            value: SyncOutcome::Skipped {
                reason: "hierarchy is not CRM-synced".to_string(),
            },
            invalidate: Vec::new(),
            sync_state,
        });
    }

    let GroupSyncReport { created, updated } = group_sync::sync_groups(tx, tenant_id).await?;
    let retired = group_sync::delete_unsynced_groups(tx, tenant_id).await?;
    let consistency = restore_consistency(tx, tenant_id, PatchEffects::all()).await?;

    Ok(Staged {
        invalidate: consistency.changed_people(),
        sync_state: consistency.transition(tenant),
        value: SyncOutcome::Synced(SyncSummary {
            created,
            updated,
            retired,
            paths_updated: consistency.paths,
            group_types_updated: consistency.types.groups,
            person_types_updated: consistency.types.people,
            memberships: consistency.memberships,
        }),
    })
}

async fn import_stage(
    tx: &mut dyn HierarchyTx,
    tenant_id: Uuid,
    roles: Vec<CrmRole>,
    pages: usize,
) -> Result<Staged<ImportOutcome>, DomainError> {
    let tenant = require_tenant(tx, tenant_id).await?;
    let facts = sync_state::load_sync_facts(tx, tenant_id).await?;
    let mut gate = SyncGate::evaluate(&facts, SyncMode::IfSynced);
    gate.has_roles |= !roles.is_empty();

    if !roles.is_empty() {
        tx.upsert_crm_roles(&roles).await?;
    }
    tx.mark_crm_roles_synced(tenant_id, Utc::now()).await?;

    let Staged {
        value,
        invalidate,
        sync_state,
    } = run_sync(tx, &tenant, gate).await?;
    Ok(Staged {
        value: ImportOutcome {
            roles_imported: roles.len(),
            pages,
            sync: value,
        },
        invalidate,
        sync_state,
    })
}

async fn create_stage(tx: &mut dyn HierarchyTx, group: Group) -> Result<Staged<Group>, DomainError> {
    let tenant_id = group.tenant_id;
    let tenant = require_tenant(tx, tenant_id).await?;
    let groups = tx.list_groups(tenant_id).await?;

    check_duplicate_crm_roles(&group, &groups)?;
    if let Some(parent_id) = group.parent_id {
        if !groups.iter().any(|g| g.id == parent_id && g.is_active()) {
            return Err(DomainError::ParentNotFound(parent_id));
        }
    }

    tx.upsert_group(&group).await?;
    let consistency = restore_consistency(tx, tenant_id, PatchEffects::all()).await?;
    let created = tx
        .find_group(tenant_id, group.id)
        .await?
        .ok_or(DomainError::GroupNotFound(group.id))?;

    info!("Created group {} ({}) for tenant {}", created.id, created.name, tenant_id);
    Ok(Staged {
        invalidate: consistency.changed_people(),
        sync_state: consistency.transition(&tenant),
        value: created,
    })
}

async fn update_stage(
    tx: &mut dyn HierarchyTx,
    tenant_id: Uuid,
    actor: ActorId,
    group_id: Uuid,
    patch: GroupPatch,
) -> Result<Staged<Group>, DomainError> {
    let tenant = require_tenant(tx, tenant_id).await?;
    let groups = tx.list_groups(tenant_id).await?;
    let current = groups
        .iter()
        .find(|g| g.id == group_id)
        .cloned()
        .ok_or(DomainError::GroupNotFound(group_id))?;

    if patch.is_empty() {
        return Ok(Staged {
            value: current,
            invalidate: Vec::new(),
            sync_state: SyncStateTransition::unchanged(tenant.group_sync_state),
        });
    }
    if let Some(Some(parent_id)) = patch.parent_id {
        check_parent(&groups, group_id, parent_id)?;
    }

    let effects = patch.effects(&current);
    let mut updated = current.clone();
    patch.apply(&mut updated);

    if current.is_active() && !updated.is_active() {
        let retirement = retire_group(tx, &tenant, &groups, updated, actor).await?;
        return Ok(Staged {
            value: retirement.group,
            invalidate: retirement.invalidate,
            sync_state: retirement.sync_state,
        });
    }

    if !updated.is_active() && patch.crm_role_ids.is_some() && !updated.crm_role_ids.is_empty() {
        return Err(DomainError::ValidationError(format!(
            "Inactive group {} cannot be linked to CRM roles",
            group_id
        )));
    }
    if patch.crm_role_ids.is_some() || patch.status.is_some() {
        check_duplicate_crm_roles(&updated, &groups)?;
    }
    updated.touch(actor);
    tx.upsert_group(&updated).await?;

    let consistency = restore_consistency(tx, tenant_id, effects).await?;
    let mut invalidate = consistency.changed_people();
    if effects.invalidate_members {
        let people = tx.list_people(tenant_id).await?;
        invalidate.extend(people.iter().filter(|p| p.group_id == Some(group_id)).map(|p| p.id));
    }

    let value = tx
        .find_group(tenant_id, group_id)
        .await?
        .ok_or(DomainError::GroupNotFound(group_id))?;
    info!("Updated group {} for tenant {}", group_id, tenant_id);
    Ok(Staged {
        value,
        invalidate,
        sync_state: consistency.transition(&tenant),
    })
}

struct Retirement {
    group: Group,
    reparented_children: Vec<Uuid>,
    memberships: Vec<MembershipChange>,
    reset: Option<ResetResult>,
    invalidate: Vec<Uuid>,
    sync_state: SyncStateTransition,
}

/// Soft-deletes `group`, hands its active children to its parent, and either
/// restores consistency or resets the tenant when nothing active remains.
async fn retire_group(
    tx: &mut dyn HierarchyTx,
    tenant: &Tenant,
    groups: &[Group],
    mut group: Group,
    actor: ActorId,
) -> Result<Retirement, DomainError> {
    group.soft_delete(actor);
    let new_parent = group
        .parent_id
        .filter(|p| groups.iter().any(|g| g.id == *p && g.is_active()));

    let mut reparented_children = Vec::new();
    for child in groups
        .iter()
        .filter(|g| g.is_active() && g.parent_id == Some(group.id))
    {
        let mut child = child.clone();
        child.parent_id = new_parent;
        child.touch(actor);
        tx.upsert_group(&child).await?;
        reparented_children.push(child.id);
    }
    tx.upsert_group(&group).await?;

    let remaining = groups.iter().filter(|g| g.is_active() && g.id != group.id).count();
    if remaining == 0 {
        let (reset, sync_state) = sync_state::reset_hierarchy(tx, tenant.id).await?;
        return Ok(Retirement {
            group,
            reparented_children,
            memberships: Vec::new(),
            invalidate: reset.cleared_people.clone(),
            reset: Some(reset),
            sync_state,
        });
    }

    let consistency = restore_consistency(tx, tenant.id, PatchEffects::all()).await?;
    info!(
        "Retired group {} for tenant {}: {} children reparented, {} people moved",
        group.id,
        tenant.id,
        reparented_children.len(),
        consistency.memberships.len()
    );
    Ok(Retirement {
        group,
        reparented_children,
        invalidate: consistency.changed_people(),
        sync_state: consistency.transition(tenant),
        memberships: consistency.memberships,
        reset: None,
    })
}

async fn delete_stage(
    tx: &mut dyn HierarchyTx,
    tenant_id: Uuid,
    actor: ActorId,
    group_id: Uuid,
) -> Result<Staged<DeleteResult>, DomainError> {
    let tenant = require_tenant(tx, tenant_id).await?;
    let groups = tx.list_groups(tenant_id).await?;
    let group = groups
        .iter()
        .find(|g| g.id == group_id)
        .cloned()
        .ok_or(DomainError::GroupNotFound(group_id))?;

    if !group.is_active() {
        return Ok(Staged {
            value: DeleteResult {
                group_id,
                ..Default::default()
            },
            invalidate: Vec::new(),
            sync_state: SyncStateTransition::unchanged(tenant.group_sync_state),
        });
    }

    let retirement = retire_group(tx, &tenant, &groups, group, actor).await?;
    Ok(Staged {
        value: DeleteResult {
            group_id,
            reparented_children: retirement.reparented_children,
            memberships: retirement.memberships,
            reset: retirement.reset,
        },
        invalidate: retirement.invalidate,
        sync_state: retirement.sync_state,
    })
}

async fn reset_stage(tx: &mut dyn HierarchyTx, tenant_id: Uuid, actor: ActorId) -> Result<Staged<ResetResult>, DomainError> {
    require_tenant(tx, tenant_id).await?;
    let (reset, sync_state) = sync_state::reset_hierarchy(tx, tenant_id).await?;
    info!("Hierarchy reset for tenant {} requested by {:?}", tenant_id, actor);
    Ok(Staged {
        invalidate: reset.cleared_people.clone(),
        value: reset,
        sync_state,
    })
}

async fn reconcile_stage(tx: &mut dyn HierarchyTx, tenant_id: Uuid) -> Result<Staged<Vec<MembershipChange>>, DomainError> {
    let tenant = require_tenant(tx, tenant_id).await?;
    let effects = PatchEffects {
        reconcile: true,
        sync_state: true,
        ..Default::default()
    };
    let consistency = restore_consistency(tx, tenant_id, effects).await?;
    Ok(Staged {
        invalidate: consistency.changed_people(),
        sync_state: consistency.transition(&tenant),
        value: consistency.memberships,
    })
}
