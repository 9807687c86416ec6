// ============================================================================
// OrgTree Core - Group Write Payloads
// File: crates/orgtree-core/src/domain/group_patch.rs
// Description: Typed create/patch inputs and the engine stages they require
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::group::{normalize_crm_role_ids, Group, GroupStatus, GroupType};

/// Input for creating a group directly (outside CRM synchronization)
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewGroup {
    #[validate(length(min = 1, max = 200, message = "Group name must be between 1 and 200 characters"))]
    pub name: String,

    #[serde(default, rename = "type")]
    pub group_type: Option<GroupType>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub role_ids: Vec<Uuid>,
    #[serde(default)]
    pub crm_role_ids: Vec<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub sync_filter: Option<Value>,
    #[serde(default)]
    pub opportunity_filter: Option<Value>,
}

impl NewGroup {
    pub fn into_group(self, tenant_id: Uuid, id: Uuid, created_by: Option<Uuid>) -> Group {
        let mut group = Group::new(tenant_id, id, self.name, created_by);
        // Only `internal` is caller-controlled; everything else is derived from tree shape.
        if self.group_type == Some(GroupType::Internal) {
            group.group_type = GroupType::Internal;
        }
        group.parent_id = self.parent_id;
        group.role_ids = self.role_ids;
        group.crm_role_ids = normalize_crm_role_ids(self.crm_role_ids);
        group.order = self.order;
        group.sync_filter = self.sync_filter;
        group.opportunity_filter = self.opportunity_filter;
        group
    }
}

/// Partial update of a group. Nullable columns use `Option<Option<_>>` so an
/// explicit `null` clears the column while an absent field leaves it alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub group_type: Option<GroupType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GroupStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ids: Option<Vec<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crm_role_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub sync_filter: Option<Option<Value>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub opportunity_filter: Option<Option<Value>>,
}

/// Engine stages a write has to run before commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchEffects {
    pub paths: bool,
    pub types: bool,
    pub reconcile: bool,
    pub sync_state: bool,
    /// Members' effective permissions changed with the group's role set
    pub invalidate_members: bool,
}

impl PatchEffects {
    /// Every stage; used for creates and deletes.
    pub fn all() -> Self {
        Self {
            paths: true,
            types: true,
            reconcile: true,
            sync_state: true,
            invalidate_members: false,
        }
    }
}

impl GroupPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.group_type.is_none()
            && self.status.is_none()
            && self.role_ids.is_none()
            && self.crm_role_ids.is_none()
            && self.parent_id.is_none()
            && self.order.is_none()
            && self.sync_filter.is_none()
            && self.opportunity_filter.is_none()
    }

    /// The patch's CRM role ids after normalization, if present.
    pub fn normalized_crm_role_ids(&self) -> Option<Vec<String>> {
        self.crm_role_ids.clone().map(normalize_crm_role_ids)
    }

    /// Which stages applying this patch to `current` requires.
    pub fn effects(&self, current: &Group) -> PatchEffects {
        let parent_changed = matches!(self.parent_id, Some(parent) if parent != current.parent_id);
        let crm_changed = matches!(
            self.normalized_crm_role_ids(),
            Some(ids) if ids != current.crm_role_ids
        );
        let status_changed = matches!(self.status, Some(status) if status != current.status);
        let type_changed = matches!(self.group_type, Some(t) if t != current.group_type);
        let roles_changed = matches!(&self.role_ids, Some(ids) if *ids != current.role_ids);

        PatchEffects {
            paths: parent_changed || status_changed,
            types: parent_changed || crm_changed || status_changed || type_changed,
            reconcile: crm_changed || status_changed,
            sync_state: crm_changed || status_changed,
            invalidate_members: roles_changed,
        }
    }

    /// Writes the present fields into `group`. Audit fields are left to the caller.
    pub fn apply(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.trim().to_string();
        }
        if let Some(group_type) = self.group_type {
            group.group_type = group_type;
        }
        if let Some(status) = self.status {
            group.status = status;
        }
        if let Some(role_ids) = &self.role_ids {
            group.role_ids = role_ids.clone();
        }
        if let Some(crm_role_ids) = self.normalized_crm_role_ids() {
            group.crm_role_ids = crm_role_ids;
        }
        if let Some(parent_id) = self.parent_id {
            group.parent_id = parent_id;
        }
        if let Some(order) = self.order {
            group.order = order;
        }
        if let Some(sync_filter) = &self.sync_filter {
            group.sync_filter = sync_filter.clone();
        }
        if let Some(opportunity_filter) = &self.opportunity_filter {
            group.opportunity_filter = opportunity_filter.clone();
        }
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> Group {
        let mut group = Group::new(Uuid::new_v4(), Uuid::new_v4(), "Sales".to_string(), None);
        group.crm_role_ids = vec!["R1".to_string()];
        group
    }

    #[test]
    fn test_parent_null_differs_from_absent() {
        let absent: GroupPatch = serde_json::from_str(r#"{"name":"X"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let cleared: GroupPatch = serde_json::from_str(r#"{"parent_id":null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let parent = Uuid::new_v4();
        let set: GroupPatch =
            serde_json::from_str(&format!(r#"{{"parent_id":"{}"}}"#, parent)).unwrap();
        assert_eq!(set.parent_id, Some(Some(parent)));
    }

    #[test]
    fn test_empty_patch() {
        assert!(GroupPatch::default().is_empty());
        let patch = GroupPatch {
            order: Some(3),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_parent_change_requires_paths_and_types() {
        let group = sample_group();
        let patch = GroupPatch {
            parent_id: Some(Some(Uuid::new_v4())),
            ..Default::default()
        };
        let effects = patch.effects(&group);
        assert!(effects.paths);
        assert!(effects.types);
        assert!(!effects.reconcile);
        assert!(!effects.sync_state);
    }

    #[test]
    fn test_crm_role_change_requires_reconciliation() {
        let group = sample_group();
        let patch = GroupPatch {
            crm_role_ids: Some(vec!["R2".to_string()]),
            ..Default::default()
        };
        let effects = patch.effects(&group);
        assert!(effects.reconcile);
        assert!(effects.sync_state);
        assert!(!effects.paths);
    }

    #[test]
    fn test_unchanged_values_trigger_nothing() {
        let group = sample_group();
        let patch = GroupPatch {
            crm_role_ids: Some(vec![" R1 ".to_string(), "R1".to_string()]),
            parent_id: Some(None),
            status: Some(GroupStatus::Active),
            ..Default::default()
        };
        assert_eq!(patch.effects(&group), PatchEffects::default());
    }

    #[test]
    fn test_role_change_invalidates_members() {
        let group = sample_group();
        let patch = GroupPatch {
            role_ids: Some(vec![Uuid::new_v4()]),
            ..Default::default()
        };
        assert!(patch.effects(&group).invalidate_members);
    }

    #[test]
    fn test_apply_patch() {
        let mut group = sample_group();
        group.sync_filter = Some(serde_json::json!({"region": "emea"}));
        let patch = GroupPatch {
            name: Some(" Field Sales ".to_string()),
            sync_filter: Some(None),
            order: Some(2),
            ..Default::default()
        };

        patch.apply(&mut group);

        assert_eq!(group.name, "Field Sales");
        assert_eq!(group.sync_filter, None);
        assert_eq!(group.order, 2);
        assert_eq!(group.crm_role_ids, vec!["R1".to_string()]);
    }

    #[test]
    fn test_new_group_only_keeps_internal_type() {
        let tenant_id = Uuid::new_v4();
        let input = NewGroup {
            name: "Support".to_string(),
            group_type: Some(GroupType::Manager),
            ..Default::default()
        };
        let group = input.into_group(tenant_id, Uuid::new_v4(), None);
        assert_eq!(group.group_type, GroupType::Unknown);

        let input = NewGroup {
            name: "Bots".to_string(),
            group_type: Some(GroupType::Internal),
            ..Default::default()
        };
        let group = input.into_group(tenant_id, Uuid::new_v4(), None);
        assert_eq!(group.group_type, GroupType::Internal);
    }

    #[test]
    fn test_new_group_validation() {
        let input = NewGroup::default();
        assert!(input.validate().is_err());
    }
}
