// ============================================================================
// OrgTree Core - Group Entity
// File: crates/orgtree-core/src/domain/group.rs
// Description: Node of a tenant's organizational tree
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orgtree_shared::constants::PATH_SEPARATOR;

/// Structural type of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Ic,
    Manager,
    Internal,
    Unknown,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Ic => "ic",
            GroupType::Manager => "manager",
            GroupType::Internal => "internal",
            GroupType::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ic" => Some(GroupType::Ic),
            "manager" => Some(GroupType::Manager),
            "internal" => Some(GroupType::Internal),
            "unknown" => Some(GroupType::Unknown),
            _ => None,
        }
    }
}

impl Default for GroupType {
    fn default() -> Self {
        GroupType::Unknown
    }
}

/// Group lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Inactive,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Active => "active",
            GroupStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GroupStatus::Active),
            "inactive" => Some(GroupStatus::Inactive),
            _ => None,
        }
    }
}

impl Default for GroupStatus {
    fn default() -> Self {
        GroupStatus::Active
    }
}

/// Group entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,

    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub status: GroupStatus,

    /// Permission roles granted to members
    pub role_ids: Vec<Uuid>,
    /// CRM roles this group is synchronized from, in source order
    pub crm_role_ids: Vec<String>,

    pub parent_id: Option<Uuid>,
    pub path: String,
    pub order: i32,

    pub sync_filter: Option<serde_json::Value>,
    pub opportunity_filter: Option<serde_json::Value>,

    // Audit fields
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
}

impl Group {
    pub fn new(tenant_id: Uuid, id: Uuid, name: String, created_by: Option<Uuid>) -> Self {
        Self {
            id,
            tenant_id,
            name: name.trim().to_string(),
            group_type: GroupType::Unknown,
            status: GroupStatus::Active,
            role_ids: Vec::new(),
            crm_role_ids: Vec::new(),
            parent_id: None,
            path: path_label(id),
            order: 0,
            sync_filter: None,
            opportunity_filter: None,
            created_at: Utc::now(),
            created_by,
            updated_at: None,
            updated_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GroupStatus::Active
    }

    pub fn is_internal(&self) -> bool {
        self.group_type == GroupType::Internal
    }

    /// This group's own path segment.
    pub fn label(&self) -> String {
        path_label(self.id)
    }

    pub fn has_crm_role(&self, crm_role_id: &str) -> bool {
        self.crm_role_ids.iter().any(|id| id == crm_role_id)
    }

    pub fn shares_crm_role_with(&self, crm_role_ids: &[String]) -> bool {
        crm_role_ids.iter().any(|id| self.has_crm_role(id))
    }

    pub fn touch(&mut self, updated_by: Option<Uuid>) {
        self.updated_at = Some(Utc::now());
        self.updated_by = updated_by;
    }

    /// Groups are never hard-deleted outside a hierarchy reset; they lose
    /// their CRM linkage and stay around as inactive records.
    pub fn soft_delete(&mut self, deleted_by: Option<Uuid>) {
        self.status = GroupStatus::Inactive;
        self.crm_role_ids.clear();
        self.touch(deleted_by);
    }

    /// Compares the fields owned by the hierarchy engine, ignoring audit data.
    pub fn same_structure(&self, other: &Group) -> bool {
        self.name == other.name
            && self.group_type == other.group_type
            && self.status == other.status
            && self.crm_role_ids == other.crm_role_ids
            && self.parent_id == other.parent_id
    }
}

/// Renders a group id as a materialized path segment.
pub fn path_label(id: Uuid) -> String {
    id.simple().to_string()
}

/// Number of segments in a materialized path.
pub fn path_depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split(PATH_SEPARATOR).count()
    }
}

/// True when `path` equals `ancestor` or lies below it.
pub fn path_is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path[ancestor.len()..].starts_with(PATH_SEPARATOR))
}

/// Trims, drops empty entries, and removes duplicates while keeping source order.
pub fn normalize_crm_role_ids(ids: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !normalized.iter().any(|existing| existing == id) {
            normalized.push(id.to_string());
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_group() {
        let tenant_id = Uuid::new_v4();
        let id = Uuid::new_v4();
        let group = Group::new(tenant_id, id, "  Sales  ".to_string(), None);

        assert_eq!(group.name, "Sales");
        assert!(group.is_active());
        assert_eq!(group.path, path_label(id));
        assert_eq!(group.group_type, GroupType::Unknown);
    }

    #[test]
    fn test_soft_delete_clears_crm_roles() {
        let mut group = Group::new(Uuid::new_v4(), Uuid::new_v4(), "Ops".to_string(), None);
        group.crm_role_ids = vec!["R1".to_string()];
        let actor = Uuid::new_v4();

        group.soft_delete(Some(actor));

        assert!(!group.is_active());
        assert!(group.crm_role_ids.is_empty());
        assert_eq!(group.updated_by, Some(actor));
    }

    #[test]
    fn test_path_label_is_ltree_safe() {
        let label = path_label(Uuid::new_v4());
        assert_eq!(label.len(), 32);
        assert!(label.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(path_depth(""), 0);
        assert_eq!(path_depth("a"), 1);
        assert_eq!(path_depth("a.b.c"), 3);

        assert!(path_is_within("a.b", "a"));
        assert!(path_is_within("a", "a"));
        assert!(!path_is_within("ab.c", "a"));
        assert!(!path_is_within("a", "a.b"));
    }

    #[test]
    fn test_normalize_crm_role_ids() {
        let ids = vec![
            " R2 ".to_string(),
            "R1".to_string(),
            "".to_string(),
            "R2".to_string(),
        ];
        assert_eq!(normalize_crm_role_ids(ids), vec!["R2".to_string(), "R1".to_string()]);
    }
}
