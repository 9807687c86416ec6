//! Subtree request and result types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::crm_role::CrmRole;
use super::group::Group;
use super::person::Person;

/// Parameters of a subtree read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtreeRequest {
    pub tenant_id: Uuid,
    /// Start below this group; tenant roots when absent
    #[serde(default)]
    pub root_group_id: Option<Uuid>,
    /// Hops below the root(s); unlimited when absent
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub hydrate_members: bool,
    #[serde(default)]
    pub hydrate_crm_roles: bool,
    #[serde(default)]
    pub simplify: bool,
    #[serde(default = "default_true")]
    pub active_only: bool,
    #[serde(default)]
    pub use_manager_names: bool,
    #[serde(default)]
    pub exclude_manager_users: bool,
    /// Synthetic roots for permission-scoped views
    #[serde(default)]
    pub viewable_group_ids: Vec<Uuid>,
}

fn default_true() -> bool {
    true
}

impl SubtreeRequest {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            root_group_id: None,
            max_depth: None,
            hydrate_members: false,
            hydrate_crm_roles: false,
            simplify: false,
            active_only: true,
            use_manager_names: false,
            exclude_manager_users: false,
            viewable_group_ids: Vec::new(),
        }
    }
}

/// Flat row returned by the store: a group and its direct members
#[derive(Debug, Clone)]
pub struct GroupWithMembers {
    pub group: Group,
    pub members: Vec<TreeMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeMember {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTreeNode {
    pub group: Group,
    pub display_name: String,
    pub members: Vec<TreeMember>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crm_roles: Vec<CrmRole>,
    pub children: Vec<GroupTreeNode>,
    /// Levels in this subtree; a leaf has depth 1
    pub depth: u32,
}

impl GroupTreeNode {
    /// Recomputes `depth` for this node and everything below it.
    pub fn recompute_depth(&mut self) -> u32 {
        let deepest = self
            .children
            .iter_mut()
            .map(|child| child.recompute_depth())
            .max()
            .unwrap_or(0);
        self.depth = deepest + 1;
        self.depth
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSubtree {
    pub roots: Vec<GroupTreeNode>,
    pub depth: u32,
}
