//! # OrgTree Core - Domain Module
//! 
//! Domain entities for the group hierarchy.

pub mod group;
pub mod person;
pub mod tenant;
pub mod crm_role;
pub mod group_patch;
pub mod tree;

// Re-export all entities and enums
pub use group::{Group, GroupType, GroupStatus, path_label, path_depth, path_is_within, normalize_crm_role_ids};
pub use person::{Person, PersonStatus};
pub use tenant::{Tenant, GroupSyncState};
pub use crm_role::CrmRole;
pub use group_patch::{NewGroup, GroupPatch, PatchEffects};
pub use tree::{SubtreeRequest, GroupWithMembers, TreeMember, GroupTreeNode, GroupSubtree};
