//! Repository and collaborator traits (ports)

pub mod hierarchy_store;
pub mod crm_feed;
pub mod permission_cache;
pub mod memory;

pub use hierarchy_store::{HierarchyStore, HierarchyTx, SubtreeQuery};
pub use crm_feed::{CrmRoleFeed, CrmRolePage};
pub use permission_cache::PermissionCache;
pub use memory::InMemoryHierarchyStore;
