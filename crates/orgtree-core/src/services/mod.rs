//! Hierarchy engine services (business logic)

pub mod path_maintainer;
pub mod group_sync;
pub mod type_classifier;
pub mod person_reconciler;
pub mod sync_state;
pub mod subtree_builder;
pub mod hierarchy_service;

pub use hierarchy_service::{
    DeleteResult, HierarchyService, ImportOutcome, SyncMode, SyncOutcome, SyncSummary, WriteOutcome,
};
pub use person_reconciler::MembershipChange;
pub use subtree_builder::SubtreeBuilder;
pub use sync_state::{ResetResult, SyncFacts, SyncStateTransition};
