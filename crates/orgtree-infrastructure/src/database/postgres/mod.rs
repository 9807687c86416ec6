//! PostgreSQL repository implementations

mod rows;
pub mod hierarchy_store_impl;

pub use hierarchy_store_impl::{PgHierarchyStore, PgHierarchyTx};
