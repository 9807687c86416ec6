//! # OrgTree Infrastructure
//! 
//! Database, cache and CRM feed implementations (adapters).

pub mod database;
pub mod cache;
pub mod crm;

pub use database::{create_pool, run_migrations, PgHierarchyStore};
pub use cache::{create_redis_pool, RedisPermissionCache};
pub use crm::HttpCrmRoleFeed;
