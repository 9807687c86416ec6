//! Cache module (Redis adapters)

pub mod permission_cache_impl;

pub use permission_cache_impl::{create_redis_pool, RedisPermissionCache};
