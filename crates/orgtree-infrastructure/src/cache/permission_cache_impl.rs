// ============================================================================
// OrgTree Infrastructure - Redis Permission Cache
// File: crates/orgtree-infrastructure/src/cache/permission_cache_impl.rs
// ============================================================================
//! Cached permissions live under `{prefix}:{tenant_id}:{user_id}`.
//! Invalidation deletes the keys; the next permission check rebuilds them.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use tracing::{debug, error};
use uuid::Uuid;

use orgtree_core::error::DomainError;
use orgtree_core::repositories::PermissionCache;
use orgtree_shared::config::RedisSettings;

pub fn create_redis_pool(settings: &RedisSettings) -> Result<Pool, DomainError> {
    let mut config = Config::from_url(settings.url.clone());
    config.pool = Some(PoolConfig::new(settings.max_connections));
    config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
        error!("Failed to create Redis pool: {}", e);
        DomainError::CacheError(e.to_string())
    })
}

pub fn permission_key(prefix: &str, tenant_id: Uuid, user_id: Uuid) -> String {
    format!("{}:{}:{}", prefix, tenant_id, user_id)
}

pub struct RedisPermissionCache {
    pool: Pool,
    key_prefix: String,
}

impl RedisPermissionCache {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    async fn delete_keys(&self, keys: Vec<String>) -> Result<(), DomainError> {
        let mut conn = self.pool.get().await.map_err(|e| {
            error!("Redis pool error: {}", e);
            DomainError::CacheError(e.to_string())
        })?;
        let removed: i64 = deadpool_redis::redis::cmd("DEL")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis error deleting permission keys: {}", e);
                DomainError::CacheError(e.to_string())
            })?;
        debug!("Invalidated {} of {} permission cache entries", removed, keys.len());
        Ok(())
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn invalidate(&self, tenant_id: Uuid, user_id: Uuid) -> Result<(), DomainError> {
        self.delete_keys(vec![permission_key(&self.key_prefix, tenant_id, user_id)])
            .await
    }

    async fn invalidate_many(&self, tenant_id: Uuid, user_ids: &[Uuid]) -> Result<(), DomainError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let keys = user_ids
            .iter()
            .map(|user_id| permission_key(&self.key_prefix, tenant_id, *user_id))
            .collect();
        self.delete_keys(keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key_layout() {
        let tenant_id = Uuid::nil();
        let user_id = Uuid::from_u128(1);
        assert_eq!(
            permission_key("perm", tenant_id, user_id),
            format!("perm:{}:{}", tenant_id, user_id)
        );
    }

    #[tokio::test]
    async fn test_invalidate_many_without_users_skips_redis() {
        let settings = RedisSettings {
            url: "redis://127.0.0.1:1".to_string(),
            max_connections: 1,
            key_prefix: "perm".to_string(),
        };
        let pool = create_redis_pool(&settings).unwrap();
        let cache = RedisPermissionCache::new(pool, settings.key_prefix);
        assert!(cache.invalidate_many(Uuid::new_v4(), &[]).await.is_ok());
    }
}
