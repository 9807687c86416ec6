//! Configuration management

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_CRM_PAGE_SIZE, DEFAULT_HYDRATION_CONCURRENCY, DEFAULT_OPERATION_TIMEOUT_MS,
    PERMISSION_CACHE_KEY_PREFIX, SIMPLIFY_MAX_MEMBERS,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub crm: CrmSettings,
    pub engine: EngineSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub max_connections: usize,
    pub key_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrmSettings {
    pub base_url: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub operation_timeout_ms: u64,
    pub hydration_concurrency: usize,
    pub simplify_max_members: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            hydration_concurrency: DEFAULT_HYDRATION_CONCURRENCY,
            simplify_max_members: SIMPLIFY_MAX_MEMBERS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub file_dir: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
            file_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Config::builder()
            .set_default("app.env", "development")?
            .set_default("app.host", "127.0.0.1")?
            .set_default("app.port", 8080)?
            .set_default("app.name", "orgtree-server")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_secs", 3)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.max_connections", 16)?
            .set_default("redis.key_prefix", PERMISSION_CACHE_KEY_PREFIX)?
            .set_default("crm.page_size", DEFAULT_CRM_PAGE_SIZE as u64)?
            .set_default("crm.timeout_secs", 30)?
            .set_default("engine.operation_timeout_ms", DEFAULT_OPERATION_TIMEOUT_MS)?
            .set_default("engine.hydration_concurrency", DEFAULT_HYDRATION_CONCURRENCY as u64)?
            .set_default("engine.simplify_max_members", SIMPLIFY_MAX_MEMBERS as u64)?
            .set_default("log.level", "info")?
            .set_default("log.json", true)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::default().separator("__").try_parsing(true))
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let engine = EngineSettings::default();
        assert_eq!(engine.operation_timeout_ms, DEFAULT_OPERATION_TIMEOUT_MS);
        assert_eq!(engine.simplify_max_members, 25);
        assert!(engine.hydration_concurrency > 0);
    }
}
