//! Configuration management.
//!
//! Namespace/service defaults and limits are resolved once at startup into
//! explicit structs; nothing in the request path reads the environment.

use serde::Deserialize;

/// Main core configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    /// Resource addressing and pagination limits
    #[serde(default)]
    pub api: ApiConfig,

    /// Redis configuration for the record store
    #[serde(default)]
    pub redis: RedisConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: crate::telemetry::LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Namespace segment of resource paths (e.g. deployment or org slug)
    #[serde(default)]
    pub namespace: String,

    /// Service segment of resource paths (typically the project name)
    #[serde(default)]
    pub service: String,

    /// Hard ceiling for list page sizes
    #[serde(default = "default_page_max_limit")]
    pub page_max_limit: u64,

    /// Page size used when the caller does not supply one
    #[serde(default = "default_page_limit")]
    pub page_default_limit: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            service: String::new(),
            page_max_limit: default_page_max_limit(),
            page_default_limit: default_page_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for the default JWT resolver
    pub jwt_secret: Option<String>,

    /// Expected token issuer (unchecked when absent)
    pub issuer: Option<String>,
}

// Default value functions
fn default_page_max_limit() -> u64 {
    100
}
fn default_page_limit() -> u64 {
    10
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_redis_pool_size() -> u32 {
    10
}

impl CoreConfig {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CRUDGATE").separator("__"))
            .build()?;

        let cfg: CoreConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CRUDGATE").separator("__"))
            .build()?;

        let cfg: CoreConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.api.page_max_limit, 100);
        assert_eq!(cfg.api.page_default_limit, 10);
        assert!(cfg.api.namespace.is_empty());
        assert_eq!(cfg.redis.url, "redis://127.0.0.1:6379");
        assert!(cfg.auth.jwt_secret.is_none());
    }
}
