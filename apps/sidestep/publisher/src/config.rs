use core_config::redis::RedisConfig;
use core_config::server::ServerConfig;
use core_config::{ConfigError, FromEnv, env_required};

/// Process-level settings of the publisher service.
///
/// Publishing credentials live in `PublisherSettings`; this only covers how
/// the service itself is wired.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Base URL of the catalog API (`/products/{id}` lives under it)
    pub catalog_api_url: String,
    /// Shared dedup lock; in-process lock when unset
    pub redis: Option<RedisConfig>,
}

impl FromEnv for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            catalog_api_url: env_required("CATALOG_API_URL")?,
            redis: RedisConfig::from_env_optional(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_url_is_required() {
        temp_env::with_vars_unset(["CATALOG_API_URL", "REDIS_URL"], || {
            let err = AppConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("CATALOG_API_URL"));
        });
    }

    #[test]
    fn test_redis_is_optional() {
        temp_env::with_vars(
            [
                ("CATALOG_API_URL", Some("http://catalog:8000/api")),
                ("REDIS_URL", None),
                ("PUBLISHER_PORT", Some("9100")),
            ],
            || {
                let config = AppConfig::from_env().unwrap();
                assert!(config.redis.is_none());
                assert_eq!(config.server.port, 9100);
                assert_eq!(config.catalog_api_url, "http://catalog:8000/api");
            },
        );
    }
}
