use crate::{env_opt, env_required, ConfigError, FromEnv};

/// Redis connection settings (used for the shared publish lock)
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// `None` when `REDIS_URL` is unset; callers fall back to in-process state.
    pub fn from_env_optional() -> Option<Self> {
        env_opt("REDIS_URL").map(Self::new)
    }
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_URL to be set (no default)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("REDIS_URL")?,
        })
    }
}
