use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Cache and store configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// ClickHouse HTTP endpoint
    #[validate(length(min = 1, message = "ClickHouse URL cannot be empty"))]
    pub clickhouse_url: String,

    #[validate(length(min = 1, message = "ClickHouse user cannot be empty"))]
    pub clickhouse_user: String,

    #[serde(skip_serializing)]
    pub clickhouse_password: String,

    /// Database holding base and derived cache tables
    #[validate(length(min = 1, message = "Cache database cannot be empty"))]
    pub cache_database: String,

    /// Age after which a cache entry is rebuilt (1 second to 1 year)
    #[validate(range(
        min = 1,
        max = 31_536_000,
        message = "Expire time must be between 1 and 31536000 seconds"
    ))]
    pub expire_time_secs: u64,

    /// Upper bound on one rebuild (1 second to 1 day)
    #[validate(range(
        min = 1,
        max = 86_400,
        message = "Rebuild timeout must be between 1 and 86400 seconds"
    ))]
    pub rebuild_timeout_secs: u64,

    /// When false every request rebuilds
    pub cache_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            clickhouse_url: "http://localhost:8123".to_string(),
            clickhouse_user: "default".to_string(),
            clickhouse_password: String::new(),
            cache_database: "_graphcache".to_string(),
            expire_time_secs: 3600,
            rebuild_timeout_secs: 300,
            cache_enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            clickhouse_url: env::var("GRAPHCACHE_CLICKHOUSE_URL")
                .unwrap_or(defaults.clickhouse_url),
            clickhouse_user: env::var("GRAPHCACHE_CLICKHOUSE_USER")
                .unwrap_or(defaults.clickhouse_user),
            clickhouse_password: env::var("GRAPHCACHE_CLICKHOUSE_PASSWORD")
                .unwrap_or(defaults.clickhouse_password),
            cache_database: env::var("GRAPHCACHE_DATABASE").unwrap_or(defaults.cache_database),
            expire_time_secs: parse_env_var("GRAPHCACHE_EXPIRE_TIME_SECS", "3600")?,
            rebuild_timeout_secs: parse_env_var("GRAPHCACHE_REBUILD_TIMEOUT_SECS", "300")?,
            cache_enabled: parse_env_var("GRAPHCACHE_CACHE_ENABLED", "true")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(cli)?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of this configuration
    pub fn merge(&mut self, cli: CliConfig) -> Result<(), ConfigError> {
        if let Some(url) = cli.clickhouse_url {
            self.clickhouse_url = url;
        }
        if let Some(user) = cli.clickhouse_user {
            self.clickhouse_user = user;
        }
        if let Some(password) = cli.clickhouse_password {
            self.clickhouse_password = password;
        }
        if let Some(database) = cli.cache_database {
            self.cache_database = database;
        }
        if let Some(secs) = cli.expire_time_secs {
            self.expire_time_secs = secs;
        }
        if let Some(secs) = cli.rebuild_timeout_secs {
            self.rebuild_timeout_secs = secs;
        }
        if cli.no_cache {
            self.cache_enabled = false;
        }

        self.validate()?;
        Ok(())
    }

    pub fn expire_time(&self) -> Duration {
        Duration::from_secs(self.expire_time_secs)
    }

    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_secs(self.rebuild_timeout_secs)
    }
}

/// CLI configuration (parsed from command line arguments); `None` keeps the
/// value from the environment or config file
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub clickhouse_url: Option<String>,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub cache_database: Option<String>,
    pub expire_time_secs: Option<u64>,
    pub rebuild_timeout_secs: Option<u64>,
    pub no_cache: bool,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
