use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::TokenGuardConfig;
use crate::credentials::Credentials;
use crate::error::{PanoplyError, PanoplyResult, RetryConfig};
use crate::uplink::UplinkConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PanoplyConfig {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub uplink: UplinkSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkSettings {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_refresh_attempts")]
    pub refresh_attempts: u32,

    #[serde(default = "default_request_timeout")]
    pub refresh_timeout_secs: u64,

    #[serde(default = "default_access_key")]
    pub access_key: String,

    #[serde(default = "default_refresh_key")]
    pub refresh_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

fn default_flush_interval_ms() -> u64 {
    2000
}

fn default_max_batch_bytes() -> usize {
    crate::uplink::DEFAULT_MAX_BATCH_BYTES
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_attempts() -> u32 {
    crate::auth::DEFAULT_REFRESH_ATTEMPTS
}

fn default_access_key() -> String {
    crate::auth::DEFAULT_ACCESS_KEY.to_string()
}

fn default_refresh_key() -> String {
    crate::auth::DEFAULT_REFRESH_KEY.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UplinkSettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_batch_bytes: default_max_batch_bytes(),
            request_timeout_secs: default_request_timeout(),
            endpoint: None,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            refresh_attempts: default_refresh_attempts(),
            refresh_timeout_secs: default_request_timeout(),
            access_key: default_access_key(),
            refresh_key: default_refresh_key(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl CredentialsConfig {
    pub fn to_credentials(&self) -> PanoplyResult<Credentials> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PanoplyError::MissingConfig("credentials.api_key".to_string()))?;
        let api_secret = self
            .api_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PanoplyError::MissingConfig("credentials.api_secret".to_string()))?;

        Credentials::new(api_key, api_secret)
    }
}

impl UplinkSettings {
    pub fn to_uplink_config(&self) -> UplinkConfig {
        UplinkConfig {
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_batch_bytes: self.max_batch_bytes,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl AuthSettings {
    pub fn token_guard_config(&self, refresh_url: impl Into<String>) -> TokenGuardConfig {
        let mut config = TokenGuardConfig::new(refresh_url)
            .with_keys(self.access_key.clone(), self.refresh_key.clone())
            .with_retry(RetryConfig::for_token_refresh(self.refresh_attempts));
        config.timeout = Duration::from_secs(self.refresh_timeout_secs);
        config
    }
}

impl PanoplyConfig {
    pub fn load() -> PanoplyResult<Self> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> PanoplyResult<Self> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        // PANOPLY_UPLINK__FLUSH_INTERVAL_MS -> uplink.flush_interval_ms
        builder = builder.add_source(
            Environment::with_prefix("PANOPLY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut panoply_config: PanoplyConfig = config.try_deserialize()?;

        if let Ok(key) = std::env::var("PANOPLY_API_KEY") {
            panoply_config.credentials.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("PANOPLY_API_SECRET") {
            panoply_config.credentials.api_secret = Some(secret);
        }

        if let Ok(level) = std::env::var("PANOPLY_LOG_LEVEL") {
            panoply_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            panoply_config.logging.level = level;
        }

        panoply_config.validate()?;

        Ok(panoply_config)
    }

    pub fn validate(&self) -> PanoplyResult<()> {
        if self.uplink.flush_interval_ms == 0 {
            return Err(PanoplyError::InvalidConfigValue {
                key: "uplink.flush_interval_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.uplink.max_batch_bytes == 0 {
            return Err(PanoplyError::InvalidConfigValue {
                key: "uplink.max_batch_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.uplink.request_timeout_secs == 0 {
            return Err(PanoplyError::InvalidConfigValue {
                key: "uplink.request_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(endpoint) = &self.uplink.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(PanoplyError::InvalidConfigValue {
                    key: "uplink.endpoint".to_string(),
                    message: "Must start with http:// or https://".to_string(),
                });
            }
        }

        if self.auth.refresh_attempts == 0 {
            return Err(PanoplyError::InvalidConfigValue {
                key: "auth.refresh_attempts".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.auth.access_key.is_empty() || self.auth.refresh_key.is_empty() {
            return Err(PanoplyError::InvalidConfigValue {
                key: "auth".to_string(),
                message: "Token field names cannot be empty".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(PanoplyError::InvalidConfigValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("panoply.toml"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let mut env_paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        env_paths.push(cwd.join(".env"));
        env_paths.push(cwd.join(".env.local"));
    }

    if let Some(config_dir) = get_config_dir() {
        env_paths.push(config_dir.join(".env"));
    }

    for path in env_paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("panoply"))
}
