//! Service configuration
//!
//! Layered with figment: built-in defaults, then the TOML file, then
//! `OCTA_`-prefixed environment variables (`OCTA_SERVER__PORT=8080`).
//! Durations are humantime strings ("5m"), sizes use binary units
//! ("2GB" = 2 GiB). Unknown keys are ignored.

use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::utils::human_format::parse_size;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_DB_BYTES: u64 = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Public-facing root URL used for absolute link generation
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `production` refuses to start with a default/empty upload secret
    #[serde(default = "default_env")]
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Soft reclamation threshold, e.g. "2GB"
    #[serde(default = "default_db_max_size")]
    pub max_size: String,
    /// Maintenance tick period, e.g. "5m"
    #[serde(default = "default_prune_interval")]
    pub prune_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Generator default edge length in pixels
    #[serde(default = "default_image_size")]
    pub default_size: u32,
    /// JPEG quality for re-encoded output (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Upload cap, e.g. "5MB"
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: String,
    /// Aliases per asset cap
    #[serde(default = "default_max_key_limit")]
    pub max_key_limit: usize,
    /// TTF/OTF file used for raster initials
    #[serde(default)]
    pub font_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// RAM budget in MiB
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
    /// Entry TTL, e.g. "30m"
    #[serde(default = "default_cache_ttl")]
    pub ttl: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Required value of the X-Secret-Key header on write endpoints
    #[serde(default)]
    pub upload_secret: String,
    /// Allowed CORS origin patterns (exact, `*`, `*.dom`, `**.dom`)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests allowed per window
    #[serde(default = "default_rate_requests")]
    pub requests: u32,
    /// Token refill window, e.g. "1s"
    #[serde(default = "default_rate_window")]
    pub window: String,
    /// Burst capacity above the steady rate
    #[serde(default = "default_rate_burst")]
    pub burst: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9980
}

fn default_env() -> String {
    "development".to_string()
}

fn default_base_url() -> String {
    "http://localhost:9980".to_string()
}

fn default_db_path() -> String {
    "./data/avatar.db".to_string()
}

fn default_db_max_size() -> String {
    "2GB".to_string()
}

fn default_prune_interval() -> String {
    "5m".to_string()
}

fn default_image_size() -> u32 {
    360
}

fn default_quality() -> u8 {
    80
}

fn default_max_upload_size() -> String {
    "5MB".to_string()
}

fn default_max_key_limit() -> usize {
    7
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> u64 {
    100
}

fn default_cache_ttl() -> String {
    "30m".to_string()
}

fn default_rate_requests() -> u32 {
    20
}

fn default_rate_window() -> String {
    "1s".to_string()
}

fn default_rate_burst() -> u32 {
    50
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            env: default_env(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_size: default_db_max_size(),
            prune_interval: default_prune_interval(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            default_size: default_image_size(),
            quality: default_quality(),
            max_upload_size: default_max_upload_size(),
            max_key_limit: default_max_key_limit(),
            font_path: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_capacity: default_cache_capacity(),
            ttl: default_cache_ttl(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            requests: default_rate_requests(),
            window: default_rate_window(),
            burst: default_rate_burst(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            image: ImageConfig::default(),
            cache: CacheConfig::default(),
            security: SecurityConfig::default(),
            base_url: default_base_url(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let mut figment =
            Figment::new().merge(Serialized::defaults(Config::default()));

        if std::path::Path::new(config_file).exists() {
            figment = figment.merge(Toml::file(config_file));
        } else {
            tracing::warn!(
                "config file '{config_file}' not found, using default configuration values"
            );
        }

        let config: Config = figment
            .merge(Env::prefixed("OCTA_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Rejects unsafe production setups.
    pub fn validate(&self) -> Result<()> {
        if self.server.env == "production" && self.security.upload_secret.trim().is_empty() {
            anyhow::bail!("security.upload_secret must be set when server.env is 'production'");
        }
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> u64 {
        parse_size(&self.image.max_upload_size, DEFAULT_MAX_UPLOAD_BYTES)
    }

    pub fn max_db_bytes(&self) -> u64 {
        parse_size(&self.database.max_size, DEFAULT_MAX_DB_BYTES)
    }

    pub fn prune_interval(&self) -> Duration {
        humantime::parse_duration(&self.database.prune_interval)
            .unwrap_or(DEFAULT_PRUNE_INTERVAL)
    }

    pub fn cache_ttl(&self) -> Duration {
        humantime::parse_duration(&self.cache.ttl).unwrap_or(DEFAULT_CACHE_TTL)
    }

    pub fn cache_capacity_bytes(&self) -> u64 {
        self.cache.max_capacity.max(1) * 1024 * 1024
    }

    pub fn rate_limit_window(&self) -> Duration {
        humantime::parse_duration(&self.security.rate_limit.window)
            .unwrap_or(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 9980);
        assert_eq!(config.server.env, "development");
        assert_eq!(config.database.path, "./data/avatar.db");
        assert_eq!(config.max_db_bytes(), 2 * 1024 * 1024 * 1024);
        assert_eq!(config.prune_interval(), Duration::from_secs(300));
        assert_eq!(config.image.default_size, 360);
        assert_eq!(config.image.quality, 80);
        assert_eq!(config.max_upload_bytes(), 5 * 1024 * 1024);
        assert_eq!(config.image.max_key_limit, 7);
        assert!(config.cache.enabled);
        assert_eq!(config.cache_capacity_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.cache_ttl(), Duration::from_secs(1800));
        assert_eq!(config.security.rate_limit.requests, 20);
        assert_eq!(config.security.rate_limit.burst, 50);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_durations_fall_back() {
        let mut config = Config::default();
        config.cache.ttl = "not-a-duration".into();
        config.database.prune_interval = "???".into();
        assert_eq!(config.cache_ttl(), DEFAULT_CACHE_TTL);
        assert_eq!(config.prune_interval(), DEFAULT_PRUNE_INTERVAL);
    }

    #[test]
    fn production_requires_a_secret() {
        let mut config = Config::default();
        config.server.env = "production".into();
        assert!(config.validate().is_err());

        config.security.upload_secret = "a-real-secret".into();
        assert!(config.validate().is_ok());

        config.server.env = "development".into();
        config.security.upload_secret = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = Config::load_from_file("/definitely/not/here.toml").unwrap();
        assert_eq!(config.server.port, 9980);
    }
}
