use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_filename")]
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_mirror_host")]
    pub mirror_host: String,
    /// Seconds advertised in `Cache-Control: public, max-age=...`.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Per-attempt bound on outbound requests.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_client_ip_header")]
    pub client_ip_header: String,
    #[serde(default = "default_cache_status_header")]
    pub cache_status_header: String,
    /// Optional forward proxy for outbound traffic, e.g. `socks5://127.0.0.1:1080`.
    #[serde(default)]
    pub upstream_proxy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Directory holding the persisted stats records. Persistence is off when unset.
    #[serde(default)]
    pub storage_dir: Option<String>,
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default = "default_response_time_cap")]
    pub response_time_cap: usize,
    #[serde(default = "default_response_time_keep")]
    pub response_time_keep: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mirror_host: default_mirror_host(),
            cache_ttl: default_cache_ttl(),
            request_timeout_ms: default_request_timeout_ms(),
            max_redirects: default_max_redirects(),
            client_ip_header: default_client_ip_header(),
            cache_status_header: default_cache_status_header(),
            upstream_proxy: None,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            sync_interval_ms: default_sync_interval_ms(),
            response_time_cap: default_response_time_cap(),
            response_time_keep: default_response_time_keep(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            filename: default_log_filename(),
        }
    }
}

/// Where [`Config::load`] took its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Defaults,
}

impl ProxyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl StatsConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::FileRead)?;
        Self::from_toml(&content)
    }

    /// Loads `path` when it exists, otherwise falls back to the built-in defaults.
    /// Runs before logging is up, so the caller reports which source was used.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        if path.exists() {
            return Ok((Self::from_file(path)?, ConfigSource::File));
        }

        let config = Config::default();
        config.validate()?;
        Ok((config, ConfigSource::Defaults))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.proxy.mirror_host.is_empty() {
            return Err(ConfigError::MissingField("proxy.mirror_host".to_string()).into());
        }
        if self.proxy.mirror_host.contains('/') {
            return Err(ConfigError::InvalidValue(format!(
                "proxy.mirror_host must be a bare host name: {}",
                self.proxy.mirror_host
            ))
            .into());
        }

        if self.proxy.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "proxy.request_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.proxy.client_ip_header.is_empty() {
            return Err(
                ConfigError::MissingField("proxy.client_ip_header".to_string()).into(),
            );
        }

        if self.proxy.cache_status_header.is_empty() {
            return Err(
                ConfigError::MissingField("proxy.cache_status_header".to_string()).into(),
            );
        }

        if self.stats.sync_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "stats.sync_interval_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.stats.response_time_keep == 0
            || self.stats.response_time_keep > self.stats.response_time_cap
        {
            return Err(ConfigError::InvalidValue(format!(
                "stats.response_time_keep must be between 1 and response_time_cap ({})",
                self.stats.response_time_cap
            ))
            .into());
        }

        if let Some(dir) = &self.stats.storage_dir {
            if dir.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "stats.storage_dir cannot be empty".to_string(),
                )
                .into());
            }
        }

        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_mirror_host() -> String {
    "master.dl.sourceforge.net".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_client_ip_header() -> String {
    "cf-connecting-ip".to_string()
}

fn default_cache_status_header() -> String {
    "cf-cache-status".to_string()
}

fn default_sync_interval_ms() -> u64 {
    6 * 60 * 60 * 1000
}

fn default_response_time_cap() -> usize {
    1000
}

fn default_response_time_keep() -> usize {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_filename() -> String {
    "sourceforge-proxy.log".to_string()
}
