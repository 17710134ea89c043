//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys are loaded from the API_KEYS env var or `pool.keys_file`,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use upstream::HeaderInjection;

/// Env var holding comma-separated API keys.
const KEYS_ENV: &str = "API_KEYS";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// HTTP gateway settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    /// Separate listener for the admin API; disabled when absent.
    #[serde(default)]
    pub admin_addr: Option<SocketAddr>,
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Key pool settings
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    /// Seconds before an exhausted key is offered again. 0 keeps it
    /// exhausted until the whole pool resets.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Path to a file with one API key per line (alternative to API_KEYS)
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    #[serde(skip)]
    pub keys: Vec<Secret<String>>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            keys_file: None,
            keys: Vec::new(),
        }
    }
}

impl PoolConfig {
    pub fn cooldown(&self) -> Option<Duration> {
        (self.cooldown_secs > 0).then(|| Duration::from_secs(self.cooldown_secs))
    }
}

fn default_upstream_url() -> String {
    upstream::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_cooldown() -> u64 {
    3600
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Key resolution order:
    /// 1. API_KEYS env var (comma-separated)
    /// 2. keys_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        upstream::parse_base_url(&config.proxy.upstream_url)
            .map_err(|e| common::Error::Config(e.to_string()))?;

        if config.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        config.pool.keys = match std::env::var(KEYS_ENV) {
            Ok(raw) => parse_env_keys(&raw),
            Err(_) => match config.pool.keys_file {
                Some(ref keys_file) => {
                    let contents = std::fs::read_to_string(keys_file).map_err(|e| {
                        common::Error::Config(format!(
                            "failed to read keys_file {}: {e}",
                            keys_file.display()
                        ))
                    })?;
                    parse_keys_file(&contents)
                }
                None => Vec::new(),
            },
        };

        if config.pool.keys.is_empty() {
            return Err(common::Error::Config(format!(
                "no API keys configured: set {KEYS_ENV} or pool.keys_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("video-api-proxy.toml")
    }
}

fn parse_env_keys(raw: &str) -> Vec<Secret<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(Secret::from)
        .collect()
}

/// One key per line; blank lines and `#` comments are ignored.
fn parse_keys_file(contents: &str) -> Vec<Secret<String>> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Secret::from)
        .collect()
}
