//! Configuration for rostercache.
//!
//! Loaded from `~/.rostercache/config.json` (or an explicit path), then
//! overridden by `ROSTERCACHE_*` environment variables. Every default lives in
//! the `Default` impls below; no logic path hardcodes its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RosterError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub monitor: MonitorConfig,
    pub server: ServerConfig,
}

/// GraphQL backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// GraphQL endpoint URL.
    pub url: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4000/graphql".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Cache store and validator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Keys for which an empty result is legitimate.
    pub known_empty_keys: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            known_empty_keys: Vec::new(),
        }
    }
}

/// Retry budget for the retrieval coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total fetch attempts per resolve, including the first.
    pub max_attempts: u32,
    /// Fixed wait between attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Upper bound on a single attempt, in seconds.
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 2_000,
            attempt_timeout_secs: 30,
        }
    }
}

/// Background health monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether `serve` starts the sweep loop.
    pub enabled: bool,
    /// Seconds between sweeps.
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 1800,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on mutating `/api/cache` routes. Unset means open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Default config file location: `~/.rostercache/config.json`.
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rostercache")
            .join("config.json")
    }

    /// Load from the default path (if present), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let path = Self::path();
        let config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.finish()
    }

    /// Like [`Config::load`] but reading an explicit `path`, which must exist.
    pub fn load_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RosterError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::load_from_path(path)?.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides();
        self.validate()?;
        Ok(self)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            RosterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            RosterError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| names.iter().find_map(|n| lookup(*n));
        let parse_u64 = |names: &[&str]| get(names).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(url) = get(&["ROSTERCACHE_BACKEND_URL", "BACKEND_API_URL"]) {
            self.backend.url = url;
        }
        if let Some(v) = parse_u64(&["ROSTERCACHE_BACKEND_TIMEOUT_SECS"]) {
            self.backend.timeout_secs = v;
        }
        if let Some(v) = parse_u64(&["ROSTERCACHE_CACHE_TTL_SECS"]) {
            self.cache.ttl_secs = v;
        }
        if let Some(keys) = get(&["ROSTERCACHE_KNOWN_EMPTY_KEYS"]) {
            self.cache.known_empty_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = parse_u64(&["ROSTERCACHE_RETRY_MAX_ATTEMPTS"]) {
            self.retry.max_attempts = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = parse_u64(&["ROSTERCACHE_RETRY_BACKOFF_MS"]) {
            self.retry.backoff_ms = v;
        }
        if let Some(v) = parse_u64(&["ROSTERCACHE_RETRY_ATTEMPT_TIMEOUT_SECS"]) {
            self.retry.attempt_timeout_secs = v;
        }
        if let Some(v) = parse_u64(&["ROSTERCACHE_MONITOR_INTERVAL_SECS"]) {
            self.monitor.interval_secs = v;
        }
        if let Some(v) = get(&["ROSTERCACHE_MONITOR_ENABLED"]) {
            self.monitor.enabled = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(host) = get(&["ROSTERCACHE_HOST", "HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = get(&["ROSTERCACHE_PORT", "PORT"]).and_then(|v| v.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(token) = get(&["ROSTERCACHE_ADMIN_TOKEN"]).filter(|t| !t.trim().is_empty()) {
            self.server.admin_token = Some(token);
        }
    }

    /// Reject settings that would break the retry loop or the monitor timer.
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(RosterError::Config("backend.url must not be empty".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(RosterError::Config("cache.ttl_secs must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RosterError::Config("retry.max_attempts must be >= 1".into()));
        }
        if self.retry.attempt_timeout_secs == 0 {
            return Err(RosterError::Config(
                "retry.attempt_timeout_secs must be > 0".into(),
            ));
        }
        if self.monitor.interval_secs == 0 {
            return Err(RosterError::Config("monitor.interval_secs must be > 0".into()));
        }
        Ok(())
    }
}
