//! Configuration management for Canopy.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::BackendFamily;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/canopy/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Run scheduling and paging bounds
    pub scraping: ScrapingConfig,
    /// Per-family request pacing
    pub rate_limits: RateLimitConfig,
    /// Outbound proxy egress
    pub proxy: ProxyConfig,
    /// Headless browser settings
    pub browser: BrowserConfig,
    /// Database and session material locations
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides, then validate.
    ///
    /// See [`AppConfig::apply_env_overrides`] for the supported variables.
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Supports the following variables:
    /// - `CANOPY_MAX_CONCURRENT_RUNS`: Override concurrent run limit
    /// - `CANOPY_RUN_TIMEOUT_SECS`: Override per-target wall-clock timeout
    /// - `CANOPY_HEADLESS`: Override browser headless mode (true/false)
    /// - `CANOPY_PROXY_HOST`, `CANOPY_PROXY_PORT`, `CANOPY_PROXY_USER`: Proxy endpoint
    /// - `CANOPY_PROXY_PASSWORD`: Proxy password (never read from the file)
    /// - `CANOPY_DATABASE_PATH`: Override the snapshot database location
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(runs) = lookup("CANOPY_MAX_CONCURRENT_RUNS").and_then(|v| v.parse().ok()) {
            self.scraping.max_concurrent_runs = runs;
            tracing::debug!("Override scraping.max_concurrent_runs from env: {}", runs);
        }

        if let Some(secs) = lookup("CANOPY_RUN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.scraping.run_timeout_secs = secs;
            tracing::debug!("Override scraping.run_timeout_secs from env: {}", secs);
        }

        if let Some(headless) = lookup("CANOPY_HEADLESS").and_then(|v| v.parse().ok()) {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }

        if let Some(host) = lookup("CANOPY_PROXY_HOST") {
            tracing::debug!("Override proxy.host from env: {}", host);
            self.proxy.host = Some(host);
            self.proxy.enabled = true;
        }

        if let Some(port) = lookup("CANOPY_PROXY_PORT").and_then(|v| v.parse().ok()) {
            self.proxy.port = port;
        }

        if let Some(user) = lookup("CANOPY_PROXY_USER") {
            self.proxy.username = Some(user);
        }

        if let Some(password) = lookup("CANOPY_PROXY_PASSWORD") {
            self.proxy.password = Some(password);
        }

        if let Some(path) = lookup("CANOPY_DATABASE_PATH") {
            tracing::debug!("Override storage.database_path from env: {}", path);
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    /// Check values that would make a run unable to terminate or start.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scraping.max_concurrent_runs == 0 {
            return Err(invalid("scraping.max_concurrent_runs", "must be at least 1"));
        }
        if self.scraping.default_max_pages == 0 {
            return Err(invalid("scraping.default_max_pages", "must be at least 1"));
        }
        if self.scraping.run_timeout_secs == 0 {
            return Err(invalid("scraping.run_timeout_secs", "must be at least 1"));
        }
        if self.browser.stagnation_limit == 0 {
            return Err(invalid("browser.stagnation_limit", "must be at least 1"));
        }
        if self.browser.max_scroll_iterations == 0 {
            return Err(invalid("browser.max_scroll_iterations", "must be at least 1"));
        }
        if self.proxy.enabled && self.proxy.host.is_none() {
            return Err(invalid("proxy.host", "required when proxy is enabled"));
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/canopy/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/canopy`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "canopy", "canopy").ok_or(ConfigError::NoConfigDir)
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Run scheduling and paging bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Number of targets scraped concurrently
    pub max_concurrent_runs: usize,
    /// Wall-clock budget per target run in seconds
    pub run_timeout_secs: u64,
    /// Absolute page / iteration bound when a run doesn't set one
    pub default_max_pages: u32,
    /// Whether partial runs replace the stored snapshot
    pub accept_partial: bool,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Target registry file (defaults to `targets.toml` next to the config file)
    pub registry_path: Option<PathBuf>,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            run_timeout_secs: 900,
            default_max_pages: 100,
            accept_partial: false,
            request_timeout_secs: 30,
            registry_path: None,
        }
    }
}

impl ScrapingConfig {
    /// Run timeout as a duration.
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Resolve the registry path.
    pub fn registry_path(&self) -> ConfigResult<PathBuf> {
        match &self.registry_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.config_dir().join("targets.toml")),
        }
    }
}

/// Per-family request pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per minute for families without an explicit entry (0 = unpaced)
    pub default_requests_per_minute: u32,
    /// Requests per minute per backend family
    pub families: BTreeMap<BackendFamily, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut families = BTreeMap::new();
        families.insert(BackendFamily::RestCatalog, 60);
        Self {
            default_requests_per_minute: 30,
            families,
        }
    }
}

impl RateLimitConfig {
    /// Minimum interval between two requests to the same family.
    #[must_use]
    pub fn interval_for(&self, family: BackendFamily) -> Duration {
        let rpm = self
            .families
            .get(&family)
            .copied()
            .unwrap_or(self.default_requests_per_minute);
        if rpm == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(60_000 / u64::from(rpm))
        }
    }
}

/// Outbound proxy egress settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route requests through the proxy
    pub enabled: bool,
    /// Proxy host
    pub host: Option<String>,
    /// Proxy port
    pub port: u16,
    /// Proxy account name; sticky session ids are appended to it
    pub username: Option<String>,
    /// Proxy password (from `CANOPY_PROXY_PASSWORD`, never serialized)
    #[serde(skip)]
    pub password: Option<String>,
    /// Fixed sticky session ids; generated when empty
    pub sessions: Vec<String>,
    /// Number of session ids to generate when none are configured
    pub session_pool_size: usize,
    /// Sticky session lifetime requested from the proxy, in minutes
    pub session_minutes: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: None,
            port: 10_000,
            username: None,
            password: None,
            sessions: Vec::new(),
            session_pool_size: 8,
            session_minutes: 30,
        }
    }
}

/// Headless browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Pixels per simulated scroll
    pub scroll_step_px: u32,
    /// Wait after each scroll or click for network traffic to settle, in milliseconds
    pub settle_ms: u64,
    /// Consecutive scrolls without new items before a category is done
    pub stagnation_limit: u32,
    /// Absolute bound on scrolls per category
    pub max_scroll_iterations: u32,
    /// Category tab labels clicked after the initial scroll pass
    pub category_tabs: Vec<String>,
    /// Button labels that dismiss an age-verification interstitial
    pub age_gate_labels: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: 45,
            scroll_step_px: 600,
            settle_ms: 800,
            stagnation_limit: 5,
            max_scroll_iterations: 60,
            category_tabs: [
                "Flower",
                "Pre-Rolls",
                "Vaporizers",
                "Concentrates",
                "Edibles",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            age_gate_labels: [
                "I am 21", "I'm 21", "I\u{2019}m 21", "Yes", "Enter", "Continue", "Agree",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

/// Database and session material locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot database (defaults to `canopy.db` in the data directory)
    pub database_path: Option<PathBuf>,
    /// Directory holding session cookie files (defaults to `sessions/` in the data directory)
    pub sessions_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database path.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(AppConfig::data_dir()?.join("canopy.db")),
        }
    }

    /// Resolve the sessions directory.
    pub fn sessions_dir(&self) -> ConfigResult<PathBuf> {
        match &self.sessions_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(AppConfig::data_dir()?.join("sessions")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scraping.max_concurrent_runs, 4);
        assert_eq!(config.scraping.default_max_pages, 100);
        assert!(!config.scraping.accept_partial);
        assert!(!config.proxy.enabled);
        assert!(config.browser.headless);
        assert_eq!(config.browser.stagnation_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[scraping]"));
        assert!(toml_str.contains("[rate_limits.families]"));
        assert!(toml_str.contains("[browser]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(
            parsed.scraping.run_timeout_secs,
            config.scraping.run_timeout_secs
        );
    }

    #[test]
    fn test_password_never_serialized() {
        let mut config = AppConfig::default();
        config.proxy.password = Some("hunter2".to_string());
        let toml_str = toml::to_string_pretty(&config).expect("serialize config");
        assert!(!toml_str.contains("hunter2"));
    }

    #[test]
    fn test_config_file_round_trip() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.scraping.max_concurrent_runs = 8;
        config.browser.stagnation_limit = 9;

        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config file");

        let loaded_contents = fs::read_to_string(&config_path).expect("read config file");
        let loaded: AppConfig = toml::from_str(&loaded_contents).expect("parse loaded config");

        assert_eq!(loaded.scraping.max_concurrent_runs, 8);
        assert_eq!(loaded.browser.stagnation_limit, 9);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CANOPY_MAX_CONCURRENT_RUNS", "2"),
            ("CANOPY_HEADLESS", "false"),
            ("CANOPY_PROXY_HOST", "gate.proxy.example"),
            ("CANOPY_PROXY_PASSWORD", "secret"),
            ("CANOPY_RUN_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.scraping.max_concurrent_runs, 2);
        assert!(!config.browser.headless);
        assert!(config.proxy.enabled);
        assert_eq!(config.proxy.host.as_deref(), Some("gate.proxy.example"));
        assert_eq!(config.proxy.password.as_deref(), Some("secret"));
        // Unparseable values are ignored
        assert_eq!(config.scraping.run_timeout_secs, 900);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[scraping]
max_concurrent_runs = 1

[rate_limits]
default_requests_per_minute = 12

[rate_limits.families]
graph-catalog = 20
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.scraping.max_concurrent_runs, 1);
        assert_eq!(
            config.rate_limits.interval_for(BackendFamily::GraphCatalog),
            Duration::from_secs(3)
        );
        assert_eq!(
            config.rate_limits.interval_for(BackendFamily::Storefront),
            Duration::from_secs(5)
        );
        // Defaults
        assert_eq!(config.scraping.default_max_pages, 100);
        assert!(config.browser.headless);
    }

    #[test]
    fn test_unpaced_family() {
        let mut limits = RateLimitConfig::default();
        limits.families.insert(BackendFamily::Storefront, 0);
        assert_eq!(limits.interval_for(BackendFamily::Storefront), Duration::ZERO);
        assert_eq!(
            limits.interval_for(BackendFamily::RestCatalog),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let mut config = AppConfig::default();
        config.scraping.default_max_pages = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.browser.stagnation_limit = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.proxy.enabled = true;
        assert!(config.validate().is_err());
    }
}
