use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.trybeekeeper.ai/v1";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/reverse";
pub const DEFAULT_GEOCODER_USER_AGENT: &str = "BeeFleetRewards/1.0";

/// Settings file name inside the data directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding persisted settings (the API credential)
    pub data_dir: PathBuf,

    /// Listen address
    #[serde(default)]
    pub server: ServerConfig,

    /// Bee Maps API settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Reverse geocoding settings
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Per-device fan-out settings
    #[serde(default)]
    pub fleet: FleetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL every proxied path is appended to
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per call (1 = no retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_initial_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            timeout_secs: default_upstream_timeout(),
            max_attempts: default_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Nominatim-compatible reverse endpoint
    pub url: String,

    /// Sent on every request; Nominatim's usage policy requires one
    pub user_agent: String,

    #[serde(default = "default_geocoder_timeout")]
    pub timeout_secs: u64,

    /// Nominatim detail level (10 = city)
    #[serde(default = "default_zoom")]
    pub zoom: u8,
}

fn default_geocoder_timeout() -> u64 {
    10
}

fn default_zoom() -> u8 {
    10
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: DEFAULT_GEOCODER_USER_AGENT.to_string(),
            timeout_secs: default_geocoder_timeout(),
            zoom: default_zoom(),
        }
    }
}

/// Longest reward history a single request may ask for.
pub const MAX_HISTORY_WEEKS: usize = 52;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Max concurrent upstream lookups per fan-out; 0 means one task per item
    #[serde(default)]
    pub fanout_limit: usize,

    /// Weeks of reward history returned when the caller doesn't say
    #[serde(default = "default_history_weeks")]
    pub history_weeks: usize,
}

fn default_history_weeks() -> usize {
    12
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            fanout_limit: 0,
            history_weeks: default_history_weeks(),
        }
    }
}

impl FleetConfig {
    /// Effective concurrency for `count` devices (never below 1).
    pub fn effective_limit(&self, count: usize) -> usize {
        let limit = if self.fanout_limit == 0 {
            count
        } else {
            self.fanout_limit.min(count)
        };
        limit.max(1)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beefleet")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            geocoder: GeocoderConfig::default(),
            fleet: FleetConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config.with_env_overrides(|key| std::env::var(key).ok()));
        }

        Ok(Self::load_from(&config_path)?.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Load configuration from an explicit file. No environment overrides are applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Apply `PORT`, `BEE_API_BASE` and `BEEFLEET_DATA_DIR` from `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {:?}", port),
            }
        }

        if let Some(base) = lookup("BEE_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.upstream.base_url = base.trim().to_string();
        }

        if let Some(dir) = lookup("BEEFLEET_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }

        self
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        validate_url(&self.upstream.base_url, "upstream.base_url", &mut result);
        validate_url(&self.geocoder.url, "geocoder.url", &mut result);

        if self.server.port == 0 {
            result.add_error("server.port", "Port cannot be 0");
        }

        if self.upstream.timeout_secs == 0 {
            result.add_error("upstream.timeout_secs", "Timeout must be greater than 0");
        }

        if self.geocoder.timeout_secs == 0 {
            result.add_error("geocoder.timeout_secs", "Timeout must be greater than 0");
        }

        if self.upstream.max_attempts == 0 {
            result.add_error("upstream.max_attempts", "At least one attempt is required");
        } else if self.upstream.max_attempts > 1 {
            result.add_warning(
                "upstream.max_attempts",
                format!(
                    "Retries enabled ({} attempts per upstream call)",
                    self.upstream.max_attempts
                ),
            );
        }

        if self.fleet.history_weeks == 0 || self.fleet.history_weeks > MAX_HISTORY_WEEKS {
            result.add_error(
                "fleet.history_weeks",
                format!("Must be between 1 and {}", MAX_HISTORY_WEEKS),
            );
        }

        if self.geocoder.user_agent.trim().is_empty() {
            result.add_error(
                "geocoder.user_agent",
                "A User-Agent is required by the geocoder's usage policy",
            );
        }

        result
    }

    /// Path of the persisted settings (credential) file
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE_NAME)
    }

    /// Listen address as `host:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Save configuration to the given file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("beefleet");

        Ok(config_dir.join("config.toml"))
    }
}

/// Validate a URL field
fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }

            if let Some(0) = url.port() {
                result.add_error(field_name, "Port cannot be 0");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_defaults_match_single_attempt_policy() {
        let config = Config::default();
        assert_eq!(config.upstream.max_attempts, 1);
        assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_BASE_URL);
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.fleet.fanout_limit, 0);
        assert_eq!(config.fleet.history_weeks, 12);
    }

    #[test]
    fn test_history_weeks_bounds() {
        let mut config = Config::default();
        config.fleet.history_weeks = 0;
        assert!(!config.validate().is_valid());

        config.fleet.history_weeks = MAX_HISTORY_WEEKS + 1;
        assert!(!config.validate().is_valid());

        config.fleet.history_weeks = MAX_HISTORY_WEEKS;
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.upstream.base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "upstream.base_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.geocoder.url = "ftp://nominatim.example.com/reverse".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.error_summary().contains("http or https"));
    }

    #[test]
    fn test_zero_attempts_is_error() {
        let mut config = Config::default();
        config.upstream.max_attempts = 0;
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_retries_warn() {
        let mut config = Config::default();
        config.upstream.max_attempts = 3;
        let result = config.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_blank_user_agent_is_error() {
        let mut config = Config::default();
        config.geocoder.user_agent = "  ".to_string();
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_env_overrides(lookup_from(&[
            ("PORT", "8080"),
            ("BEE_API_BASE", "http://localhost:9999/v1"),
            ("BEEFLEET_DATA_DIR", "/tmp/beefleet-test"),
        ]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.base_url, "http://localhost:9999/v1");
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/tmp/beefleet-test").join(SETTINGS_FILE_NAME)
        );
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let config = Config::default().with_env_overrides(lookup_from(&[("PORT", "eighty")]));
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_fanout_effective_limit() {
        let unbounded = FleetConfig {
            fanout_limit: 0,
            ..FleetConfig::default()
        };
        assert_eq!(unbounded.effective_limit(25), 25);
        assert_eq!(unbounded.effective_limit(0), 1);

        let bounded = FleetConfig {
            fanout_limit: 4,
            ..FleetConfig::default()
        };
        assert_eq!(bounded.effective_limit(25), 4);
        assert_eq!(bounded.effective_limit(2), 2);
    }

    #[test]
    fn test_save_and_load_round_trip_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "data_dir = \"/srv/beefleet\"\n\n[upstream]\nbase_url = \"http://127.0.0.1:4000\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:4000");
        assert_eq!(config.upstream.max_attempts, 1);
        assert_eq!(config.geocoder.user_agent, DEFAULT_GEOCODER_USER_AGENT);

        let saved = dir.path().join("nested").join("config.toml");
        config.save_to(&saved).unwrap();
        let reloaded = Config::load_from(&saved).unwrap();
        assert_eq!(reloaded.data_dir, PathBuf::from("/srv/beefleet"));
    }
}
