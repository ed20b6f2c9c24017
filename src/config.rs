use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub compute: ComputeConfig,

    pub oracle: OracleConfig,

    pub admin: AdminConfig,

    pub index: IndexConfig,

    pub cache: CacheConfig,

    pub notifications: NotificationConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human readable format.
    pub json_logs: bool,

    /// SQLite URL backing the client-side local storage.
    pub storage_path: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Platform event bus buffer size (default: 64)
    pub event_bus_buffer_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            storage_path: "sqlite:data/futurebot.db".to_string(),
            worker_threads: 2,
            event_bus_buffer_size: 64,
        }
    }
}

/// Which route set the gateway mounts.
///
/// The mobile build is a static export and only carries the routes the app
/// bundles; the web build additionally serves the heavier calculators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    Web,
    Mobile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    pub deployment: Deployment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cors_allowed_origins: vec!["*".to_string()],
            deployment: Deployment::Web,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Base URL of the astrology computation backend.
    pub base_url: String,

    /// Timezone injected into requests that omit one.
    pub default_timezone: String,

    /// Request timeout in seconds. 0 disables the timeout.
    pub request_timeout_seconds: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            default_timezone: "Asia/Kolkata".to_string(),
            request_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,

    /// Generative AI key. Overridden by `GEMINI_API_KEY`.
    pub api_key: String,

    pub primary: ModelConfig,

    pub fallback: ModelConfig,

    /// Returned as the verdict when both models fail.
    pub placeholder: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            primary: ModelConfig {
                model: "gemini-2.0-flash".to_string(),
                temperature: 0.8,
                max_output_tokens: 512,
            },
            fallback: ModelConfig {
                model: "gemini-1.5-flash".to_string(),
                temperature: 0.7,
                max_output_tokens: 384,
            },
            placeholder: "The stars are silent for now. Your chart holds promise; \
                          return soon for a fuller reading."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared secret expected in `x-admin-key`. Overridden by `ADMIN_API_KEY`.
    /// An empty key rejects every admin request.
    #[serde(skip_serializing)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the document-index service behind `/api/books/index`
    /// and `/api/file-search`.
    pub base_url: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/index".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of transit/natal/Panchang cache entries.
    pub ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_hours: 6 }
    }
}

impl CacheConfig {
    /// Longest accepted TTL: one year.
    pub const MAX_TTL_HOURS: i64 = 24 * 365;

    pub fn ttl(&self) -> Result<chrono::Duration> {
        if !(1..=Self::MAX_TTL_HOURS).contains(&self.ttl_hours) {
            anyhow::bail!(
                "Cache TTL must be between 1 and {} hours, got {}",
                Self::MAX_TTL_HOURS,
                self.ttl_hours
            );
        }
        chrono::Duration::try_hours(self.ttl_hours).context("Cache TTL out of range")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// Offset of the user's local time from UTC, used to find midnight.
    pub utc_offset_minutes: i32,

    /// Cron expression (UTC) for the midnight wake job.
    pub midnight_cron: String,

    /// Location used to fetch the daily Panchang.
    pub lat: f64,

    pub lon: f64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: 330,
            // 00:00 IST
            midnight_cron: "0 30 18 * * *".to_string(),
            lat: 28.6139,
            lon: 77.2090,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            compute: ComputeConfig::default(),
            oracle: OracleConfig::default(),
            admin: AdminConfig::default(),
            index: IndexConfig::default(),
            cache: CacheConfig::default(),
            notifications: NotificationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets and the backend location may come from the environment so
    /// they never have to live in `config.toml`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.trim().is_empty()
        {
            self.oracle.api_key = key.trim().to_string();
        }

        if let Ok(key) = std::env::var("ADMIN_API_KEY")
            && !key.trim().is_empty()
        {
            self.admin.key = key.trim().to_string();
        }

        if let Ok(url) = std::env::var("FUTUREBOT_BACKEND_URL")
            && !url.trim().is_empty()
        {
            self.compute.base_url = url.trim().to_string();
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("futurebot").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".futurebot").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.compute.base_url)
            .with_context(|| format!("Invalid compute base URL: {}", self.compute.base_url))?;

        url::Url::parse(&self.oracle.base_url)
            .with_context(|| format!("Invalid oracle base URL: {}", self.oracle.base_url))?;

        if self.compute.default_timezone.trim().is_empty() {
            anyhow::bail!("Default timezone cannot be empty");
        }

        self.cache.ttl()?;

        if self.oracle.placeholder.trim().is_empty() {
            anyhow::bail!("Oracle placeholder verdict cannot be empty");
        }

        if self.notifications.utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("UTC offset must be within one day");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.compute.default_timezone, "Asia/Kolkata");
        assert_eq!(config.cache.ttl_hours, 6);
        assert_eq!(config.server.deployment, Deployment::Web);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [server]
            deployment = "mobile"

            [compute]
            base_url = "http://backend:9000"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.deployment, Deployment::Mobile);
        assert_eq!(config.compute.base_url, "http://backend:9000");

        assert_eq!(config.compute.default_timezone, "Asia/Kolkata");
        assert_eq!(config.oracle.primary.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_admin_key_not_serialized() {
        let mut config = Config::default();
        config.admin.key = "super-secret".to_string();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(!toml_str.contains("super-secret"));
        assert!(toml_str.contains("[compute]"));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.compute.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_cache_ttl() {
        let mut config = Config::default();
        assert_eq!(config.cache.ttl().unwrap(), chrono::Duration::hours(6));

        for ttl_hours in [0, -1, CacheConfig::MAX_TTL_HOURS + 1, i64::MAX] {
            config.cache.ttl_hours = ttl_hours;
            assert!(config.validate().is_err(), "accepted ttl_hours = {ttl_hours}");
            assert!(config.cache.ttl().is_err());
        }

        config.cache.ttl_hours = CacheConfig::MAX_TTL_HOURS;
        assert!(config.validate().is_ok());
    }
}
