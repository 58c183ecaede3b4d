use arc_swap::ArcSwap;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub health_check: HealthCheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Task execute engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix used to name the engine's workers
    pub name: String,
    /// Fixed number of workers; `None` picks a suitable count for this host
    pub worker_count: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "beacon.naming.health".to_string(),
            worker_count: None,
        }
    }
}

/// Heartbeat health-check configuration.
///
/// The running process shares one [`SharedHealthCheckConfig`] and swaps in
/// new snapshots on reload. `enabled`, `expire_instance`, the default
/// timeouts and `client_expired_time_ms` are read on every pass. The
/// scheduling delays and checker orders are read once at startup; see
/// [`HealthCheckConfig::startup_only_changes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Master switch for heartbeat checks
    pub enabled: bool,
    /// Whether instances past their delete timeout are evicted
    pub expire_instance: bool,
    /// Delay between two scheduling passes
    pub check_interval_ms: u64,
    /// Delay before the first scheduling pass
    pub initial_delay_ms: u64,
    /// Unhealthy-marking timeout used when no override is present
    pub default_heart_beat_timeout_ms: i64,
    /// Eviction timeout used when no override is present
    pub default_ip_delete_timeout_ms: i64,
    /// Chain position of the unhealthy-marking checker
    pub unhealthy_checker_order: i32,
    /// Chain position of the eviction checker
    pub expired_checker_order: i32,
    /// Idle time after which an ephemeral client with no publications is removed
    pub client_expired_time_ms: i64,
}

impl HealthCheckConfig {
    /// Default unhealthy timeout longer than the default delete timeout.
    /// Allowed, but instances then get evicted without ever being marked
    /// unhealthy.
    #[must_use]
    pub const fn has_inverted_timeouts(&self) -> bool {
        self.default_heart_beat_timeout_ms > self.default_ip_delete_timeout_ms
    }

    /// Fields that differ from `other` but only take effect on restart
    #[must_use]
    pub fn startup_only_changes(&self, other: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.check_interval_ms != other.check_interval_ms {
            changed.push("check_interval_ms");
        }
        if self.initial_delay_ms != other.initial_delay_ms {
            changed.push("initial_delay_ms");
        }
        if self.unhealthy_checker_order != other.unhealthy_checker_order {
            changed.push("unhealthy_checker_order");
        }
        if self.expired_checker_order != other.expired_checker_order {
            changed.push("expired_checker_order");
        }
        changed
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expire_instance: true,
            check_interval_ms: 5000,
            initial_delay_ms: 5000,
            default_heart_beat_timeout_ms: 15_000,
            default_ip_delete_timeout_ms: 30_000,
            unhealthy_checker_order: 1,
            expired_checker_order: 2,
            client_expired_time_ms: 30_000,
        }
    }
}

/// Hot-reloadable handle to the health-check configuration
#[derive(Debug, Clone)]
pub struct SharedHealthCheckConfig {
    inner: Arc<ArcSwap<HealthCheckConfig>>,
}

impl SharedHealthCheckConfig {
    #[must_use]
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn load(&self) -> Arc<HealthCheckConfig> {
        self.inner.load_full()
    }

    /// Replace the configuration seen by every holder of this handle.
    /// Returns the changed fields that are ignored until restart.
    pub fn store(&self, config: HealthCheckConfig) -> Vec<&'static str> {
        let ignored = self.inner.load().startup_only_changes(&config);
        if !ignored.is_empty() {
            tracing::warn!(
                fields = ?ignored,
                "Health check settings changed on reload only take effect after restart"
            );
        }
        tracing::info!(?config, "Health check configuration reloaded");
        self.inner.store(Arc::new(config));
        ignored
    }

    #[must_use]
    pub fn is_expire_instance(&self) -> bool {
        self.inner.load().expire_instance
    }

    #[must_use]
    pub fn is_health_check_enabled(&self) -> bool {
        self.inner.load().enabled
    }
}

impl Default for SharedHealthCheckConfig {
    fn default() -> Self {
        Self::new(HealthCheckConfig::default())
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // BEACON_HEALTH_CHECK__EXPIRE_INSTANCE=false, etc.
        builder = builder.add_source(
            Environment::with_prefix("BEACON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// [`load`](Self::load) followed by [`validate`](Self::validate)
    pub fn load_validated(config_file: Option<&str>) -> crate::Result<Self> {
        let config = Self::load(config_file)?;
        config
            .validate()
            .map_err(|errors| crate::Error::Configuration(errors.join("; ")))?;
        Ok(config)
    }

    /// Check the configuration for values the runtime cannot work with
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }
        if self.engine.worker_count == Some(0) {
            errors.push("engine.worker_count must be greater than 0".to_string());
        }
        if self.engine.name.trim().is_empty() {
            errors.push("engine.name must not be empty".to_string());
        }

        let hc = &self.health_check;
        if hc.check_interval_ms == 0 {
            errors.push("health_check.check_interval_ms must be greater than 0".to_string());
        }
        if hc.default_heart_beat_timeout_ms <= 0 {
            errors.push("health_check.default_heart_beat_timeout_ms must be positive".to_string());
        }
        if hc.default_ip_delete_timeout_ms <= 0 {
            errors.push("health_check.default_ip_delete_timeout_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
