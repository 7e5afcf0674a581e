use crate::error::ConfigError;
use chrono::Duration;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for every millisecond interval and timeout setting (one year)
pub const MAX_INTERVAL_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Upper bound for `retention_days`
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Complete runtime configuration
///
/// Every section has defaults, so an empty TOML file (or none at all) is valid.
/// Environment variables override file values, see [`Config::apply_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub notifications: NotificationConfig,
    pub email: EmailConfig,
    pub webhooks: WebhookConfig,
    pub health: HealthConfig,
}

/// Gating and pattern analysis thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Hourly cap for non-critical notifications
    pub max_per_hour: usize,
    /// Minimum time between two notifications for one fingerprint
    pub cooldown_ms: u64,
    /// Errors per fingerprint per hour treated as a burst/spike
    pub critical_error_threshold: usize,
    /// Errors per minute (averaged over an hour) that count as elevated
    pub error_rate_threshold: f64,
    /// How often the pattern analyzer runs
    pub pattern_analysis_interval_ms: u64,
    /// How long error records are kept
    pub retention_days: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_per_hour: 10,
            cooldown_ms: 300_000,
            critical_error_threshold: 5,
            error_rate_threshold: 0.1,
            pattern_analysis_interval_ms: 60_000,
            retention_days: 7,
        }
    }
}

impl NotificationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::milliseconds(self.cooldown_ms.min(MAX_INTERVAL_MS) as i64)
    }

    pub fn retention(&self) -> Duration {
        Duration::days(self.retention_days.clamp(0, MAX_RETENTION_DAYS))
    }

    pub fn pattern_analysis_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pattern_analysis_interval_ms)
    }
}

/// SMTP channel settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    /// Sender address, falls back to `smtp_user`
    pub from: Option<String>,
    /// Recipient of error notifications
    pub recipient: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_pass: None,
            from: None,
            recipient: None,
        }
    }
}

impl EmailConfig {
    /// Whether the email channel should be built
    pub fn is_active(&self) -> bool {
        self.enabled && self.smtp_host.is_some() && self.recipient.is_some()
    }

    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.smtp_user.as_deref())
    }
}

/// Webhook channel settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub slack_url: Option<String>,
    pub discord_url: Option<String>,
    pub custom_url: Option<String>,
}

/// Health monitor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Monitoring interval
    pub interval_ms: u64,
    /// Ceiling for a single check execution
    pub check_timeout_ms: u64,
    /// Registers the runtime latency and HTTP probe checks
    pub detailed: bool,
    /// Memory usage percentage that raises a warning
    pub memory_usage_alert_threshold: f64,
    /// Probe latency that raises a warning
    pub slow_request_threshold_ms: u64,
    /// Probe latency that is critical
    pub response_time_threshold_ms: u64,
    /// HTTP probe targets
    pub urls: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            check_timeout_ms: 10_000,
            detailed: false,
            memory_usage_alert_threshold: 80.0,
            slow_request_threshold_ms: 2_000,
            response_time_threshold_ms: 5_000,
            urls: Vec::new(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.interval_ms)
    }

    pub fn check_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.check_timeout_ms)
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply the process environment
    ///
    /// A missing file is not an error: defaults are used and a warning is logged.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                warn!(
                    "Configuration file {} not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::ReadError(format!(
                "{} is not a file",
                path.display()
            )));
        }
        if path.extension().is_some_and(|ext| ext != "toml") {
            warn!(
                "Configuration file does not have .toml extension: {}",
                path.display()
            );
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notifications.critical_error_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "critical_error_threshold must be at least 1".to_string(),
            ));
        }
        let rate = self.notifications.error_rate_threshold;
        if rate.is_nan() || rate < 0.0 {
            return Err(ConfigError::ValidationError(
                "error_rate_threshold must be a non-negative number".to_string(),
            ));
        }
        if self.notifications.pattern_analysis_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pattern_analysis_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.notifications.retention_days) {
            return Err(ConfigError::ValidationError(format!(
                "retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS, self.notifications.retention_days
            )));
        }
        let intervals = [
            ("cooldown_ms", self.notifications.cooldown_ms),
            (
                "pattern_analysis_interval_ms",
                self.notifications.pattern_analysis_interval_ms,
            ),
            ("health interval_ms", self.health.interval_ms),
            ("check_timeout_ms", self.health.check_timeout_ms),
        ];
        for (name, value) in intervals {
            if value > MAX_INTERVAL_MS {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be at most {} (one year), got {}",
                    name, MAX_INTERVAL_MS, value
                )));
            }
        }
        if self.health.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "health interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.health.check_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "check_timeout_ms must be greater than zero".to_string(),
            ));
        }
        let memory = self.health.memory_usage_alert_threshold;
        if !(0.0..=100.0).contains(&memory) {
            return Err(ConfigError::ValidationError(format!(
                "memory_usage_alert_threshold must be between 0 and 100, got {}",
                memory
            )));
        }
        if self.health.slow_request_threshold_ms > self.health.response_time_threshold_ms {
            warn!(
                "slow_request_threshold_ms ({}) is above response_time_threshold_ms ({}), probes will never warn",
                self.health.slow_request_threshold_ms, self.health.response_time_threshold_ms
            );
        }
        Ok(())
    }
}
