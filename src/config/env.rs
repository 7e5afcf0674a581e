//! Environment variable overrides
//!
//! The deployment configures the watcher through process environment variables.
//! Each recognised variable overrides the matching file or default value.

use crate::config::Config;
use crate::error::ConfigError;
use log::debug;
use std::str::FromStr;

/// Parse a boolean flag the way shell environments spell them
fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::ValidationError(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| {
        ConfigError::ValidationError(format!("{} must be a number, got '{}'", key, value))
    })
}

/// Empty strings unset optional values
fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Config {
    /// Apply overrides from `lookup`, usually `std::env::var`
    ///
    /// Taking a lookup function instead of reading the environment directly keeps
    /// the parsing testable without mutating process state.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            let value = lookup(key);
            if value.is_some() {
                debug!("Configuration override from {}", key);
            }
            value
        };

        // Channel gates
        if let Some(v) = get("ENABLE_ERROR_EMAIL") {
            self.email.enabled = parse_bool("ENABLE_ERROR_EMAIL", &v)?;
        }
        if let Some(v) = get("ENABLE_ERROR_WEBHOOKS") {
            self.webhooks.enabled = parse_bool("ENABLE_ERROR_WEBHOOKS", &v)?;
        }

        // Email channel
        if let Some(v) = get("SMTP_HOST") {
            self.email.smtp_host = non_empty(v);
        }
        if let Some(v) = get("SMTP_PORT") {
            self.email.smtp_port = parse_number("SMTP_PORT", &v)?;
        }
        if let Some(v) = get("SMTP_USER") {
            self.email.smtp_user = non_empty(v);
        }
        if let Some(v) = get("SMTP_PASS") {
            self.email.smtp_pass = non_empty(v);
        }
        if let Some(v) = get("SMTP_FROM") {
            self.email.from = non_empty(v);
        }
        if let Some(v) = get("ERROR_NOTIFICATION_EMAIL") {
            self.email.recipient = non_empty(v);
        }

        // Webhook endpoints
        if let Some(v) = get("SLACK_WEBHOOK_URL") {
            self.webhooks.slack_url = non_empty(v);
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.webhooks.discord_url = non_empty(v);
        }
        if let Some(v) = get("ERROR_WEBHOOK_URL") {
            self.webhooks.custom_url = non_empty(v);
        }

        // Gating thresholds
        if let Some(v) = get("MAX_NOTIFICATIONS_PER_HOUR") {
            self.notifications.max_per_hour = parse_number("MAX_NOTIFICATIONS_PER_HOUR", &v)?;
        }
        if let Some(v) = get("NOTIFICATION_COOLDOWN") {
            self.notifications.cooldown_ms = parse_number("NOTIFICATION_COOLDOWN", &v)?;
        }
        if let Some(v) = get("CRITICAL_ERROR_THRESHOLD") {
            self.notifications.critical_error_threshold =
                parse_number("CRITICAL_ERROR_THRESHOLD", &v)?;
        }
        if let Some(v) = get("ERROR_RATE_THRESHOLD") {
            self.notifications.error_rate_threshold = parse_number("ERROR_RATE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("PATTERN_ANALYSIS_INTERVAL") {
            self.notifications.pattern_analysis_interval_ms =
                parse_number("PATTERN_ANALYSIS_INTERVAL", &v)?;
        }

        // Health monitoring
        if let Some(v) = get("HEALTH_CHECK_INTERVAL") {
            self.health.interval_ms = parse_number("HEALTH_CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = get("HEALTH_CHECK_TIMEOUT") {
            self.health.check_timeout_ms = parse_number("HEALTH_CHECK_TIMEOUT", &v)?;
        }
        if let Some(v) = get("ENABLE_DETAILED_HEALTH_CHECK") {
            self.health.detailed = parse_bool("ENABLE_DETAILED_HEALTH_CHECK", &v)?;
        }
        if let Some(v) = get("MEMORY_USAGE_ALERT_THRESHOLD") {
            self.health.memory_usage_alert_threshold =
                parse_number("MEMORY_USAGE_ALERT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("SLOW_REQUEST_THRESHOLD") {
            self.health.slow_request_threshold_ms = parse_number("SLOW_REQUEST_THRESHOLD", &v)?;
        }
        if let Some(v) = get("RESPONSE_TIME_THRESHOLD") {
            self.health.response_time_threshold_ms =
                parse_number("RESPONSE_TIME_THRESHOLD", &v)?;
        }
        if let Some(v) = get("HEALTH_CHECK_URLS") {
            self.health.urls = v
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }
}
