//! Built-in health checks
//!
//! This module provides the [`HealthCheck`] trait and the checks the daemon
//! registers: process memory, error rate, notification delivery, runtime
//! scheduling latency and HTTP endpoint probes.

use crate::alerts::ErrorNotifier;
use crate::error::HealthCheckError;
use crate::monitoring::HealthStatus;
use chrono::Duration;
use log::debug;
use reqwest::Client;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use sysinfo::System;

/// Delivery failure ratio above which notifications are degraded
const NOTIFICATION_FAILURE_WARNING_RATIO: f64 = 0.25;

/// Minimum attempts before an all-failed hour counts as critical
const NOTIFICATION_MIN_ATTEMPTS: usize = 3;

/// Scheduling latency thresholds for the runtime check
const RUNTIME_WARNING_MS: u128 = 100;
const RUNTIME_CRITICAL_MS: u128 = 1_000;

/// Points above the memory threshold at which usage becomes critical
const MEMORY_CRITICAL_MARGIN: f64 = 10.0;

pub type CheckFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CheckOutcome, HealthCheckError>> + Send + 'a>>;

/// Trait for health check implementations
pub trait HealthCheck: Send + Sync {
    /// Unique name of the check, used as the key in reports
    fn name(&self) -> &str;

    /// Probe the checked component
    ///
    /// Returning an error marks the check critical with the error text.
    fn run(&self) -> CheckFuture<'_>;
}

/// What a check observed
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub status: HealthStatus,
    pub message: String,
    pub metrics: Map<String, Value>,
}

impl CheckOutcome {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            metrics: Map::new(),
        }
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }
}

/// Status for a memory usage percentage
pub fn memory_status(usage_percent: f64, threshold: f64) -> HealthStatus {
    if usage_percent >= threshold + MEMORY_CRITICAL_MARGIN {
        HealthStatus::Critical
    } else if usage_percent >= threshold {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Resident set size in bytes from the contents of `/proc/self/status`
fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Current resident memory of this process
fn process_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        if let Some(rss) = std::fs::read_to_string("/proc/self/status")
            .ok()
            .as_deref()
            .and_then(parse_vm_rss)
        {
            return Some(rss);
        }
    }

    #[cfg(unix)]
    {
        // Fallback: peak rather than current usage
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } == 0 {
            let max_rss = usage.ru_maxrss.max(0) as u64;
            // ru_maxrss is in KB on Linux, bytes on macOS
            #[cfg(target_os = "macos")]
            return Some(max_rss);
            #[cfg(not(target_os = "macos"))]
            return Some(max_rss * 1024);
        }
    }

    None
}

/// `(total, available)` system memory in bytes
fn system_memory(system: &mut System) -> Option<(u64, u64)> {
    system.refresh_memory();
    let total = system.total_memory();
    if total == 0 {
        return None;
    }
    Some((total, system.available_memory().min(total)))
}

/// Process and system memory usage
pub struct MemoryCheck {
    /// Usage percentage that raises a warning
    pub threshold: f64,
    system: Mutex<System>,
}

impl MemoryCheck {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            system: Mutex::new(System::new()),
        }
    }

    fn sample_system(&self) -> Option<(u64, u64)> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system_memory(&mut system)
    }

    fn evaluate(&self, rss: Option<u64>, system: Option<(u64, u64)>) -> CheckOutcome {
        let rss_bytes = rss.unwrap_or(0);
        let Some((total, available)) = system else {
            return CheckOutcome::new(
                HealthStatus::Healthy,
                "System memory statistics unavailable",
            )
            .with_metric("rss_bytes", rss_bytes);
        };

        let used = total.saturating_sub(available);
        let usage_percent = used as f64 / total as f64 * 100.0;
        let status = memory_status(usage_percent, self.threshold);

        CheckOutcome::new(
            status,
            format!(
                "Memory usage {:.1}% (process RSS {}MB)",
                usage_percent,
                rss_bytes / 1024 / 1024
            ),
        )
        .with_metric("usage_percent", usage_percent)
        .with_metric("threshold_percent", self.threshold)
        .with_metric("rss_bytes", rss_bytes)
        .with_metric("system_total_bytes", total)
        .with_metric("system_available_bytes", available)
    }
}

impl HealthCheck for MemoryCheck {
    fn name(&self) -> &str {
        "memory"
    }

    fn run(&self) -> CheckFuture<'_> {
        Box::pin(async move { Ok(self.evaluate(process_rss_bytes(), self.sample_system())) })
    }
}

/// Error volume reported to the notifier
pub struct ErrorRateCheck {
    notifier: ErrorNotifier,
    /// Errors per minute that raise a warning
    threshold: f64,
}

impl ErrorRateCheck {
    pub fn new(notifier: ErrorNotifier, threshold: f64) -> Self {
        Self {
            notifier,
            threshold,
        }
    }
}

impl HealthCheck for ErrorRateCheck {
    fn name(&self) -> &str {
        "error_rate"
    }

    fn run(&self) -> CheckFuture<'_> {
        Box::pin(async move {
            let activity = self.notifier.error_activity();

            let (status, message) = if activity.critical_last_5_minutes > 0 {
                (
                    HealthStatus::Critical,
                    format!(
                        "{} critical errors in the last 5 minutes",
                        activity.critical_last_5_minutes
                    ),
                )
            } else if activity.errors_per_minute > self.threshold {
                (
                    HealthStatus::Warning,
                    format!(
                        "Error rate {:.2}/min above threshold {}",
                        activity.errors_per_minute, self.threshold
                    ),
                )
            } else {
                (
                    HealthStatus::Healthy,
                    format!("Error rate {:.2}/min", activity.errors_per_minute),
                )
            };

            Ok(CheckOutcome::new(status, message)
                .with_metric("errors_last_hour", activity.errors_last_hour)
                .with_metric("errors_per_minute", activity.errors_per_minute)
                .with_metric("critical_last_5_minutes", activity.critical_last_5_minutes)
                .with_metric("threshold", self.threshold))
        })
    }
}

/// Delivery success of the notification channels over the last hour
pub struct NotificationDeliveryCheck {
    notifier: ErrorNotifier,
}

impl NotificationDeliveryCheck {
    pub fn new(notifier: ErrorNotifier) -> Self {
        Self { notifier }
    }
}

impl HealthCheck for NotificationDeliveryCheck {
    fn name(&self) -> &str {
        "notifications"
    }

    fn run(&self) -> CheckFuture<'_> {
        Box::pin(async move {
            let stats = self.notifier.get_notification_stats(Duration::hours(1));
            let attempts = stats.successful_deliveries + stats.failed_deliveries;
            let failure_ratio = if attempts == 0 {
                0.0
            } else {
                stats.failed_deliveries as f64 / attempts as f64
            };

            let status = if stats.successful_deliveries == 0
                && stats.failed_deliveries >= NOTIFICATION_MIN_ATTEMPTS
            {
                HealthStatus::Critical
            } else if failure_ratio > NOTIFICATION_FAILURE_WARNING_RATIO {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            };

            let message = if attempts == 0 {
                "No notifications sent in the last hour".to_string()
            } else {
                format!(
                    "{} of {} deliveries failed in the last hour",
                    stats.failed_deliveries, attempts
                )
            };

            Ok(CheckOutcome::new(status, message)
                .with_metric("successful_deliveries", stats.successful_deliveries)
                .with_metric("failed_deliveries", stats.failed_deliveries)
                .with_metric("failure_ratio", failure_ratio)
                .with_metric("sent_last_hour", stats.sent_last_hour)
                .with_metric("remaining_this_hour", stats.remaining_this_hour)
                .with_metric("channels", stats.channels))
        })
    }
}

/// How long a freshly spawned task waits before the runtime polls it
#[derive(Debug, Default)]
pub struct RuntimeLatencyCheck;

impl HealthCheck for RuntimeLatencyCheck {
    fn name(&self) -> &str {
        "runtime"
    }

    fn run(&self) -> CheckFuture<'_> {
        Box::pin(async move {
            let spawned = Instant::now();
            let latency = tokio::spawn(async move { spawned.elapsed() })
                .await
                .map_err(|e| HealthCheckError::Failed(format!("probe task failed: {}", e)))?;
            let latency_ms = latency.as_millis();

            let status = if latency_ms > RUNTIME_CRITICAL_MS {
                HealthStatus::Critical
            } else if latency_ms > RUNTIME_WARNING_MS {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            };

            Ok(CheckOutcome::new(status, format!("Task scheduling latency {}ms", latency_ms))
                .with_metric("latency_ms", latency_ms as u64))
        })
    }
}

/// GET probe against an HTTP endpoint
pub struct HttpProbeCheck {
    name: String,
    url: String,
    client: Client,
    slow_threshold_ms: u64,
    critical_threshold_ms: u64,
}

impl HttpProbeCheck {
    pub fn new(url: &str, client: Client, slow_threshold_ms: u64, critical_threshold_ms: u64) -> Self {
        Self {
            name: format!("http:{}", url),
            url: url.to_string(),
            client,
            slow_threshold_ms,
            critical_threshold_ms,
        }
    }
}

impl HealthCheck for HttpProbeCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> CheckFuture<'_> {
        Box::pin(async move {
            let started = Instant::now();
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| HealthCheckError::Failed(format!("request to {} failed: {}", self.url, e)))?;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let status_code = response.status();
            debug!("Probe {} answered {} in {}ms", self.url, status_code, elapsed_ms);

            let (status, message) = if !status_code.is_success() {
                (
                    HealthStatus::Critical,
                    format!("{} returned {}", self.url, status_code),
                )
            } else if elapsed_ms > self.critical_threshold_ms {
                (
                    HealthStatus::Critical,
                    format!("{} responded in {}ms", self.url, elapsed_ms),
                )
            } else if elapsed_ms > self.slow_threshold_ms {
                (
                    HealthStatus::Warning,
                    format!("{} is slow: {}ms", self.url, elapsed_ms),
                )
            } else {
                (
                    HealthStatus::Healthy,
                    format!("{} responded in {}ms", self.url, elapsed_ms),
                )
            };

            Ok(CheckOutcome::new(status, message)
                .with_metric("status_code", status_code.as_u16())
                .with_metric("response_time_ms", elapsed_ms))
        })
    }
}
