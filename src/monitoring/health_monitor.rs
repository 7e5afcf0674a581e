//! Health monitor
//!
//! Runs registered [`HealthCheck`]s concurrently under a per-check timeout,
//! keeps a bounded history of reports and derives trends from it.

use crate::alerts::ErrorNotifier;
use crate::clock::{Clock, SystemClock};
use crate::config::{HealthConfig, MAX_INTERVAL_MS};
use crate::error::HealthCheckError;
use crate::events::{ErrorContext, Severity, Timestamp, HEALTH_CHECK_CRITICAL};
use crate::jobs::JobSet;
use crate::monitoring::checks::{CheckOutcome, HealthCheck};
use chrono::Duration;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Maximum number of reports kept in the history
pub const MAX_HEALTH_HISTORY: usize = 100;

/// Reports older than this are dropped by the cleanup job
const HISTORY_RETENTION_HOURS: i64 = 24;

/// How often the history cleanup job runs
const HISTORY_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Number of reports averaged on each side of a trend comparison
const TREND_WINDOW: usize = 3;

/// Change in health percentage that counts as a trend
const TREND_DELTA: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one check execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub status: HealthStatus,
    pub message: String,
    pub metrics: Map<String, Value>,
    pub duration_ms: u64,
    pub timestamp: Timestamp,
    /// Set when the check failed, panicked or timed out
    pub error: Option<String>,
}

impl CheckResult {
    fn from_outcome(outcome: CheckOutcome, duration_ms: u64, timestamp: Timestamp) -> Self {
        Self {
            status: outcome.status,
            message: outcome.message,
            metrics: outcome.metrics,
            duration_ms,
            timestamp,
            error: None,
        }
    }

    fn failed(error: String, duration_ms: u64, timestamp: Timestamp) -> Self {
        Self {
            status: HealthStatus::Critical,
            message: "Health check failed".to_string(),
            metrics: Map::new(),
            duration_ms,
            timestamp,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

/// Outcome of one `run_all_checks` pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub timestamp: Timestamp,
    pub execution_time_ms: u64,
    pub results: BTreeMap<String, CheckResult>,
    pub summary: HealthSummary,
}

impl HealthReport {
    fn new(results: BTreeMap<String, CheckResult>, timestamp: Timestamp, execution_time_ms: u64) -> Self {
        let mut summary = HealthSummary {
            total: results.len(),
            ..HealthSummary::default()
        };
        for result in results.values() {
            match result.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Warning => summary.warning += 1,
                HealthStatus::Critical => summary.critical += 1,
            }
        }

        let overall = if summary.critical > 0 {
            HealthStatus::Critical
        } else if summary.warning > 0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        Self {
            overall,
            timestamp,
            execution_time_ms,
            results,
            summary,
        }
    }

    /// Share of healthy checks in percent; a report without checks counts as fully healthy
    pub fn health_percentage(&self) -> f64 {
        if self.summary.total == 0 {
            return 100.0;
        }
        self.summary.healthy as f64 / self.summary.total as f64 * 100.0
    }

    /// Names of the checks that reported critical
    pub fn critical_checks(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, result)| result.status == HealthStatus::Critical)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub timestamp: Timestamp,
    pub overall: HealthStatus,
    pub health_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthTrends {
    pub trend: Trend,
    pub recent_average: Option<f64>,
    pub previous_average: Option<f64>,
    /// The reports the comparison used, oldest first
    pub data: Vec<TrendPoint>,
}

/// Registration state of one check
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckState {
    pub name: String,
    pub enabled: bool,
    pub last_result: Option<CheckResult>,
    pub last_executed: Option<Timestamp>,
    /// Consecutive non-healthy results
    pub failures: u32,
}

struct HealthEntry {
    check: Arc<dyn HealthCheck>,
    enabled: bool,
    last_result: Option<CheckResult>,
    last_executed: Option<Timestamp>,
    failures: u32,
}

#[derive(Default)]
struct MonitorState {
    history: VecDeque<HealthReport>,
    latest: Option<HealthReport>,
}

struct MonitorInner {
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    notifier: Option<ErrorNotifier>,
    checks: Mutex<BTreeMap<String, HealthEntry>>,
    state: Mutex<MonitorState>,
    jobs: Mutex<JobSet>,
}

impl MonitorInner {
    fn checks(&self) -> MutexGuard<'_, BTreeMap<String, HealthEntry>> {
        self.checks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn jobs(&self) -> MutexGuard<'_, JobSet> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to the health monitor
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.inner.config)
            .field("checks", &self.check_names())
            .finish()
    }
}

impl HealthMonitor {
    /// Create a monitor; critical reports are forwarded to `notifier` when given
    pub fn new(config: &HealthConfig, notifier: Option<ErrorNotifier>) -> Self {
        Self::with_clock(config, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &HealthConfig,
        notifier: Option<ErrorNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config: config.clone(),
                clock,
                notifier,
                checks: Mutex::new(BTreeMap::new()),
                state: Mutex::new(MonitorState::default()),
                jobs: Mutex::new(JobSet::new()),
            }),
        }
    }

    /// Register a check, replacing any check with the same name
    pub fn register(&self, check: Arc<dyn HealthCheck>) {
        let name = check.name().to_string();
        let entry = HealthEntry {
            check,
            enabled: true,
            last_result: None,
            last_executed: None,
            failures: 0,
        };
        if self.inner.checks().insert(name.clone(), entry).is_some() {
            warn!("Health check {} registered twice, replacing it", name);
        } else {
            debug!("Registered health check {}", name);
        }
    }

    /// Enable or disable a check, returning `false` if no check has that name
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.inner.checks().get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn check_names(&self) -> Vec<String> {
        self.inner.checks().keys().cloned().collect()
    }

    pub fn check_state(&self, name: &str) -> Option<CheckState> {
        self.inner.checks().get(name).map(|entry| CheckState {
            name: name.to_string(),
            enabled: entry.enabled,
            last_result: entry.last_result.clone(),
            last_executed: entry.last_executed,
            failures: entry.failures,
        })
    }

    /// Run every enabled check concurrently and record the report
    ///
    /// A check that returns an error, panics or exceeds the check timeout
    /// yields a critical result; this method itself never fails.
    pub async fn run_all_checks(&self) -> HealthReport {
        let started = Instant::now();
        let timestamp = self.inner.clock.now();

        let checks: Vec<(String, Arc<dyn HealthCheck>)> = self
            .inner
            .checks()
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.check)))
            .collect();

        let runs = checks
            .into_iter()
            .map(|(name, check)| async move { (name, self.execute(check).await) });
        let results: BTreeMap<String, CheckResult> = join_all(runs).await.into_iter().collect();

        {
            let mut entries = self.inner.checks();
            for (name, result) in &results {
                if let Some(entry) = entries.get_mut(name) {
                    entry.failures = if result.status == HealthStatus::Healthy {
                        0
                    } else {
                        entry.failures.saturating_add(1)
                    };
                    entry.last_executed = Some(result.timestamp);
                    entry.last_result = Some(result.clone());
                }
            }
        }

        let report = HealthReport::new(results, timestamp, started.elapsed().as_millis() as u64);
        self.record(report.clone());

        match report.overall {
            HealthStatus::Healthy => debug!(
                "Health checks passed: {} checks in {}ms",
                report.summary.total, report.execution_time_ms
            ),
            status => warn!(
                "Health status {}: {} warning, {} critical of {} checks",
                status, report.summary.warning, report.summary.critical, report.summary.total
            ),
        }

        if report.overall == HealthStatus::Critical {
            self.notify_critical(&report);
        }

        report
    }

    /// Execute one check on its own task so a panic stays contained
    async fn execute(&self, check: Arc<dyn HealthCheck>) -> CheckResult {
        let timeout = self.inner.config.check_timeout();
        let started = Instant::now();

        let task = tokio::spawn(async move { check.run().await });
        let abort = task.abort_handle();
        let outcome = tokio::time::timeout(timeout, task).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let now = self.inner.clock.now();
        match outcome {
            Ok(Ok(Ok(outcome))) => CheckResult::from_outcome(outcome, duration_ms, now),
            Ok(Ok(Err(e))) => CheckResult::failed(e.to_string(), duration_ms, now),
            Ok(Err(join_error)) => CheckResult::failed(
                HealthCheckError::Failed(format!("check panicked: {}", join_error)).to_string(),
                duration_ms,
                now,
            ),
            Err(_) => {
                abort.abort();
                CheckResult::failed(
                    HealthCheckError::Timeout(timeout.as_millis() as u64).to_string(),
                    duration_ms,
                    now,
                )
            }
        }
    }

    fn record(&self, report: HealthReport) {
        let mut state = self.inner.state();
        state.history.push_back(report.clone());
        while state.history.len() > MAX_HEALTH_HISTORY {
            state.history.pop_front();
        }
        state.latest = Some(report);
    }

    fn notify_critical(&self, report: &HealthReport) {
        let Some(notifier) = &self.inner.notifier else {
            return;
        };

        let failing = report.critical_checks();
        error!("Critical health checks: {}", failing.join(", "));

        let context = ErrorContext::default()
            .with_extra("checks", json!(failing))
            .with_extra("summary", json!(report.summary));
        notifier.report_meta_error(
            HEALTH_CHECK_CRITICAL,
            format!("Health check critical: {}", failing.join(", ")),
            Severity::Critical,
            context,
        );
    }

    /// The cached report, or a fresh run when it is missing or older than two intervals
    pub async fn get_current_health(&self) -> HealthReport {
        let now = self.inner.clock.now();
        let interval_ms = self.inner.config.interval_ms.min(MAX_INTERVAL_MS);
        let max_age = Duration::milliseconds(interval_ms as i64 * 2);

        let cached = self
            .inner
            .state()
            .latest
            .clone()
            .filter(|report| now - report.timestamp <= max_age);

        match cached {
            Some(report) => report,
            None => self.run_all_checks().await,
        }
    }

    /// The newest `limit` reports, oldest first
    pub fn get_health_history(&self, limit: usize) -> Vec<HealthReport> {
        let state = self.inner.state();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Compare the last three reports against the three before them
    pub fn get_health_trends(&self) -> HealthTrends {
        let state = self.inner.state();
        let history = &state.history;

        if history.len() < 2 {
            return HealthTrends {
                trend: Trend::Stable,
                recent_average: None,
                previous_average: None,
                data: Vec::new(),
            };
        }

        let recent_start = history.len().saturating_sub(TREND_WINDOW);
        let previous_start = recent_start.saturating_sub(TREND_WINDOW);

        let average = |range: std::ops::Range<usize>| -> Option<f64> {
            if range.is_empty() {
                return None;
            }
            let len = range.len() as f64;
            let sum: f64 = history.range(range).map(HealthReport::health_percentage).sum();
            Some(sum / len)
        };

        let recent_average = average(recent_start..history.len());
        let previous_average = average(previous_start..recent_start);

        let trend = match (recent_average, previous_average) {
            (Some(recent), Some(previous)) if recent - previous > TREND_DELTA => Trend::Improving,
            (Some(recent), Some(previous)) if recent - previous < -TREND_DELTA => Trend::Degrading,
            _ => Trend::Stable,
        };

        let data = history
            .range(previous_start..)
            .map(|report| TrendPoint {
                timestamp: report.timestamp,
                overall: report.overall,
                health_percentage: report.health_percentage(),
            })
            .collect();

        HealthTrends {
            trend,
            recent_average,
            previous_average,
            data,
        }
    }

    /// Drop reports older than a day, returning how many were removed
    pub fn cleanup_history(&self) -> usize {
        let cutoff = self.inner.clock.now() - Duration::hours(HISTORY_RETENTION_HOURS);
        let mut state = self.inner.state();
        let before = state.history.len();
        state.history.retain(|report| report.timestamp >= cutoff);
        let removed = before - state.history.len();
        if removed > 0 {
            debug!("Removed {} health reports older than {}h", removed, HISTORY_RETENTION_HOURS);
        }
        removed
    }

    /// Start periodic monitoring and history cleanup
    pub fn start(&self) {
        let mut jobs = self.inner.jobs();
        if !jobs.is_empty() {
            debug!("Health monitor already running");
            return;
        }

        jobs.every(
            "health-checks",
            self.inner.config.interval(),
            Arc::downgrade(&self.inner),
            |inner| async move {
                HealthMonitor { inner }.run_all_checks().await;
            },
        );
        jobs.every(
            "health-history-cleanup",
            HISTORY_CLEANUP_INTERVAL,
            Arc::downgrade(&self.inner),
            |inner| async move {
                HealthMonitor { inner }.cleanup_history();
            },
        );

        if !jobs.is_empty() {
            info!(
                "Health monitoring started every {}ms with {} checks",
                self.inner.config.interval_ms,
                self.inner.checks().len()
            );
        }
    }

    pub fn scheduled_jobs(&self) -> Vec<String> {
        self.inner
            .jobs()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn shutdown(&self) {
        let aborted = self.inner.jobs().abort_all();
        if aborted > 0 {
            info!("Health monitor stopped {} jobs", aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::channels::testing::RecordingChannel;
    use crate::alerts::NotificationDispatcher;
    use crate::clock::MockClock;
    use crate::config::NotificationConfig;
    use crate::monitoring::checks::testing::{FailingCheck, PanickingCheck, SlowCheck, StaticCheck};

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(&HealthConfig::default(), None)
    }

    fn fixed_history(monitor: &HealthMonitor, percentages: &[(usize, usize)]) {
        let now = chrono::Utc::now();
        let mut state = monitor.inner.state();
        for (i, (healthy, total)) in percentages.iter().enumerate() {
            let results = (0..*total)
                .map(|n| {
                    let status = if n < *healthy {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Warning
                    };
                    let outcome = CheckOutcome::new(status, "fixed");
                    (format!("check{}", n), CheckResult::from_outcome(outcome, 1, now))
                })
                .collect();
            state
                .history
                .push_back(HealthReport::new(results, now + Duration::seconds(i as i64), 1));
        }
    }

    #[tokio::test]
    async fn test_failing_check_is_critical_and_isolated() {
        let monitor = monitor();
        monitor.register(Arc::new(StaticCheck::healthy("database")));
        monitor.register(Arc::new(StaticCheck::new("disk", HealthStatus::Warning)));
        monitor.register(Arc::new(FailingCheck::new("cache")));

        let report = monitor.run_all_checks().await;

        assert_eq!(report.overall, HealthStatus::Critical);
        let failed = &report.results["cache"];
        assert_eq!(failed.status, HealthStatus::Critical);
        assert!(failed.error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(report.results["database"].status, HealthStatus::Healthy);
        assert_eq!(report.results["disk"].status, HealthStatus::Warning);
        assert_eq!(
            report.summary,
            HealthSummary {
                total: 3,
                healthy: 1,
                warning: 1,
                critical: 1
            }
        );
    }

    #[tokio::test]
    async fn test_panicking_check_becomes_critical() {
        let monitor = monitor();
        monitor.register(Arc::new(PanickingCheck::new("boom")));
        monitor.register(Arc::new(StaticCheck::healthy("ok")));

        let report = monitor.run_all_checks().await;

        assert_eq!(report.results["boom"].status, HealthStatus::Critical);
        assert!(report.results["boom"].error.as_deref().unwrap().contains("panicked"));
        assert_eq!(report.results["ok"].status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_slow_check_times_out() {
        let config = HealthConfig {
            check_timeout_ms: 50,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(&config, None);
        monitor.register(Arc::new(SlowCheck::new(
            "slow",
            std::time::Duration::from_secs(5),
        )));

        let started = Instant::now();
        let report = monitor.run_all_checks().await;

        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        let result = &report.results["slow"];
        assert_eq!(result.status, HealthStatus::Critical);
        assert!(result.error.as_deref().unwrap().contains("timed out after 50ms"));
    }

    #[tokio::test]
    async fn test_checks_run_concurrently() {
        let monitor = monitor();
        for name in ["a", "b", "c"] {
            monitor.register(Arc::new(SlowCheck::new(
                name,
                std::time::Duration::from_millis(200),
            )));
        }

        let started = Instant::now();
        let report = monitor.run_all_checks().await;

        assert_eq!(report.overall, HealthStatus::Healthy);
        assert!(started.elapsed() < std::time::Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_disabled_checks_are_skipped() {
        let monitor = monitor();
        monitor.register(Arc::new(FailingCheck::new("flaky")));
        monitor.register(Arc::new(StaticCheck::healthy("ok")));

        assert!(monitor.set_enabled("flaky", false));
        assert!(!monitor.set_enabled("missing", false));

        let report = monitor.run_all_checks().await;
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.overall, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failure_counter_resets_on_healthy() {
        let monitor = monitor();
        let check = StaticCheck::new("flaky", HealthStatus::Warning);
        monitor.register(Arc::new(check.clone()));

        monitor.run_all_checks().await;
        monitor.run_all_checks().await;
        let state = monitor.check_state("flaky").unwrap();
        assert_eq!(state.failures, 2);
        assert!(state.last_executed.is_some());
        assert_eq!(
            state.last_result.map(|r| r.status),
            Some(HealthStatus::Warning)
        );

        check.set_status(HealthStatus::Healthy);
        monitor.run_all_checks().await;
        assert_eq!(monitor.check_state("flaky").unwrap().failures, 0);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let monitor = monitor();
        monitor.register(Arc::new(StaticCheck::healthy("ok")));

        for _ in 0..(MAX_HEALTH_HISTORY + 1) {
            monitor.run_all_checks().await;
        }

        assert_eq!(monitor.get_health_history(usize::MAX).len(), MAX_HEALTH_HISTORY);
        let last_two = monitor.get_health_history(2);
        assert_eq!(last_two.len(), 2);
        assert!(last_two[0].timestamp <= last_two[1].timestamp);
    }

    #[tokio::test]
    async fn test_critical_report_notifies() {
        let channel = RecordingChannel::succeeding("slack");
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.add_channel(Arc::new(channel.clone()));
        let notifier = ErrorNotifier::new(&NotificationConfig::default(), dispatcher);

        let monitor = HealthMonitor::new(&HealthConfig::default(), Some(notifier.clone()));
        monitor.register(Arc::new(FailingCheck::new("database")));
        monitor.run_all_checks().await;

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].error_type, HEALTH_CHECK_CRITICAL);
        assert_eq!(sent[0].severity, Severity::Critical);
        assert!(sent[0].message.contains("database"));
    }

    #[tokio::test]
    async fn test_current_health_uses_fresh_cache() {
        let monitor = monitor();
        monitor.register(Arc::new(StaticCheck::healthy("ok")));

        let first = monitor.run_all_checks().await;
        let current = monitor.get_current_health().await;

        assert_eq!(current, first);
        assert_eq!(monitor.get_health_history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_current_health_reruns_when_stale() {
        let start = chrono::Utc::now();
        let time = Arc::new(Mutex::new(start));
        let shared = Arc::clone(&time);
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .returning(move || *shared.lock().unwrap());

        let monitor = HealthMonitor::with_clock(&HealthConfig::default(), None, Arc::new(clock));
        monitor.register(Arc::new(StaticCheck::healthy("ok")));
        monitor.run_all_checks().await;

        *time.lock().unwrap() = start + Duration::milliseconds(2 * 60_000 + 1);
        let current = monitor.get_current_health().await;

        assert!(current.timestamp > start);
        assert_eq!(monitor.get_health_history(10).len(), 2);
    }

    #[tokio::test]
    async fn test_current_health_with_huge_interval_keeps_cache() {
        let config = HealthConfig {
            interval_ms: u64::MAX,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(&config, None);
        monitor.register(Arc::new(StaticCheck::healthy("ok")));

        let first = monitor.run_all_checks().await;
        assert_eq!(monitor.get_current_health().await, first);
        assert_eq!(monitor.get_health_history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_current_health_runs_without_cache() {
        let monitor = monitor();
        monitor.register(Arc::new(StaticCheck::healthy("ok")));

        let report = monitor.get_current_health().await;
        assert_eq!(report.summary.total, 1);
    }

    #[test]
    fn test_trends_need_two_reports() {
        let monitor = monitor();
        fixed_history(&monitor, &[(1, 1)]);

        let trends = monitor.get_health_trends();
        assert_eq!(trends.trend, Trend::Stable);
        assert!(trends.data.is_empty());
        assert_eq!(trends.recent_average, None);
    }

    #[test]
    fn test_trends_degrading() {
        let monitor = monitor();
        fixed_history(&monitor, &[(4, 4), (4, 4), (4, 4), (2, 4), (2, 4), (3, 4)]);

        let trends = monitor.get_health_trends();
        assert_eq!(trends.trend, Trend::Degrading);
        assert_eq!(trends.previous_average, Some(100.0));
        assert_eq!(trends.data.len(), 6);
    }

    #[test]
    fn test_trends_improving() {
        let monitor = monitor();
        fixed_history(
            &monitor,
            &[(0, 4), (1, 4), (1, 4), (1, 4), (4, 4), (4, 4), (4, 4)],
        );

        let trends = monitor.get_health_trends();
        assert_eq!(trends.trend, Trend::Improving);
        assert_eq!(trends.recent_average, Some(100.0));
        assert_eq!(trends.previous_average, Some(25.0));
        assert_eq!(trends.data.len(), 6);
    }

    #[test]
    fn test_trends_small_change_is_stable() {
        let monitor = monitor();
        fixed_history(
            &monitor,
            &[(19, 20), (19, 20), (19, 20), (20, 20), (20, 20), (20, 20)],
        );

        assert_eq!(monitor.get_health_trends().trend, Trend::Stable);
    }

    #[test]
    fn test_cleanup_history_drops_old_reports() {
        let monitor = monitor();
        {
            let mut state = monitor.inner.state();
            let old = chrono::Utc::now() - Duration::hours(25);
            state
                .history
                .push_back(HealthReport::new(BTreeMap::new(), old, 1));
            state
                .history
                .push_back(HealthReport::new(BTreeMap::new(), chrono::Utc::now(), 1));
        }

        assert_eq!(monitor.cleanup_history(), 1);
        assert_eq!(monitor.get_health_history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let config = HealthConfig {
            interval_ms: 20,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(&config, None);
        monitor.register(Arc::new(StaticCheck::healthy("ok")));

        monitor.start();
        assert_eq!(monitor.scheduled_jobs().len(), 2);
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert!(!monitor.get_health_history(10).is_empty());

        monitor.shutdown();
        assert!(monitor.scheduled_jobs().is_empty());
    }
}
