//! Error notification service
//!
//! [`ErrorNotifier`] is the handle the rest of an application talks to. It
//! stores every reported error, asks the [`NotificationGate`] whether to alert,
//! and hands accepted errors to the [`NotificationDispatcher`] on a background
//! task. It also owns the pattern analysis and history cleanup jobs.

use crate::aggregator::{ErrorAggregator, ErrorStats};
use crate::alerts::{DispatchSummary, GateDecision, NotificationDispatcher, NotificationGate};
use crate::clock::{Clock, SystemClock};
use crate::config::NotificationConfig;
use crate::events::{ErrorContext, ErrorRecord, ErrorReport, Severity};
use crate::jobs::JobSet;
use crate::triggers::{PatternAnalyzer, PatternDetection};
use chrono::Duration;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;

/// How often old error records are purged
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Cloneable handle to the notification service
#[derive(Clone)]
pub struct ErrorNotifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    config: NotificationConfig,
    clock: Arc<dyn Clock>,
    dispatcher: NotificationDispatcher,
    analyzer: PatternAnalyzer,
    state: Mutex<NotifierState>,
    jobs: Mutex<JobSet>,
}

/// Everything one report mutates, kept under a single lock
struct NotifierState {
    aggregator: ErrorAggregator,
    gate: NotificationGate,
}

/// What happened to one report, returned by [`ErrorNotifier::report_error_and_wait`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportOutcome {
    pub error_id: String,
    pub severity: Severity,
    pub fingerprint: String,
    pub decision: GateDecision,
    pub notified: bool,
    /// Present when a dispatch was attempted
    pub dispatch: Option<DispatchSummary>,
}

/// Notification statistics over a time range
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationStats {
    pub range_ms: i64,
    /// Dispatch attempts within the range
    pub total: usize,
    pub successful_deliveries: usize,
    pub failed_deliveries: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub sent_last_hour: usize,
    pub max_per_hour: usize,
    pub remaining_this_hour: usize,
    pub active_cooldowns: usize,
    pub channels: Vec<String>,
}

/// Recent error volume, excluding errors raised by the watcher itself
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ErrorActivity {
    pub errors_last_hour: usize,
    pub errors_per_minute: f64,
    pub critical_last_5_minutes: usize,
}

impl std::fmt::Debug for ErrorNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorNotifier")
            .field("config", &self.inner.config)
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

impl NotifierInner {
    fn state(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn jobs(&self) -> MutexGuard<'_, JobSet> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `record` and decide whether it gets dispatched
    ///
    /// A positive decision starts the fingerprint's cooldown and takes a slot
    /// of the hourly cap right away, under the same lock, so reports arriving
    /// while earlier dispatches are still in flight see both.
    fn admit(&self, record: &ErrorRecord) -> GateDecision {
        let mut state = self.state();
        state.aggregator.add(record.clone());

        let decision = state
            .gate
            .evaluate(record, &state.aggregator, record.timestamp);
        if decision.should_notify() {
            state.gate.mark_notified(&record.fingerprint, record.timestamp);
            state.gate.reserve_attempt(record, record.timestamp);
        }

        debug!(
            "Error {} ({}, {}) gate decision: {:?}",
            record.id,
            record.severity,
            record.fingerprint,
            decision
        );
        decision
    }

    /// Dispatch `record` and account for the attempt
    async fn deliver(&self, record: &ErrorRecord) -> DispatchSummary {
        let summary = self.dispatcher.dispatch(record).await;

        if summary.failed > 0 && summary.successful == 0 {
            error!(
                "Notification for error {} failed on all {} channels",
                record.id, summary.failed
            );
        } else {
            info!(
                "Notification for error {} delivered via {} of {} channels",
                record.id,
                summary.successful,
                summary.successful + summary.failed
            );
        }

        let now = self.clock.now();
        self.state()
            .gate
            .complete_attempt(record, summary.successful, summary.failed, now);

        summary
    }
}

impl ErrorNotifier {
    /// Create a notifier reading the system clock
    pub fn new(config: &NotificationConfig, dispatcher: NotificationDispatcher) -> Self {
        Self::with_clock(config, dispatcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &NotificationConfig,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let gate = NotificationGate::new(
            config.max_per_hour,
            config.cooldown(),
            config.critical_error_threshold,
        );

        Self {
            inner: Arc::new(NotifierInner {
                config: config.clone(),
                clock,
                dispatcher,
                analyzer: PatternAnalyzer::from_config(config),
                state: Mutex::new(NotifierState {
                    aggregator: ErrorAggregator::new(config.retention()),
                    gate,
                }),
                jobs: Mutex::new(JobSet::new()),
            }),
        }
    }

    /// Record an error and notify in the background if the gate allows it
    ///
    /// Returns the new error id. Delivery failures are logged, never returned.
    /// Outside a tokio runtime the error is still recorded but no notification
    /// is sent.
    pub fn report_error(&self, error: ErrorReport, context: ErrorContext) -> String {
        let record = ErrorAggregator::build_record(error, context, self.inner.clock.now());
        self.submit(record)
    }

    /// Record an error raised by the watcher itself with a fixed severity
    pub fn report_meta_error(
        &self,
        error_type: &str,
        message: String,
        severity: Severity,
        context: ErrorContext,
    ) -> String {
        let record = ErrorAggregator::build_meta_record(
            error_type,
            message,
            severity,
            context,
            self.inner.clock.now(),
        );
        self.submit(record)
    }

    /// Like [`ErrorNotifier::report_error`], but waits for the dispatch to finish
    pub async fn report_error_and_wait(
        &self,
        error: ErrorReport,
        context: ErrorContext,
    ) -> ReportOutcome {
        let record = ErrorAggregator::build_record(error, context, self.inner.clock.now());
        let decision = self.inner.admit(&record);

        let dispatch = if decision.should_notify() {
            Some(self.inner.deliver(&record).await)
        } else {
            None
        };

        ReportOutcome {
            error_id: record.id,
            severity: record.severity,
            fingerprint: record.fingerprint,
            decision,
            notified: decision.should_notify(),
            dispatch,
        }
    }

    fn submit(&self, record: ErrorRecord) -> String {
        let id = record.id.clone();
        if self.inner.admit(&record).should_notify() {
            self.spawn_delivery(record);
        }
        id
    }

    fn spawn_delivery(&self, record: ErrorRecord) {
        match Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move {
                    inner.deliver(&record).await;
                });
            }
            Err(_) => {
                warn!(
                    "No tokio runtime available, notification for error {} not sent",
                    record.id
                );
                self.inner.state().gate.release_attempt(&record.id);
            }
        }
    }

    /// Error statistics for the last `range`
    pub fn get_error_stats(&self, range: Duration) -> ErrorStats {
        let now = self.inner.clock.now();
        self.inner.state().aggregator.stats(now, range)
    }

    /// Notification statistics for the last `range`
    pub fn get_notification_stats(&self, range: Duration) -> NotificationStats {
        let now = self.inner.clock.now();
        let state = self.inner.state();
        let log = state.gate.log();

        let mut stats = NotificationStats {
            range_ms: range.num_milliseconds(),
            total: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            by_severity: BTreeMap::new(),
            sent_last_hour: log.current_count(now),
            max_per_hour: log.max_per_hour(),
            remaining_this_hour: log.remaining(now),
            active_cooldowns: state.gate.active_cooldowns(now),
            channels: self.inner.dispatcher.channel_names(),
        };

        for attempt in log.records_since(now - range) {
            stats.total += 1;
            stats.successful_deliveries += attempt.successful;
            stats.failed_deliveries += attempt.failed;
            *stats
                .by_severity
                .entry(attempt.severity.as_str().to_string())
                .or_insert(0) += 1;
        }

        stats
    }

    /// Error volume used by the error rate health check
    pub fn error_activity(&self) -> ErrorActivity {
        let now = self.inner.clock.now();
        let state = self.inner.state();
        let last_hour: Vec<&ErrorRecord> = state
            .aggregator
            .records_since(now - Duration::hours(1))
            .into_iter()
            .filter(|record| !record.is_meta())
            .collect();
        let five_minutes_ago = now - Duration::minutes(5);

        ErrorActivity {
            errors_last_hour: last_hour.len(),
            errors_per_minute: last_hour.len() as f64 / 60.0,
            critical_last_5_minutes: last_hour
                .iter()
                .filter(|record| {
                    record.severity == Severity::Critical && record.timestamp >= five_minutes_ago
                })
                .count(),
        }
    }

    /// Run the pattern rules once and report each detection as a meta error
    pub fn run_pattern_analysis(&self) -> Vec<PatternDetection> {
        let now = self.inner.clock.now();
        let detections = {
            let state = self.inner.state();
            self.inner.analyzer.analyze(&state.aggregator, now)
        };

        for detection in &detections {
            self.submit(detection.to_record(now));
        }
        detections
    }

    /// Drop error records older than the retention period
    pub fn cleanup(&self) -> usize {
        let now = self.inner.clock.now();
        let removed = self.inner.state().aggregator.prune_old_entries(now);
        if removed > 0 {
            info!("Removed {} error records past retention", removed);
        }
        removed
    }

    /// Channels notifications are sent to
    pub fn channel_names(&self) -> Vec<String> {
        self.inner.dispatcher.channel_names()
    }

    /// Start the pattern analysis and cleanup jobs
    ///
    /// Does nothing when the jobs are already running or when called outside a
    /// tokio runtime.
    pub fn start(&self) {
        let mut jobs = self.inner.jobs();
        if !jobs.is_empty() {
            debug!("Error notifier jobs already running");
            return;
        }

        jobs.every(
            "pattern-analysis",
            self.inner.config.pattern_analysis_interval(),
            Arc::downgrade(&self.inner),
            |inner| async move {
                let detections = ErrorNotifier { inner }.run_pattern_analysis();
                debug!("Pattern analysis finished with {} detections", detections.len());
            },
        );
        jobs.every(
            "error-cleanup",
            CLEANUP_INTERVAL,
            Arc::downgrade(&self.inner),
            |inner| async move {
                ErrorNotifier { inner }.cleanup();
            },
        );

        if !jobs.is_empty() {
            info!("Error notifier started: {}", jobs.names().join(", "));
        }
    }

    /// Names of the scheduled jobs currently owned by the notifier
    pub fn scheduled_jobs(&self) -> Vec<String> {
        self.inner
            .jobs()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Abort the scheduled jobs
    pub fn shutdown(&self) {
        let aborted = self.inner.jobs().abort_all();
        if aborted > 0 {
            info!("Error notifier stopped {} jobs", aborted);
        }
    }
}
