//! Notification gating: severity, per-fingerprint cooldown and the hourly cap

use crate::aggregator::ErrorAggregator;
use crate::alerts::NotificationLog;
use crate::events::{ErrorRecord, NotificationRecord, Severity, Timestamp};
use chrono::Duration;
use serde::Serialize;
use std::collections::HashMap;

/// Why the gate let a notification through or held it back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Critical error outside its cooldown
    Critical,
    /// The hourly cap is reached
    RateLimited,
    /// The fingerprint was notified within the cooldown window
    CoolingDown,
    /// Enough errors with this fingerprint in the last hour to notify regardless of severity
    Burst,
    /// High severity error
    High,
    /// Nothing warrants a notification
    Suppressed,
}

impl GateDecision {
    pub fn should_notify(self) -> bool {
        matches!(
            self,
            GateDecision::Critical | GateDecision::Burst | GateDecision::High
        )
    }
}

/// Decides whether an error gets dispatched
///
/// Owns the cooldown table and the notification log. All checks take `now`
/// explicitly so the caller controls the time source.
#[derive(Debug)]
pub struct NotificationGate {
    /// Minimum time between two notifications for one fingerprint
    cooldown: Duration,
    /// Same-fingerprint errors per hour that force a notification
    critical_threshold: usize,
    /// Fingerprint -> last notification time
    cooldowns: HashMap<String, Timestamp>,
    /// Dispatch attempts for rate accounting
    log: NotificationLog,
}

impl NotificationGate {
    /// Create a gate
    ///
    /// # Arguments
    ///
    /// * `max_per_hour` - Hourly notification cap for non-critical errors
    /// * `cooldown` - Minimum time between notifications for one fingerprint
    /// * `critical_threshold` - Errors per fingerprint per hour treated as a burst
    pub fn new(max_per_hour: usize, cooldown: Duration, critical_threshold: usize) -> Self {
        Self {
            cooldown,
            critical_threshold,
            cooldowns: HashMap::new(),
            log: NotificationLog::new(max_per_hour),
        }
    }

    /// Evaluate the decision order for `record`
    ///
    /// `aggregator` must already contain `record`, so the burst count includes it.
    pub fn evaluate(
        &self,
        record: &ErrorRecord,
        aggregator: &ErrorAggregator,
        now: Timestamp,
    ) -> GateDecision {
        let in_cooldown = self.is_in_cooldown(&record.fingerprint, now);

        if record.severity == Severity::Critical {
            return if in_cooldown {
                GateDecision::CoolingDown
            } else {
                GateDecision::Critical
            };
        }

        if self.log.is_limited(now) {
            return GateDecision::RateLimited;
        }

        if in_cooldown {
            return GateDecision::CoolingDown;
        }

        let recent = aggregator.count_fingerprint_since(&record.fingerprint, now - Duration::hours(1));
        if recent >= self.critical_threshold {
            return GateDecision::Burst;
        }

        if record.severity == Severity::High {
            return GateDecision::High;
        }

        GateDecision::Suppressed
    }

    /// Shorthand for `evaluate(..).should_notify()`
    pub fn should_notify(
        &self,
        record: &ErrorRecord,
        aggregator: &ErrorAggregator,
        now: Timestamp,
    ) -> bool {
        self.evaluate(record, aggregator, now).should_notify()
    }

    /// Whether `fingerprint` was notified less than one cooldown ago
    pub fn is_in_cooldown(&self, fingerprint: &str, now: Timestamp) -> bool {
        self.cooldowns
            .get(fingerprint)
            .is_some_and(|last| now - *last < self.cooldown)
    }

    /// Start the cooldown window for `fingerprint`
    ///
    /// The stored time never moves backwards.
    pub fn mark_notified(&mut self, fingerprint: &str, now: Timestamp) {
        self.cooldowns
            .entry(fingerprint.to_string())
            .and_modify(|last| {
                if now > *last {
                    *last = now;
                }
            })
            .or_insert(now);
    }

    pub fn last_notified(&self, fingerprint: &str) -> Option<Timestamp> {
        self.cooldowns.get(fingerprint).copied()
    }

    /// Number of fingerprints still inside their cooldown window
    pub fn active_cooldowns(&self, now: Timestamp) -> usize {
        self.cooldowns
            .values()
            .filter(|last| now - **last < self.cooldown)
            .count()
    }

    /// Account for a dispatch attempt
    pub fn record_attempt(&mut self, record: NotificationRecord) {
        self.log.record(record);
    }

    /// Claim an hourly slot for `record` before its dispatch starts
    ///
    /// The reserved attempt counts against the cap right away and carries zero
    /// deliveries until [`NotificationGate::complete_attempt`] fills them in.
    pub fn reserve_attempt(&mut self, record: &ErrorRecord, now: Timestamp) {
        self.log.record(NotificationRecord {
            error_id: record.id.clone(),
            timestamp: now,
            successful: 0,
            failed: 0,
            severity: record.severity,
            fingerprint: record.fingerprint.clone(),
        });
    }

    /// Store the delivery counts of a reserved attempt
    ///
    /// Records a fresh attempt if the reservation was already evicted.
    pub fn complete_attempt(&mut self, record: &ErrorRecord, successful: usize, failed: usize, now: Timestamp) {
        if !self.log.complete(&record.id, successful, failed) {
            self.log.record(NotificationRecord {
                error_id: record.id.clone(),
                timestamp: now,
                successful,
                failed,
                severity: record.severity,
                fingerprint: record.fingerprint.clone(),
            });
        }
    }

    /// Give back the slot of an attempt that never started
    pub fn release_attempt(&mut self, error_id: &str) -> bool {
        self.log.remove(error_id)
    }

    pub fn log(&self) -> &NotificationLog {
        &self.log
    }
}
