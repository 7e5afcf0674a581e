//! Error aggregator with time-based retention
//!
//! This module provides the ErrorAggregator which stores every reported error in
//! arrival order and answers the windowed queries used by the notification gate,
//! the pattern rules, and the statistics surface.

use crate::aggregator::classify::{classify_severity, fingerprint};
use crate::events::{
    ErrorContext, ErrorRecord, ErrorReport, Severity, Timestamp, DEFAULT_ERROR_NAME,
    DEFAULT_ERROR_TYPE,
};
use chrono::Duration;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

/// How many fingerprints `stats` lists in `top_errors`
const TOP_ERRORS_LIMIT: usize = 10;

/// Error aggregator backed by an append-only buffer
///
/// Records are never deduplicated on insert. The buffer grows until
/// [`ErrorAggregator::prune_old_entries`] drops everything older than the
/// retention period.
#[derive(Debug)]
pub struct ErrorAggregator {
    records: VecDeque<ErrorRecord>,
    retention: Duration,
}

/// Aggregated view over the errors of a time range
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorStats {
    pub range_ms: i64,
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub top_errors: Vec<TopError>,
}

/// One fingerprint in the `top_errors` list
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopError {
    pub fingerprint: String,
    pub count: usize,
    pub error_type: String,
    pub sample_message: String,
    pub last_seen: Timestamp,
}

impl ErrorAggregator {
    /// Create an aggregator that keeps records for `retention`
    ///
    /// # Examples
    ///
    /// ```
    /// use errwatch::aggregator::ErrorAggregator;
    /// use chrono::Duration;
    ///
    /// let aggregator = ErrorAggregator::new(Duration::days(7));
    /// assert!(aggregator.is_empty());
    /// ```
    pub fn new(retention: Duration) -> Self {
        Self {
            records: VecDeque::new(),
            retention,
        }
    }

    /// Turn a caller report into a record with derived severity and fingerprint
    pub fn build_record(report: ErrorReport, context: ErrorContext, now: Timestamp) -> ErrorRecord {
        let name = report
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_ERROR_NAME.to_string());
        let error_type = report
            .error_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_ERROR_TYPE.to_string());

        let severity = classify_severity(&name, &report.message, &context);
        let fingerprint = fingerprint(&name, &report.message, &context);

        ErrorRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            error_type,
            name,
            message: report.message,
            stack: report.stack,
            severity,
            context,
            fingerprint,
        }
    }

    /// Build a record raised by the watcher itself with a fixed severity
    pub fn build_meta_record(
        error_type: &str,
        message: String,
        severity: Severity,
        context: ErrorContext,
        now: Timestamp,
    ) -> ErrorRecord {
        let fingerprint = fingerprint(error_type, &message, &context);
        ErrorRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            error_type: error_type.to_string(),
            name: error_type.to_string(),
            message,
            stack: None,
            severity,
            context,
            fingerprint,
        }
    }

    /// Append a record
    pub fn add(&mut self, record: ErrorRecord) {
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with `timestamp >= cutoff`
    pub fn records_since(&self, cutoff: Timestamp) -> Vec<&ErrorRecord> {
        self.records
            .iter()
            .filter(|record| record.timestamp >= cutoff)
            .collect()
    }

    /// Records with `timestamp < cutoff`
    pub fn records_before(&self, cutoff: Timestamp) -> Vec<&ErrorRecord> {
        self.records
            .iter()
            .filter(|record| record.timestamp < cutoff)
            .collect()
    }

    /// Number of records sharing `fingerprint` since `cutoff`
    pub fn count_fingerprint_since(&self, fingerprint: &str, cutoff: Timestamp) -> usize {
        self.records
            .iter()
            .filter(|record| record.timestamp >= cutoff && record.fingerprint == fingerprint)
            .count()
    }

    /// Drop records older than the retention period, returning how many were removed
    pub fn prune_old_entries(&mut self, now: Timestamp) -> usize {
        let cutoff = now - self.retention;
        let before = self.records.len();

        // Records are appended in report order, but a caller-supplied clock may
        // step backwards, so filter the whole buffer instead of popping the front
        self.records.retain(|record| record.timestamp >= cutoff);

        before - self.records.len()
    }

    /// Summarize the errors reported within `range` of `now`
    pub fn stats(&self, now: Timestamp, range: Duration) -> ErrorStats {
        let recent = self.records_since(now - range);

        let mut by_severity = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        let mut groups: HashMap<&str, TopError> = HashMap::new();

        for record in &recent {
            *by_severity
                .entry(record.severity.as_str().to_string())
                .or_insert(0) += 1;
            *by_type.entry(record.error_type.clone()).or_insert(0) += 1;

            groups
                .entry(record.fingerprint.as_str())
                .and_modify(|top| {
                    top.count += 1;
                    if record.timestamp >= top.last_seen {
                        top.last_seen = record.timestamp;
                        top.sample_message = record.message.clone();
                    }
                })
                .or_insert_with(|| TopError {
                    fingerprint: record.fingerprint.clone(),
                    count: 1,
                    error_type: record.error_type.clone(),
                    sample_message: record.message.clone(),
                    last_seen: record.timestamp,
                });
        }

        let mut top_errors: Vec<TopError> = groups.into_values().collect();
        top_errors.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        top_errors.truncate(TOP_ERRORS_LIMIT);

        ErrorStats {
            range_ms: range.num_milliseconds(),
            total: recent.len(),
            by_severity,
            by_type,
            top_errors,
        }
    }
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        // Default: keep a week of history
        Self::new(Duration::days(7))
    }
}
