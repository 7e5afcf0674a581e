use crate::aggregator::ErrorAggregator;
use crate::config::NotificationConfig;
use crate::events::{ErrorContext, ErrorRecord, Severity, Timestamp};
use crate::triggers::rules::{ErrorRateRule, ErrorSpikeRule, NewErrorTypeRule};
use chrono::Duration;
use log::info;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Engine evaluating pattern rules over the stored error history
pub struct PatternAnalyzer {
    rules: Vec<Box<dyn PatternRule>>,
}

/// Trait for rules that look for patterns in recent errors
pub trait PatternRule: Send + Sync {
    /// Inspect the errors of the last hour against those older than a week
    ///
    /// Neither slice contains meta errors raised by the watcher itself.
    fn evaluate(&self, recent: &[&ErrorRecord], historical: &[&ErrorRecord]) -> Vec<PatternDetection>;

    /// Get a human-readable name for this rule
    fn name(&self) -> &str;
}

/// A pattern found by a rule, reported back through the notifier as a meta error
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatternDetection {
    /// Name of the rule that fired
    pub rule: String,
    /// Meta error type, e.g. `error_spike`
    pub error_type: String,
    pub severity: Severity,
    pub message: String,
    /// Rule-specific facts such as counts, rates and fingerprints
    pub details: HashMap<String, Value>,
}

impl PatternDetection {
    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        self.details.get(key).and_then(Value::as_u64)
    }

    /// Build the meta error record reported for this detection
    pub fn to_record(&self, now: Timestamp) -> ErrorRecord {
        let context = ErrorContext {
            extra: self.details.clone(),
            ..ErrorContext::default()
        };
        ErrorAggregator::build_meta_record(
            &self.error_type,
            self.message.clone(),
            self.severity,
            context,
            now,
        )
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternAnalyzer {
    /// Create an analyzer with no rules
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create an analyzer with the rate, spike and novelty rules
    pub fn from_config(config: &NotificationConfig) -> Self {
        let mut analyzer = Self::new();
        analyzer.add_rule(Box::new(ErrorRateRule::new(config.error_rate_threshold)));
        analyzer.add_rule(Box::new(ErrorSpikeRule::new(config.critical_error_threshold)));
        analyzer.add_rule(Box::new(NewErrorTypeRule));
        analyzer
    }

    pub fn add_rule(&mut self, rule: Box<dyn PatternRule>) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run every rule over the history held by `aggregator`
    ///
    /// "Recent" is the last hour before `now`, "historical" everything older
    /// than one week. Records between the two windows are not consulted.
    pub fn analyze(&self, aggregator: &ErrorAggregator, now: Timestamp) -> Vec<PatternDetection> {
        let recent: Vec<&ErrorRecord> = aggregator
            .records_since(now - Duration::hours(1))
            .into_iter()
            .filter(|record| !record.is_meta())
            .collect();
        if recent.is_empty() {
            return Vec::new();
        }

        let historical: Vec<&ErrorRecord> = aggregator
            .records_before(now - Duration::weeks(1))
            .into_iter()
            .filter(|record| !record.is_meta())
            .collect();

        let mut detections = Vec::new();
        for rule in &self.rules {
            let found = rule.evaluate(&recent, &historical);
            for detection in &found {
                info!("Pattern detected by {}: {}", rule.name(), detection.message);
            }
            detections.extend(found);
        }
        detections
    }
}
