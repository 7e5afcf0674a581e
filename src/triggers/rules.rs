//! Built-in pattern rules
//!
//! Each rule looks at the errors of the last hour and reports the patterns it
//! finds as [`PatternDetection`]s, which the notifier turns into meta errors.

use crate::events::{ErrorRecord, Severity, ERROR_SPIKE, HIGH_ERROR_RATE, NEW_ERROR_TYPE};
use crate::triggers::{PatternDetection, PatternRule};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Minutes in the analysis window
const WINDOW_MINUTES: f64 = 60.0;

fn details(value: Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

/// Rule that fires when the average error rate over the last hour is too high
///
/// The rate is the number of errors in the window divided by sixty minutes.
pub struct ErrorRateRule {
    /// Errors per minute above which the rule fires
    pub threshold: f64,
}

impl ErrorRateRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl PatternRule for ErrorRateRule {
    fn evaluate(&self, recent: &[&ErrorRecord], _historical: &[&ErrorRecord]) -> Vec<PatternDetection> {
        let rate = recent.len() as f64 / WINDOW_MINUTES;
        if rate <= self.threshold {
            return Vec::new();
        }

        vec![PatternDetection {
            rule: self.name().to_string(),
            error_type: HIGH_ERROR_RATE.to_string(),
            severity: Severity::High,
            message: format!(
                "High error rate detected: {:.2} errors/minute (threshold {})",
                rate, self.threshold
            ),
            details: details(json!({
                "error_rate": rate,
                "count": recent.len(),
                "threshold": self.threshold,
            })),
        }]
    }

    fn name(&self) -> &str {
        "ErrorRateRule"
    }
}

/// Rule that fires once per fingerprint seen at least `threshold` times in the last hour
pub struct ErrorSpikeRule {
    pub threshold: usize,
}

impl ErrorSpikeRule {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl PatternRule for ErrorSpikeRule {
    fn evaluate(&self, recent: &[&ErrorRecord], _historical: &[&ErrorRecord]) -> Vec<PatternDetection> {
        // BTreeMap keeps the detection order stable between runs
        let mut groups: BTreeMap<&str, Vec<&ErrorRecord>> = BTreeMap::new();
        for record in recent {
            groups
                .entry(record.fingerprint.as_str())
                .or_default()
                .push(*record);
        }

        groups
            .into_iter()
            .filter(|(_, records)| records.len() >= self.threshold)
            .filter_map(|(fingerprint, records)| {
                let sample = records.last()?;
                Some(PatternDetection {
                    rule: self.name().to_string(),
                    error_type: ERROR_SPIKE.to_string(),
                    severity: Severity::High,
                    message: format!(
                        "Error spike detected: {} occurrences of {}: {}",
                        records.len(),
                        sample.name,
                        sample.message
                    ),
                    details: details(json!({
                        "fingerprint": fingerprint,
                        "count": records.len(),
                        "sample_message": sample.message,
                        "original_type": sample.error_type,
                    })),
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "ErrorSpikeRule"
    }
}

/// Rule that flags fingerprints never seen in the historical window
///
/// Only records older than a week count as history, so an error first seen
/// a few hours ago is reported as new again on every run.
pub struct NewErrorTypeRule;

impl PatternRule for NewErrorTypeRule {
    fn evaluate(&self, recent: &[&ErrorRecord], historical: &[&ErrorRecord]) -> Vec<PatternDetection> {
        let known: HashSet<&str> = historical
            .iter()
            .map(|record| record.fingerprint.as_str())
            .collect();
        let mut reported: HashSet<String> = HashSet::new();

        recent
            .iter()
            .filter(|record| !known.contains(record.fingerprint.as_str()))
            .filter(|record| reported.insert(record.fingerprint.clone()))
            .map(|record| PatternDetection {
                rule: self.name().to_string(),
                error_type: NEW_ERROR_TYPE.to_string(),
                severity: Severity::Medium,
                message: format!("New error type detected: {}: {}", record.name, record.message),
                details: details(json!({
                    "fingerprint": record.fingerprint,
                    "original_type": record.error_type,
                    "original_name": record.name,
                    "first_seen": record.timestamp.to_rfc3339(),
                })),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "NewErrorTypeRule"
    }
}
