//! Core error types and enums for the error watcher
//!
//! This module defines the fundamental data structures used throughout the crate
//! for representing reported errors, their request context, and notification attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Default classification for reports that do not carry a `type`
pub const DEFAULT_ERROR_TYPE: &str = "application_error";

/// Default error name for reports that do not carry a `name`
pub const DEFAULT_ERROR_NAME: &str = "Error";

/// Meta error raised when the overall error rate is above threshold
pub const HIGH_ERROR_RATE: &str = "high_error_rate";
/// Meta error raised when one fingerprint bursts within the last hour
pub const ERROR_SPIKE: &str = "error_spike";
/// Meta error raised for a fingerprint with no history older than a week
pub const NEW_ERROR_TYPE: &str = "new_error_type";
/// Meta error raised when a health report comes back critical
pub const HEALTH_CHECK_CRITICAL: &str = "health_check_critical";

/// Error as handed over by the caller
///
/// Only `message` is required. Missing `name` and `type` are defaulted when the
/// report is turned into an [`ErrorRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    /// Error class name (e.g. `TypeError`, `ValidationError`)
    #[serde(default)]
    pub name: Option<String>,
    /// Human readable error message
    #[serde(default)]
    pub message: String,
    /// Stack trace, if the caller has one
    #[serde(default)]
    pub stack: Option<String>,
    /// Free-form classification
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Request context attached to a reported error
///
/// Known fields are typed; anything else the caller sends lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Severity level derived for every stored error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored error occurrence
///
/// Created once per report and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    /// Unique identifier generated at report time
    pub id: String,
    /// When the error was reported
    pub timestamp: Timestamp,
    /// Free-form classification, `application_error` unless the caller set one
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error class name
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub severity: Severity,
    pub context: ErrorContext,
    /// Deduplication key, see [`crate::aggregator::fingerprint`]
    pub fingerprint: String,
}

impl ErrorRecord {
    /// Whether this record was synthesized by the error watcher itself
    pub fn is_meta(&self) -> bool {
        matches!(
            self.error_type.as_str(),
            HIGH_ERROR_RATE | ERROR_SPIKE | NEW_ERROR_TYPE | HEALTH_CHECK_CRITICAL
        )
    }
}

/// Outcome of one dispatch attempt, kept for rate limiting and statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    /// Back-reference to the error that was notified
    pub error_id: String,
    pub timestamp: Timestamp,
    /// Number of channels that accepted the notification
    pub successful: usize,
    /// Number of channels that failed
    pub failed: usize,
    pub severity: Severity,
    pub fingerprint: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_serialization() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(serde_json::to_string(&Severity::Low).unwrap(), "\"low\"");
        assert_eq!(Severity::High.to_string(), "high");
    }

    #[test]
    fn test_error_report_accepts_minimal_json() {
        let report: ErrorReport = serde_json::from_value(json!({ "message": "boom" })).unwrap();
        assert_eq!(report.message, "boom");
        assert!(report.name.is_none());
        assert!(report.error_type.is_none());
    }

    #[test]
    fn test_error_report_reads_type_field() {
        let report: ErrorReport = serde_json::from_value(json!({
            "name": "ValidationError",
            "message": "bad input",
            "type": "validation"
        }))
        .unwrap();
        assert_eq!(report.error_type.as_deref(), Some("validation"));
        assert_eq!(report.name.as_deref(), Some("ValidationError"));
    }

    #[test]
    fn test_context_known_fields_and_extra() {
        let context: ErrorContext = serde_json::from_value(json!({
            "url": "/api/perfumes",
            "method": "POST",
            "statusCode": 422,
            "userAgent": "curl/8.0",
            "requestId": "abc-123"
        }))
        .unwrap();

        assert_eq!(context.url.as_deref(), Some("/api/perfumes"));
        assert_eq!(context.method.as_deref(), Some("POST"));
        assert_eq!(context.status_code, Some(422));
        assert_eq!(context.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(context.extra.get("requestId"), Some(&json!("abc-123")));
    }

    #[test]
    fn test_context_serializes_camel_case() {
        let context = ErrorContext::default().with_status(500).with_url("/a");
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["statusCode"], json!(500));
        assert_eq!(value["url"], json!("/a"));
        assert!(value.get("method").is_none());
    }

    #[test]
    fn test_meta_records_are_recognised() {
        let mut record = ErrorRecord {
            id: "1".to_string(),
            timestamp: Utc::now(),
            error_type: ERROR_SPIKE.to_string(),
            name: "Error".to_string(),
            message: "spike".to_string(),
            stack: None,
            severity: Severity::High,
            context: ErrorContext::default(),
            fingerprint: "f".to_string(),
        };
        assert!(record.is_meta());

        record.error_type = DEFAULT_ERROR_TYPE.to_string();
        assert!(!record.is_meta());
    }
}
