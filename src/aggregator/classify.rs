//! Severity derivation and fingerprinting for reported errors

use crate::events::{ErrorContext, Severity};
use sha2::{Digest, Sha256};

/// Error class names raised by the database drivers behind the catalog API
pub const DATABASE_ERROR_NAMES: &[&str] = &[
    "MongoError",
    "MongoServerError",
    "SequelizeError",
    "SequelizeDatabaseError",
    "SequelizeConnectionError",
    "MySQLError",
    "PostgresError",
    "PostgrestError",
    "FirebaseError",
    "QueryFailedError",
];

/// Number of message characters that participate in the fingerprint
const FINGERPRINT_MESSAGE_CHARS: usize = 100;

/// Number of hex digits kept from the SHA-256 digest
const FINGERPRINT_HEX_LEN: usize = 16;

/// Derive the severity of an error
///
/// Rules are checked in a fixed order and the first match wins:
///
/// 1. critical: database driver error name, `ECONNREFUSED`/`Database` in the
///    message, or a 5xx status
/// 2. high: `ValidationError`, `Authentication` in the message, or 401/403
/// 3. medium: any other 4xx status
/// 4. low: everything else
pub fn classify_severity(name: &str, message: &str, context: &ErrorContext) -> Severity {
    let status = context.status_code;

    if DATABASE_ERROR_NAMES.contains(&name)
        || message.contains("ECONNREFUSED")
        || message.contains("Database")
        || status.is_some_and(|s| s >= 500)
    {
        return Severity::Critical;
    }

    if name == "ValidationError"
        || message.contains("Authentication")
        || matches!(status, Some(401) | Some(403))
    {
        return Severity::High;
    }

    if status.is_some_and(|s| s >= 400) {
        return Severity::Medium;
    }

    Severity::Low
}

/// Compute the deduplication fingerprint of an error
///
/// Hashes `name|message[..100]|url|method`, dropping empty components before
/// joining, and keeps the first 16 hex digits of the SHA-256 digest.
pub fn fingerprint(name: &str, message: &str, context: &ErrorContext) -> String {
    let truncated: String = message.chars().take(FINGERPRINT_MESSAGE_CHARS).collect();

    let components = [
        name,
        truncated.as_str(),
        context.url.as_deref().unwrap_or(""),
        context.method.as_deref().unwrap_or(""),
    ];
    let key = components
        .iter()
        .filter(|c| !c.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("|");

    let digest = Sha256::digest(key.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_HEX_LEN);
    hex
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    // Identical inputs always hash to the same fingerprint
    #[quickcheck]
    fn prop_fingerprint_deterministic(
        name: String,
        message: String,
        url: Option<String>,
        method: Option<String>,
    ) -> bool {
        let context = ErrorContext {
            url,
            method,
            ..ErrorContext::default()
        };
        fingerprint(&name, &message, &context) == fingerprint(&name, &message, &context)
    }

    // Severity depends only on the first matching rule, so a 5xx status is always critical
    #[quickcheck]
    fn prop_server_errors_are_critical(name: String, message: String, status: u16) -> bool {
        let status = 500 + status % 100;
        classify_severity(&name, &message, &ErrorContext::default().with_status(status))
            == Severity::Critical
    }
}
