/// Error types for notification delivery, health checks and configuration
pub mod error;

/// Reported errors, request context and notification records
pub mod events;

/// Time source used by the stateful services
pub mod clock;

/// Error history, severity classification and fingerprinting
pub mod aggregator;

/// Pattern analysis over the error history
pub mod triggers;

/// Notification gating, channels and the error notifier service
pub mod alerts;

/// Health checks, reports and trends
pub mod monitoring;

/// Periodic background jobs owned by a service
pub mod jobs;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use alerts::{ErrorNotifier, NotificationDispatcher};
pub use config::Config;
pub use error::{ConfigError, HealthCheckError, NotificationError};
pub use events::{ErrorContext, ErrorRecord, ErrorReport, Severity};
pub use monitoring::{HealthMonitor, HealthReport, HealthStatus};
