/// Environment variable overrides
pub mod env;
/// Configuration structures and file loading
pub mod settings;

pub use settings::{
    Config, EmailConfig, HealthConfig, NotificationConfig, WebhookConfig, MAX_INTERVAL_MS,
    MAX_RETENTION_DAYS,
};
