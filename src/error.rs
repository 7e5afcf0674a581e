use thiserror::Error;

/// Errors that can occur when delivering a notification through a channel
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{channel} webhook returned status {status}")]
    WebhookStatus { channel: String, status: u16 },

    #[error("Failed to build email: {0}")]
    EmailBuild(String),

    #[error("Failed to send email: {0}")]
    EmailSend(String),

    #[error("Channel setup failed: {0}")]
    ChannelSetup(String),
}

/// Errors that can occur while executing a health check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthCheckError {
    #[error("Check timed out after {0}ms")]
    Timeout(u64),

    #[error("Check failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for HealthCheckError {
    fn from(e: std::io::Error) -> Self {
        HealthCheckError::Io(e.to_string())
    }
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
