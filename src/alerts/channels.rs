//! Notification channel implementations
//!
//! Each channel formats its own payload: an HTML email over SMTP, a Slack
//! attachment, a Discord embed, or a plain JSON document for a generic webhook.

use crate::config::EmailConfig;
use crate::error::NotificationError;
use crate::events::{ErrorRecord, Severity};
use askama::Template;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;

/// Port on which SMTP servers expect implicit TLS
const SMTPS_PORT: u16 = 465;

/// Longest subject line sent by the email channel
const MAX_SUBJECT_LEN: usize = 120;

/// Longest message excerpt placed in chat payloads
const MAX_CHAT_MESSAGE_LEN: usize = 1000;

/// Trait for notification channel implementations
pub trait NotificationChannel: Send + Sync {
    /// Short channel name used in logs and statistics
    fn name(&self) -> &str;

    /// Deliver a notification about `record`
    fn send<'a>(
        &'a self,
        record: &'a ErrorRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + 'a>>;
}

/// Truncate text to a maximum byte length without splitting a UTF-8 character
pub(crate) fn truncate_text(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        return text.to_string();
    }

    let mut truncate_at = max_length.saturating_sub(3);
    while truncate_at > 0 && !text.is_char_boundary(truncate_at) {
        truncate_at -= 1;
    }
    format!("{}...", &text[..truncate_at])
}

/// Slack attachment sidebar colour per severity
pub fn slack_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#dc3545",
        Severity::High => "#fd7e14",
        Severity::Medium => "#ffc107",
        Severity::Low => "#17a2b8",
    }
}

/// Discord embed colour per severity
pub fn discord_color(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 0xDC3545,
        Severity::High => 0xFD7E14,
        Severity::Medium => 0xFFC107,
        Severity::Low => 0x17A2B8,
    }
}

fn context_field(value: Option<&str>) -> String {
    value.unwrap_or("N/A").to_string()
}

fn status_field(record: &ErrorRecord) -> String {
    record
        .context
        .status_code
        .map(|s| s.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Slack incoming-webhook payload
pub fn slack_payload(record: &ErrorRecord) -> Value {
    json!({
        "text": format!("{} error detected: {}", record.severity.as_str().to_uppercase(), record.error_type),
        "attachments": [{
            "color": slack_color(record.severity),
            "title": record.name,
            "text": truncate_text(&record.message, MAX_CHAT_MESSAGE_LEN),
            "fields": [
                { "title": "Severity", "value": record.severity.as_str(), "short": true },
                { "title": "Type", "value": record.error_type, "short": true },
                { "title": "URL", "value": context_field(record.context.url.as_deref()), "short": true },
                { "title": "Method", "value": context_field(record.context.method.as_deref()), "short": true },
                { "title": "Status", "value": status_field(record), "short": true },
                { "title": "Error ID", "value": record.id, "short": true }
            ],
            "footer": format!("fingerprint {}", record.fingerprint),
            "ts": record.timestamp.timestamp()
        }]
    })
}

/// Discord webhook payload
pub fn discord_payload(record: &ErrorRecord) -> Value {
    json!({
        "embeds": [{
            "title": format!("{} error: {}", record.severity.as_str().to_uppercase(), record.error_type),
            "description": truncate_text(&record.message, MAX_CHAT_MESSAGE_LEN),
            "color": discord_color(record.severity),
            "fields": [
                { "name": "Name", "value": record.name, "inline": true },
                { "name": "URL", "value": context_field(record.context.url.as_deref()), "inline": true },
                { "name": "Method", "value": context_field(record.context.method.as_deref()), "inline": true },
                { "name": "Status", "value": status_field(record), "inline": true },
                { "name": "Error ID", "value": record.id, "inline": false }
            ],
            "footer": { "text": format!("fingerprint {}", record.fingerprint) },
            "timestamp": record.timestamp.to_rfc3339()
        }]
    })
}

/// Generic webhook payload carrying the whole record
pub fn webhook_payload(record: &ErrorRecord) -> Value {
    json!({
        "event": "error_notification",
        "timestamp": record.timestamp.to_rfc3339(),
        "error": record
    })
}

/// Subject line of the notification email
pub fn email_subject(record: &ErrorRecord) -> String {
    truncate_text(
        &format!(
            "[{}] {}: {}",
            record.severity.as_str().to_uppercase(),
            record.error_type,
            record.message
        ),
        MAX_SUBJECT_LEN,
    )
}

/// One label/value line of the email details table
struct EmailRow {
    label: &'static str,
    value: String,
}

#[derive(Template)]
#[template(path = "error_email.html")]
struct ErrorEmailTemplate<'a> {
    color: &'static str,
    severity: String,
    message: &'a str,
    rows: Vec<EmailRow>,
    stack: Option<&'a str>,
}

/// HTML body of the notification email
///
/// Every value taken from the record is HTML-escaped by the template.
pub fn email_html(record: &ErrorRecord) -> Result<String, NotificationError> {
    let mut rows = vec![
        ("Error ID", record.id.clone()),
        ("Time", record.timestamp.to_rfc3339()),
        ("Severity", record.severity.as_str().to_string()),
        ("Type", record.error_type.clone()),
        ("Name", record.name.clone()),
        ("URL", context_field(record.context.url.as_deref())),
        ("Method", context_field(record.context.method.as_deref())),
        ("Status", status_field(record)),
        ("Fingerprint", record.fingerprint.clone()),
    ];
    if let Some(ip) = &record.context.ip {
        rows.push(("IP", ip.clone()));
    }
    if let Some(agent) = &record.context.user_agent {
        rows.push(("User agent", agent.clone()));
    }

    let template = ErrorEmailTemplate {
        color: slack_color(record.severity),
        severity: record.severity.as_str().to_uppercase(),
        message: &record.message,
        rows: rows
            .into_iter()
            .map(|(label, value)| EmailRow { label, value })
            .collect(),
        stack: record.stack.as_deref(),
    };

    template
        .render()
        .map_err(|e| NotificationError::EmailBuild(format!("template rendering failed: {}", e)))
}

/// Which payload format a webhook endpoint expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Slack,
    Discord,
    Generic,
}

impl WebhookKind {
    pub fn name(self) -> &'static str {
        match self {
            WebhookKind::Slack => "slack",
            WebhookKind::Discord => "discord",
            WebhookKind::Generic => "webhook",
        }
    }

    pub fn payload(self, record: &ErrorRecord) -> Value {
        match self {
            WebhookKind::Slack => slack_payload(record),
            WebhookKind::Discord => discord_payload(record),
            WebhookKind::Generic => webhook_payload(record),
        }
    }
}

/// HTTP webhook channel (Slack, Discord or generic JSON)
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    kind: WebhookKind,
    url: String,
    client: Client,
}

impl WebhookChannel {
    pub fn new(kind: WebhookKind, url: String, client: Client) -> Self {
        Self { kind, url, client }
    }

    pub fn kind(&self) -> WebhookKind {
        self.kind
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn send<'a>(
        &'a self,
        record: &'a ErrorRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&self.kind.payload(record))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(NotificationError::WebhookStatus {
                    channel: self.kind.name().to_string(),
                    status: response.status().as_u16(),
                });
            }

            Ok(())
        })
    }
}

/// SMTP email channel
pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl std::fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannel")
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .finish()
    }
}

impl EmailChannel {
    /// Build the SMTP transport and mailboxes from configuration
    ///
    /// Port 465 uses implicit TLS, every other port STARTTLS. No connection is
    /// opened until the first send.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::ChannelSetup` when the host, sender or
    /// recipient is missing or unparsable.
    pub fn new(config: &EmailConfig) -> Result<Self, NotificationError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::ChannelSetup("SMTP host is not set".to_string()))?;
        let from = config
            .sender()
            .ok_or_else(|| NotificationError::ChannelSetup("sender address is not set".to_string()))?
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::ChannelSetup(format!("invalid sender address: {}", e)))?;
        let to = config
            .recipient
            .as_deref()
            .ok_or_else(|| NotificationError::ChannelSetup("recipient is not set".to_string()))?
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::ChannelSetup(format!("invalid recipient address: {}", e)))?;

        let builder = if config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| NotificationError::ChannelSetup(format!("SMTP transport: {}", e)))?
        .port(config.smtp_port);

        let builder = match (&config.smtp_user, &config.smtp_pass) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        Ok(Self {
            mailer: builder.build(),
            from,
            to,
        })
    }

    /// Build the email for `record`
    pub fn build_message(&self, record: &ErrorRecord) -> Result<Message, NotificationError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(email_subject(record))
            .header(ContentType::TEXT_HTML)
            .body(email_html(record)?)
            .map_err(|e| NotificationError::EmailBuild(e.to_string()))
    }
}

impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn send<'a>(
        &'a self,
        record: &'a ErrorRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + 'a>> {
        Box::pin(async move {
            let message = self.build_message(record)?;
            self.mailer
                .send(message)
                .await
                .map_err(|e| NotificationError::EmailSend(e.to_string()))?;
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Channel that records every send and can be told to fail or stall
    #[derive(Debug, Clone)]
    pub(crate) struct RecordingChannel {
        name: String,
        fail: bool,
        delay: Option<Duration>,
        sent: Arc<Mutex<Vec<ErrorRecord>>>,
    }

    impl RecordingChannel {
        pub(crate) fn succeeding(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail: false,
                delay: None,
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::succeeding(name)
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn sent(&self) -> Vec<ErrorRecord> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn send<'a>(
            &'a self,
            record: &'a ErrorRecord,
        ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + 'a>> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.sent.lock().unwrap().push(record.clone());
                if self.fail {
                    Err(NotificationError::WebhookStatus {
                        channel: self.name.clone(),
                        status: 503,
                    })
                } else {
                    Ok(())
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ErrorAggregator;
    use crate::events::{ErrorContext, ErrorReport};
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_record(status: u16) -> ErrorRecord {
        ErrorAggregator::build_record(
            ErrorReport::new("x is undefined")
                .with_name("TypeError")
                .with_stack("TypeError: x is undefined\n    at handler (app.js:10:5)"),
            ErrorContext::default()
                .with_status(status)
                .with_url("/api/perfumes?brand=<script>")
                .with_method("GET"),
            Utc::now(),
        )
    }

    fn email_config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_port: 587,
            smtp_user: Some("alerts@example.com".to_string()),
            smtp_pass: Some("secret".to_string()),
            from: None,
            recipient: Some("ops@example.com".to_string()),
        }
    }

    #[test]
    fn test_truncate_text_short_text_unchanged() {
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_truncate_text_respects_char_boundaries() {
        let text = "ééééé";
        let truncated = truncate_text(text, 6);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 6);
    }

    #[test]
    fn test_severity_colors_are_distinct() {
        let severities = [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ];
        for (i, a) in severities.iter().enumerate() {
            for b in &severities[i + 1..] {
                assert_ne!(slack_color(*a), slack_color(*b));
                assert_ne!(discord_color(*a), discord_color(*b));
            }
        }
    }

    #[test]
    fn test_slack_payload_shape() {
        let record = create_test_record(500);
        let payload = slack_payload(&record);

        assert_eq!(payload["attachments"][0]["color"], json!("#dc3545"));
        assert_eq!(payload["attachments"][0]["text"], json!("x is undefined"));
        let fields = payload["attachments"][0]["fields"].as_array().unwrap();
        assert!(fields
            .iter()
            .any(|f| f["title"] == json!("Status") && f["value"] == json!("500")));
    }

    #[test]
    fn test_discord_payload_shape() {
        let record = create_test_record(401);
        let payload = discord_payload(&record);

        assert_eq!(payload["embeds"][0]["color"], json!(0xFD7E14));
        assert!(payload["embeds"][0]["title"]
            .as_str()
            .unwrap()
            .starts_with("HIGH"));
    }

    #[test]
    fn test_webhook_payload_carries_record() {
        let record = create_test_record(404);
        let payload = webhook_payload(&record);

        assert_eq!(payload["event"], json!("error_notification"));
        assert_eq!(payload["error"]["id"], json!(record.id));
        assert_eq!(payload["error"]["severity"], json!("medium"));
        assert_eq!(payload["error"]["type"], json!("application_error"));
    }

    #[test]
    fn test_email_html_escapes_user_content() {
        let record = create_test_record(500);
        let html = email_html(&record).unwrap();

        assert!(html.contains("CRITICAL error detected"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Stack trace"));
    }

    #[test]
    fn test_email_html_lists_optional_context() {
        let mut record = create_test_record(404);
        record.stack = None;
        record.context.ip = Some("10.0.0.7".to_string());
        record.context.user_agent = Some("curl/8.0 \"quoted\"".to_string());

        let html = email_html(&record).unwrap();
        assert!(html.contains("10.0.0.7"));
        assert!(html.contains("User agent"));
        assert!(!html.contains("\"quoted\""));
        assert!(!html.contains("Stack trace"));
        assert!(html.contains(&record.fingerprint));
    }

    #[test]
    fn test_email_subject() {
        let record = create_test_record(500);
        assert_eq!(
            email_subject(&record),
            "[CRITICAL] application_error: x is undefined"
        );
    }

    #[tokio::test]
    async fn test_email_channel_builds_message() {
        let channel = EmailChannel::new(&email_config()).unwrap();
        let record = create_test_record(500);

        let message = channel.build_message(&record).unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(formatted.contains("Subject: [CRITICAL] application_error: x is undefined"));
        assert!(formatted.contains("To: ops@example.com"));
        assert!(formatted.contains("From: alerts@example.com"));
        assert_eq!(channel.name(), "email");
    }

    #[tokio::test]
    async fn test_email_channel_requires_valid_recipient() {
        let mut config = email_config();
        config.recipient = Some("not an address".to_string());
        assert!(matches!(
            EmailChannel::new(&config),
            Err(NotificationError::ChannelSetup(_))
        ));
    }

    #[tokio::test]
    async fn test_email_channel_requires_sender() {
        let mut config = email_config();
        config.smtp_user = None;
        config.from = None;
        assert!(EmailChannel::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_slack_webhook_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slack"))
            .and(body_partial_json(json!({ "attachments": [{ "color": "#dc3545" }] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(
            WebhookKind::Slack,
            format!("{}/slack", server.uri()),
            Client::new(),
        );
        let result = channel.send(&create_test_record(500)).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_non_success_status_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(
            WebhookKind::Generic,
            format!("{}/hook", server.uri()),
            Client::new(),
        );
        let result = channel.send(&create_test_record(500)).await;

        match result {
            Err(NotificationError::WebhookStatus { channel, status }) => {
                assert_eq!(channel, "webhook");
                assert_eq!(status, 500);
            }
            other => panic!("expected webhook status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discord_webhook_posts_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/discord"))
            .and(body_partial_json(json!({ "embeds": [{ "color": 0xDC3545 }] })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(
            WebhookKind::Discord,
            format!("{}/discord", server.uri()),
            Client::new(),
        );

        assert!(channel.send(&create_test_record(503)).await.is_ok());
        assert_eq!(channel.name(), "discord");
    }
}
