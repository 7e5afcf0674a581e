//! Concurrent fan-out of notifications to every configured channel

use crate::alerts::channels::{EmailChannel, NotificationChannel, WebhookChannel, WebhookKind};
use crate::config::Config;
use crate::error::NotificationError;
use crate::events::ErrorRecord;
use futures::future::join_all;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to every webhook request
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of delivering one notification through one channel
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChannelOutcome {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregate result of one dispatch
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DispatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub outcomes: Vec<ChannelOutcome>,
}

/// Sends a notification to all channels at once
///
/// One channel failing or stalling never cancels the others: every send is
/// awaited and its outcome collected.
#[derive(Default, Clone)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("channels", &self.channel_names())
            .finish()
    }
}

impl NotificationDispatcher {
    /// Create a dispatcher with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the channels enabled by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the SMTP transport cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, NotificationError> {
        let mut dispatcher = Self::new();

        if config.email.is_active() {
            dispatcher.add_channel(Arc::new(EmailChannel::new(&config.email)?));
        } else if config.email.enabled {
            warn!("Email notifications enabled but SMTP host or recipient is missing");
        }

        if config.webhooks.enabled {
            let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;

            let endpoints = [
                (WebhookKind::Slack, &config.webhooks.slack_url),
                (WebhookKind::Discord, &config.webhooks.discord_url),
                (WebhookKind::Generic, &config.webhooks.custom_url),
            ];
            for (kind, url) in endpoints {
                if let Some(url) = url {
                    dispatcher.add_channel(Arc::new(WebhookChannel::new(
                        kind,
                        url.clone(),
                        client.clone(),
                    )));
                }
            }
        }

        if dispatcher.is_empty() {
            info!("No notification channels configured, errors will only be recorded");
        } else {
            info!(
                "Notification channels enabled: {}",
                dispatcher.channel_names().join(", ")
            );
        }

        Ok(dispatcher)
    }

    pub fn add_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver `record` to every channel concurrently
    pub async fn dispatch(&self, record: &ErrorRecord) -> DispatchSummary {
        let sends = self.channels.iter().map(|channel| async move {
            let result = channel.send(record).await;
            (channel.name().to_string(), result)
        });

        let mut summary = DispatchSummary::default();
        for (channel, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    debug!("Notification for {} sent via {}", record.id, channel);
                    summary.successful += 1;
                    summary.outcomes.push(ChannelOutcome {
                        channel,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(
                        "Notification for {} failed via {}: {}",
                        record.id, channel, e
                    );
                    summary.failed += 1;
                    summary.outcomes.push(ChannelOutcome {
                        channel,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        summary
    }
}
