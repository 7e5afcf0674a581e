/// Notification channels and payload formatting
pub mod channels;
/// Concurrent delivery to all channels
pub mod dispatcher;
/// Notification gating
pub mod gate;
pub mod notifier;
pub mod rate_limiter;

pub use channels::{EmailChannel, NotificationChannel, WebhookChannel, WebhookKind};
pub use dispatcher::{ChannelOutcome, DispatchSummary, NotificationDispatcher};
pub use gate::{GateDecision, NotificationGate};
pub use notifier::{ErrorActivity, ErrorNotifier, NotificationStats, ReportOutcome};
pub use rate_limiter::NotificationLog;
