/// Built-in health checks
pub mod checks;
/// Check registry, reports, history and trends
pub mod health_monitor;

pub use checks::{
    CheckOutcome, ErrorRateCheck, HealthCheck, HttpProbeCheck, MemoryCheck,
    NotificationDeliveryCheck, RuntimeLatencyCheck,
};
pub use health_monitor::{
    CheckResult, CheckState, HealthMonitor, HealthReport, HealthStatus, HealthSummary,
    HealthTrends, Trend, TrendPoint, MAX_HEALTH_HISTORY,
};
