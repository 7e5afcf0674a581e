use anyhow::Context;
use clap::Parser;
use errwatch::alerts::{ErrorNotifier, NotificationDispatcher};
use errwatch::config::Config;
use errwatch::events::{ErrorContext, ErrorReport};
use errwatch::monitoring::{
    ErrorRateCheck, HealthMonitor, HealthStatus, HttpProbeCheck, MemoryCheck,
    NotificationDeliveryCheck, RuntimeLatencyCheck,
};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

/// Exit code used by `--check-once` when the overall status is critical
const EXIT_CRITICAL: i32 = 2;

/// Command-line arguments for the error watcher
#[derive(Parser)]
#[command(
    name = "errwatch",
    about = "Error notification and health monitoring daemon",
    long_about = "Collects application error reports, alerts on critical errors, bursts and \
                  spikes through email and webhooks, and runs periodic health checks."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format), overridden by the environment"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging output")]
    verbose: bool,

    /// Run the health checks once and print the report
    #[arg(long, help = "Run all health checks once, print the report as JSON and exit")]
    check_once: bool,

    /// Report errors read from stdin
    #[arg(
        long,
        conflicts_with = "check_once",
        help = "Read {\"error\": ..., \"context\": ...} JSON lines from stdin and report each one"
    )]
    ingest_stdin: bool,
}

/// One line of `--ingest-stdin` input
#[derive(Debug, Deserialize)]
struct IngestLine {
    error: ErrorReport,
    #[serde(default)]
    context: ErrorContext,
}

fn parse_ingest_line(line: &str) -> Result<IngestLine, serde_json::Error> {
    serde_json::from_str(line)
}

/// The notifier and health monitor wired together from one configuration
struct ErrorWatch {
    notifier: ErrorNotifier,
    monitor: HealthMonitor,
}

impl ErrorWatch {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let dispatcher = NotificationDispatcher::from_config(config)
            .context("failed to set up notification channels")?;
        let notifier = ErrorNotifier::new(&config.notifications, dispatcher);
        let monitor = HealthMonitor::new(&config.health, Some(notifier.clone()));

        let watch = Self { notifier, monitor };
        watch.register_checks(config)?;
        Ok(watch)
    }

    fn register_checks(&self, config: &Config) -> anyhow::Result<()> {
        self.monitor.register(Arc::new(MemoryCheck::new(
            config.health.memory_usage_alert_threshold,
        )));
        self.monitor.register(Arc::new(ErrorRateCheck::new(
            self.notifier.clone(),
            config.notifications.error_rate_threshold,
        )));
        self.monitor
            .register(Arc::new(NotificationDeliveryCheck::new(self.notifier.clone())));

        if config.health.detailed {
            self.monitor.register(Arc::new(RuntimeLatencyCheck));

            let client = reqwest::Client::builder()
                .timeout(config.health.check_timeout())
                .build()
                .context("failed to build HTTP probe client")?;
            for url in &config.health.urls {
                self.monitor.register(Arc::new(HttpProbeCheck::new(
                    url,
                    client.clone(),
                    config.health.slow_request_threshold_ms,
                    config.health.response_time_threshold_ms,
                )));
            }
        } else if !config.health.urls.is_empty() {
            info!("HTTP probes configured but detailed health checks are disabled");
        }

        info!(
            "Registered health checks: {}",
            self.monitor.check_names().join(", ")
        );
        Ok(())
    }

    async fn start(&self) {
        self.notifier.start();
        self.monitor.start();

        let report = self.monitor.run_all_checks().await;
        info!(
            "Initial health status: {} ({}/{} checks healthy)",
            report.overall, report.summary.healthy, report.summary.total
        );
    }

    /// Report every JSON line from stdin until it closes
    async fn ingest_stdin(&self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut count = 0usize;

        while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_ingest_line(line) {
                Ok(IngestLine { error, context }) => {
                    let outcome = self.notifier.report_error_and_wait(error, context).await;
                    count += 1;
                    info!(
                        "Reported error {} ({}, notified: {})",
                        outcome.error_id, outcome.severity, outcome.notified
                    );
                }
                Err(e) => warn!("Skipping malformed input line: {}", e),
            }
        }

        info!("stdin closed after {} error reports", count);
        Ok(())
    }

    fn stop(&self) {
        self.notifier.shutdown();
        self.monitor.shutdown();

        let stats = self.notifier.get_error_stats(chrono::Duration::hours(24));
        info!(
            "Shutting down: {} errors recorded in the last 24h, {} distinct fingerprints",
            stats.total,
            stats.top_errors.len()
        );
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let watch = ErrorWatch::new(&config)?;

    if cli.check_once {
        let report = watch.monitor.run_all_checks().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        let code = if report.overall == HealthStatus::Critical {
            EXIT_CRITICAL
        } else {
            0
        };
        return Ok(code);
    }

    watch.start().await;

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        signal.notify_one();
    })
    .context("failed to install SIGINT handler")?;

    if cli.ingest_stdin {
        tokio::select! {
            result = watch.ingest_stdin() => result?,
            _ = shutdown.notified() => {}
        }
    } else {
        info!("errwatch is running. Press Ctrl+C to stop.");
        shutdown.notified().await;
    }

    watch.stop();
    Ok(0)
}

/// Logger reading its filter from `env`, defaulting by verbosity
fn logger_builder(env: env_logger::Env<'_>, verbose: bool) -> env_logger::Builder {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env.default_filter_or(default_filter))
}

fn main() {
    let cli = Cli::parse();

    // Before the logger, so RUST_LOG may come from .env
    let dotenv = dotenvy::dotenv();

    logger_builder(env_logger::Env::default(), cli.verbose).init();

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(0) => info!("errwatch shutdown complete"),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_filter_comes_from_loaded_env_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ERRWATCH_TEST_LOG_FILTER=warn").unwrap();
        dotenvy::from_path(file.path()).unwrap();

        let env = env_logger::Env::new().filter("ERRWATCH_TEST_LOG_FILTER");
        let logger = logger_builder(env, true).build();
        assert_eq!(logger.filter(), log::LevelFilter::Warn);

        let unset = env_logger::Env::new().filter("ERRWATCH_TEST_LOG_FILTER_UNSET");
        assert_eq!(logger_builder(unset, true).build().filter(), log::LevelFilter::Debug);
        let unset = env_logger::Env::new().filter("ERRWATCH_TEST_LOG_FILTER_UNSET");
        assert_eq!(logger_builder(unset, false).build().filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from(["errwatch", "--config", "errwatch.toml", "-v", "--check-once"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("errwatch.toml")));
        assert!(cli.verbose);
        assert!(cli.check_once);
        assert!(!cli.ingest_stdin);
    }

    #[test]
    fn test_cli_rejects_conflicting_modes() {
        assert!(Cli::try_parse_from(["errwatch", "--check-once", "--ingest-stdin"]).is_err());
    }

    #[test]
    fn test_parse_ingest_line() {
        let line = r#"{"error":{"name":"TypeError","message":"x is undefined"},"context":{"statusCode":500,"url":"/a","method":"GET"}}"#;
        let parsed = parse_ingest_line(line).unwrap();
        assert_eq!(parsed.error.name.as_deref(), Some("TypeError"));
        assert_eq!(parsed.context.status_code, Some(500));
    }

    #[test]
    fn test_parse_ingest_line_without_context() {
        let parsed = parse_ingest_line(r#"{"error":{"message":"boom"}}"#).unwrap();
        assert_eq!(parsed.error.message, "boom");
        assert_eq!(parsed.context, ErrorContext::default());
    }

    #[test]
    fn test_parse_ingest_line_rejects_garbage() {
        assert!(parse_ingest_line("not json").is_err());
    }

    #[tokio::test]
    async fn test_error_watch_registers_default_checks() {
        let watch = ErrorWatch::new(&Config::default()).unwrap();
        assert_eq!(
            watch.monitor.check_names(),
            vec!["error_rate", "memory", "notifications"]
        );
    }

    #[tokio::test]
    async fn test_error_watch_registers_detailed_checks() {
        let mut config = Config::default();
        config.health.detailed = true;
        config.health.urls = vec!["http://localhost:3000/api/health".to_string()];

        let watch = ErrorWatch::new(&config).unwrap();
        let names = watch.monitor.check_names();
        assert!(names.contains(&"runtime".to_string()));
        assert!(names.contains(&"http:http://localhost:3000/api/health".to_string()));
    }
}
