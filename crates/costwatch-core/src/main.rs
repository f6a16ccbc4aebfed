//! CostWatch CLI
//!
//! One-shot checks, summaries and connection tests, or a long-running
//! monitoring daemon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, CommandFactory, Parser};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use costwatch::config::ConfigOverrides;
use costwatch::models::Sensitivity;
use costwatch::{Config, CostMonitorBot};

/// CostWatch - AWS cost monitoring with Slack alerts
#[derive(Parser)]
#[command(name = "costwatch")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:
  costwatch --test
  costwatch --check-once --threshold 250
  costwatch --daemon --services 'Amazon EC2,Amazon S3' --exclude-services Tax
  costwatch --check-once --service-thresholds '{\"Amazon EC2\": 100}'
  costwatch --daemon --alert-levels '{\"warning\": 75}' --anomaly-sensitivity high")]
struct Cli {
    /// Test AWS and Slack connections
    #[arg(long, help_heading = "Actions")]
    test: bool,

    /// Run a single cost check and exit
    #[arg(long, help_heading = "Actions")]
    check_once: bool,

    /// Send a cost summary report and exit
    #[arg(long, help_heading = "Actions")]
    summary: bool,

    /// Run continuously on the configured schedule
    #[arg(long, help_heading = "Actions")]
    daemon: bool,

    /// JSON or YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "DEBUG_MODE", value_parser = BoolishValueParser::new())]
    debug: bool,

    /// Log file path
    #[arg(long, env = "LOG_FILE", default_value = "cost_monitor.log")]
    log_file: PathBuf,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(clap::Args)]
#[command(next_help_heading = "Overrides")]
struct OverrideArgs {
    /// Comma-separated services to monitor ("all" for every service)
    #[arg(long, value_delimiter = ',')]
    services: Option<Vec<String>>,

    /// Comma-separated services to exclude
    #[arg(long, value_delimiter = ',')]
    exclude_services: Option<Vec<String>>,

    /// Global cost threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Per-service thresholds as JSON, e.g. '{"Amazon EC2": 100}'
    #[arg(long)]
    service_thresholds: Option<String>,

    /// Comma-separated resource ARN substrings to monitor
    #[arg(long, value_delimiter = ',')]
    resource_arns: Option<Vec<String>>,

    /// Comma-separated resource ARN substrings to exclude
    #[arg(long, value_delimiter = ',')]
    exclude_arns: Option<Vec<String>>,

    /// Tag filters as JSON, e.g. '{"Environment": ["prod"]}'
    #[arg(long)]
    tag_filters: Option<String>,

    /// Enable or disable anomaly detection
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    anomaly_detection: Option<bool>,

    /// Anomaly sensitivity (low, medium, high)
    #[arg(long)]
    anomaly_sensitivity: Option<Sensitivity>,

    /// Enable or disable cost forecasting
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    cost_forecasting: Option<bool>,

    /// Forecast horizon in days
    #[arg(long)]
    forecast_days: Option<u32>,

    /// Hours between periodic threshold checks
    #[arg(long)]
    check_interval: Option<u32>,

    /// Enable or disable checks on weekends
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    weekend_monitoring: Option<bool>,

    /// Alert level percentages as JSON, e.g. '{"info": 50, "warning": 80, "critical": 100}'
    #[arg(long)]
    alert_levels: Option<String>,

    /// Enable or disable the per-service breakdown in alerts
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    detailed_breakdown: Option<bool>,

    /// Maximum services listed in an alert
    #[arg(long)]
    max_services: Option<usize>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            enabled_services: args.services,
            disabled_services: args.exclude_services,
            cost_threshold: args.threshold,
            service_thresholds: args.service_thresholds,
            resource_arns: args.resource_arns,
            excluded_arns: args.exclude_arns,
            tag_filters: args.tag_filters,
            anomaly_detection: args.anomaly_detection,
            anomaly_sensitivity: args.anomaly_sensitivity,
            cost_forecasting: args.cost_forecasting,
            forecast_days: args.forecast_days,
            check_interval_hours: args.check_interval,
            weekend_monitoring: args.weekend_monitoring,
            alert_levels: args.alert_levels,
            detailed_breakdown: args.detailed_breakdown,
            max_services: args.max_services,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Action {
    Test,
    CheckOnce,
    Summary,
    Daemon,
}

impl Cli {
    /// First requested action, in the order they are listed
    fn action(&self) -> Option<Action> {
        [
            (self.test, Action::Test),
            (self.check_once, Action::CheckOnce),
            (self.summary, Action::Summary),
            (self.daemon, Action::Daemon),
        ]
        .into_iter()
        .find_map(|(set, action)| set.then_some(action))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env must be loaded before clap reads env-backed flags
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let Some(action) = cli.action() else {
        let _ = Cli::command().print_help();
        eprintln!("\nNo action specified. Use --test, --check-once, --summary or --daemon.");
        return ExitCode::FAILURE;
    };

    let _guard = init_logging(cli.debug, &cli.log_file);

    match run(action, cli.config.as_deref(), cli.overrides.into()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// stderr plus an append-only log file; the guard flushes the file on drop
fn init_logging(debug: bool, log_file: &Path) -> Option<WorkerGuard> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_file.file_name() {
        Some(name) => {
            let dir = log_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

async fn run(action: Action, config_file: Option<&Path>, overrides: ConfigOverrides) -> anyhow::Result<bool> {
    let config = Config::resolve(config_file, &overrides).context("Error loading configuration")?;
    config.log_summary();

    let bot = CostMonitorBot::connect(config)
        .await
        .context("Failed to initialize clients")?;

    match action {
        Action::Test => run_test(&bot).await,
        Action::CheckOnce => run_check_once(&bot).await,
        Action::Summary => run_summary(&bot).await,
        Action::Daemon => run_daemon(&bot).await,
    }
}

async fn run_test(bot: &CostMonitorBot) -> anyhow::Result<bool> {
    info!("Testing connections...");
    let ok = bot.test_connections().await;
    if ok {
        println!("✅ All connection tests passed!");
    } else {
        println!("❌ Connection tests failed!");
    }
    Ok(ok)
}

async fn run_check_once(bot: &CostMonitorBot) -> anyhow::Result<bool> {
    info!("Running single cost check...");
    match bot.run_check().await {
        Ok(true) => {
            println!("✅ Cost check completed successfully!");
            Ok(true)
        }
        Ok(false) => {
            println!("❌ Cost check completed but the alert was not delivered!");
            Ok(false)
        }
        Err(e) => {
            bot.report_error(&e).await;
            Err(e).context("Cost check failed")
        }
    }
}

async fn run_summary(bot: &CostMonitorBot) -> anyhow::Result<bool> {
    info!("Sending cost summary...");
    let sent = bot.run_summary().await.context("Cost summary failed")?;
    if sent {
        println!("✅ Cost summary sent successfully!");
    } else {
        println!("❌ Failed to send cost summary!");
    }
    Ok(sent)
}

async fn run_daemon(bot: &CostMonitorBot) -> anyhow::Result<bool> {
    info!(
        project = %bot.config().monitoring.project_name,
        "Starting cost monitoring daemon (Ctrl+C to stop)"
    );
    bot.run_daemon(shutdown_signal()).await?;
    Ok(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_action_precedence() {
        let cli = Cli::parse_from(["costwatch", "--daemon", "--test"]);
        assert!(matches!(cli.action(), Some(Action::Test)));

        let cli = Cli::parse_from(["costwatch", "--threshold", "10"]);
        assert!(cli.action().is_none());
    }

    #[test]
    fn test_debug_mode_env_accepts_boolish_values() {
        std::env::set_var("DEBUG_MODE", "yes");
        let on = Cli::try_parse_from(["costwatch", "--test"]).map(|cli| cli.debug);
        std::env::set_var("DEBUG_MODE", "0");
        let off = Cli::try_parse_from(["costwatch", "--test"]).map(|cli| cli.debug);
        std::env::remove_var("DEBUG_MODE");

        assert!(on.unwrap());
        assert!(!off.unwrap());
        assert!(Cli::parse_from(["costwatch", "--test", "--debug"]).debug);
    }

    #[test]
    fn test_overrides_are_forwarded() {
        let cli = Cli::parse_from([
            "costwatch",
            "--check-once",
            "--services",
            "Amazon EC2,Amazon S3",
            "--anomaly-detection",
            "false",
            "--anomaly-sensitivity",
            "high",
            "--check-interval",
            "3",
        ]);
        let overrides: ConfigOverrides = cli.overrides.into();
        assert_eq!(
            overrides.enabled_services,
            Some(vec!["Amazon EC2".to_string(), "Amazon S3".to_string()])
        );
        assert_eq!(overrides.anomaly_detection, Some(false));
        assert_eq!(overrides.anomaly_sensitivity, Some(Sensitivity::High));
        assert_eq!(overrides.check_interval_hours, Some(3));
        assert_eq!(overrides.cost_threshold, None);
    }
}
