//! Configuration management for CostWatch
//!
//! Settings are resolved once at startup, lowest precedence first: built-in
//! defaults, environment variables, an optional JSON/YAML file, then CLI
//! overrides. Environment and file values go through the same merge table
//! ([`Config::apply_option`]), which rejects option names it does not know.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{
    AlertLevels, AlertLevelsUpdate, ResourceFilter, Sensitivity, ServiceSelection,
};

/// Environment variable for every recognized option, in merge order
pub const ENV_OPTIONS: &[(&str, &str)] = &[
    ("AWS_ACCESS_KEY_ID", "aws_access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "aws_secret_access_key"),
    ("AWS_DEFAULT_REGION", "aws_region"),
    ("SLACK_BOT_TOKEN", "slack_bot_token"),
    ("SLACK_CHANNEL", "slack_channel"),
    ("SLACK_API_URL", "slack_api_url"),
    ("COST_THRESHOLD", "cost_threshold"),
    ("MONITORING_PERIOD_DAYS", "monitoring_period_days"),
    ("CURRENCY", "currency"),
    ("PROJECT_NAME", "project_name"),
    ("NOTIFICATION_FREQUENCY", "notification_frequency"),
    ("ENABLED_SERVICES", "enabled_services"),
    ("DISABLED_SERVICES", "disabled_services"),
    ("SERVICE_THRESHOLDS", "service_thresholds"),
    ("RESOURCE_ARNS", "resource_arns"),
    ("EXCLUDED_ARNS", "excluded_arns"),
    ("RESOURCE_THRESHOLDS", "resource_thresholds"),
    ("TAG_FILTERS", "tag_filters"),
    ("ENABLE_ANOMALY_DETECTION", "enable_anomaly_detection"),
    ("ANOMALY_SENSITIVITY", "anomaly_sensitivity"),
    ("ENABLE_COST_FORECASTING", "enable_cost_forecasting"),
    ("FORECAST_DAYS", "forecast_days"),
    ("CHECK_INTERVAL_HOURS", "check_interval_hours"),
    ("ENABLE_WEEKEND_MONITORING", "enable_weekend_monitoring"),
    ("ALERT_LEVELS", "alert_levels"),
    ("ENABLE_DETAILED_BREAKDOWN", "enable_detailed_breakdown"),
    ("MAX_SERVICES_IN_ALERT", "max_services_in_alert"),
];

/// Main configuration struct
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Billing API credentials
    pub aws: AwsConfig,

    /// Messaging API settings
    pub slack: SlackConfig,

    /// Global threshold and reporting window
    pub monitoring: MonitoringConfig,

    /// Which services are monitored and their own thresholds
    pub services: ServicesConfig,

    /// Which resources are monitored and their own thresholds
    pub resources: ResourcesConfig,

    /// Cost allocation tag filters (tag key -> accepted values)
    pub tag_filters: BTreeMap<String, Vec<String>>,

    /// Spike detection
    pub anomaly: AnomalyConfig,

    /// Spend forecasting
    pub forecast: ForecastConfig,

    /// Daemon scheduling
    pub schedule: ScheduleConfig,

    /// Alert tiers and message layout
    pub alerts: AlertConfig,
}

/// AWS credentials
#[derive(Clone)]
pub struct AwsConfig {
    /// `AWS_ACCESS_KEY_ID`
    pub access_key_id: Option<String>,
    /// `AWS_SECRET_ACCESS_KEY`
    pub secret_access_key: Option<String>,
    /// Region the client is built for
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            region: "us-east-1".to_string(),
        }
    }
}

impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<redacted>"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .finish()
    }
}

/// Slack settings
#[derive(Clone)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`)
    pub bot_token: Option<String>,
    /// Channel messages are posted to
    pub channel: String,
    /// Base URL of the Web API
    pub api_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel: "#alerts".to_string(),
            api_url: "https://slack.com/api".to_string(),
        }
    }
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("channel", &self.channel)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// How often scheduled reports go out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    /// Checks at 09:00 and 18:00, summary on Mondays
    #[default]
    Daily,
    /// Check and summary on Monday mornings
    Weekly,
    /// Check and summary on the 1st of the month
    Monthly,
}

impl FromStr for NotificationFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!(
                "unknown notification frequency '{other}' (expected daily, weekly or monthly)"
            )),
        }
    }
}

/// Global threshold and reporting window
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringConfig {
    /// Month-to-date spend that counts as 100%
    pub cost_threshold: f64,
    /// Days of daily spend shown in reports
    pub monitoring_period_days: u32,
    /// Currency label used in messages
    pub currency: String,
    /// Project name used in messages
    pub project_name: String,
    /// Scheduled report cadence
    pub notification_frequency: NotificationFrequency,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cost_threshold: 100.0,
            monitoring_period_days: 7,
            currency: "USD".to_string(),
            project_name: "AWS Project".to_string(),
            notification_frequency: NotificationFrequency::Daily,
        }
    }
}

/// Service selection and per-service thresholds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServicesConfig {
    /// Enabled and disabled services
    pub selection: ServiceSelection,
    /// Service name -> threshold
    pub thresholds: BTreeMap<String, f64>,
}

/// Resource selection and per-resource thresholds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcesConfig {
    /// Included and excluded resource substrings
    pub filter: ResourceFilter,
    /// Resource id substring -> threshold
    pub thresholds: BTreeMap<String, f64>,
}

/// Spike detection settings
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyConfig {
    /// Run spike detection on each check
    pub enabled: bool,
    /// Spike multiplier preset
    pub sensitivity: Sensitivity,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: Sensitivity::Medium,
        }
    }
}

/// Forecast settings
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    /// Fetch a forecast on each check
    pub enabled: bool,
    /// Forecast horizon
    pub days: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            days: 30,
        }
    }
}

/// Daemon scheduling settings
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// Hours between threshold checks
    pub check_interval_hours: u32,
    /// Whether checks also run on Saturday and Sunday
    pub weekend_monitoring: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: 6,
            weekend_monitoring: true,
        }
    }
}

/// Alert tiers and message layout
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    /// Percentage cutoffs
    pub levels: AlertLevels,
    /// Include the per-service and per-resource lists
    pub detailed_breakdown: bool,
    /// Rows shown in each list
    pub max_services: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            levels: AlertLevels::default(),
            detailed_breakdown: true,
            max_services: 10,
        }
    }
}

/// CLI overrides, applied last. JSON-valued flags are kept raw and
/// validated when applied.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--services`
    pub enabled_services: Option<Vec<String>>,
    /// `--exclude-services`
    pub disabled_services: Option<Vec<String>>,
    /// `--threshold`
    pub cost_threshold: Option<f64>,
    /// `--service-thresholds`, raw JSON
    pub service_thresholds: Option<String>,
    /// `--resource-arns`
    pub resource_arns: Option<Vec<String>>,
    /// `--exclude-arns`
    pub excluded_arns: Option<Vec<String>>,
    /// `--tag-filters`, raw JSON
    pub tag_filters: Option<String>,
    /// `--anomaly-detection`
    pub anomaly_detection: Option<bool>,
    /// `--anomaly-sensitivity`
    pub anomaly_sensitivity: Option<Sensitivity>,
    /// `--cost-forecasting`
    pub cost_forecasting: Option<bool>,
    /// `--forecast-days`
    pub forecast_days: Option<u32>,
    /// `--check-interval`
    pub check_interval_hours: Option<u32>,
    /// `--weekend-monitoring`
    pub weekend_monitoring: Option<bool>,
    /// `--alert-levels`, raw JSON
    pub alert_levels: Option<String>,
    /// `--detailed-breakdown`
    pub detailed_breakdown: Option<bool>,
    /// `--max-services`
    pub max_services: Option<usize>,
}

impl Config {
    /// Resolve configuration from the process environment, an optional file
    /// and CLI overrides, then validate it.
    pub fn resolve(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(file, overrides, |name| std::env::var(name).ok())
    }

    /// Same as [`Config::resolve`] with an injectable environment lookup
    pub fn resolve_with<F>(
        file: Option<&Path>,
        overrides: &ConfigOverrides,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_env(env)?;
        if let Some(path) = file {
            config.apply_file(path)?;
        }
        config.apply_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge every recognized environment variable
    pub fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for &(var, key) in ENV_OPTIONS {
            if let Some(raw) = env(var) {
                self.apply_option(key, &Value::String(raw))
                    .map_err(|e| Error::config(format!("{var}: {}", detail(&e))))?;
            }
        }
        Ok(())
    }

    /// Merge a JSON or YAML file. A missing file only logs a warning.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using environment variables");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let document: Value = match extension.as_deref() {
            Some("json") => serde_json::from_str(&contents).map_err(|e| {
                Error::config(format!("{}: invalid JSON: {e}", path.display()))
            })?,
            Some("yml" | "yaml") => serde_yaml::from_str(&contents).map_err(|e| {
                Error::config(format!("{}: invalid YAML: {e}", path.display()))
            })?,
            _ => {
                return Err(Error::config(format!(
                    "{}: config file must be JSON or YAML format",
                    path.display()
                )))
            }
        };

        let Value::Object(options) = document else {
            return Err(Error::config(format!(
                "{}: top level must be a mapping of option names",
                path.display()
            )));
        };

        for (key, value) in &options {
            if value.is_null() {
                continue;
            }
            self.apply_option(&key.to_ascii_lowercase(), value)
                .map_err(|e| Error::config(format!("{}: {}", path.display(), detail(&e))))?;
        }

        info!(path = %path.display(), options = options.len(), "Loaded config file");
        Ok(())
    }

    /// Set one option by name. Values may be typed (from a file) or strings
    /// (from the environment).
    pub fn apply_option(&mut self, key: &str, value: &Value) -> Result<()> {
        match key {
            "aws_access_key_id" => self.aws.access_key_id = non_empty(as_string(key, value)?),
            "aws_secret_access_key" => {
                self.aws.secret_access_key = non_empty(as_string(key, value)?);
            }
            "aws_region" => self.aws.region = as_string(key, value)?,
            "slack_bot_token" => self.slack.bot_token = non_empty(as_string(key, value)?),
            "slack_channel" => self.slack.channel = as_string(key, value)?,
            "slack_api_url" => {
                self.slack.api_url = as_string(key, value)?.trim_end_matches('/').to_string();
            }
            "cost_threshold" => self.monitoring.cost_threshold = as_f64(key, value)?,
            "monitoring_period_days" => {
                self.monitoring.monitoring_period_days = as_u32(key, value)?;
            }
            "currency" => self.monitoring.currency = as_string(key, value)?,
            "project_name" => self.monitoring.project_name = as_string(key, value)?,
            "notification_frequency" => {
                self.monitoring.notification_frequency = as_string(key, value)?
                    .parse()
                    .map_err(Error::validation)?;
            }
            "enabled_services" => self.services.selection.enabled = as_list(key, value)?,
            "disabled_services" => self.services.selection.disabled = as_list(key, value)?,
            "service_thresholds" => self.services.thresholds = as_amount_map(key, value)?,
            "resource_arns" => self.resources.filter.include = as_list(key, value)?,
            "excluded_arns" => self.resources.filter.exclude = as_list(key, value)?,
            "resource_thresholds" => self.resources.thresholds = as_amount_map(key, value)?,
            "tag_filters" => self.tag_filters = as_tag_map(key, value)?,
            "enable_anomaly_detection" => self.anomaly.enabled = as_bool(key, value)?,
            "anomaly_sensitivity" => {
                self.anomaly.sensitivity = Sensitivity::from_name(&as_string(key, value)?);
            }
            "enable_cost_forecasting" => self.forecast.enabled = as_bool(key, value)?,
            "forecast_days" => self.forecast.days = as_u32(key, value)?,
            "check_interval_hours" => self.schedule.check_interval_hours = as_u32(key, value)?,
            "enable_weekend_monitoring" => self.schedule.weekend_monitoring = as_bool(key, value)?,
            "alert_levels" => {
                let update: AlertLevelsUpdate = as_object(key, value)?;
                self.alerts.levels.merge(&update);
            }
            "enable_detailed_breakdown" => self.alerts.detailed_breakdown = as_bool(key, value)?,
            "max_services_in_alert" => self.alerts.max_services = as_u32(key, value)? as usize,
            unknown => {
                return Err(Error::validation(format!(
                    "unknown configuration option '{unknown}'"
                )))
            }
        }
        Ok(())
    }

    /// Apply CLI overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(services) = &overrides.enabled_services {
            self.services.selection.enabled = clean_list(services);
            info!(services = ?self.services.selection.enabled, "Overriding enabled services");
        }
        if let Some(services) = &overrides.disabled_services {
            self.services.selection.disabled = clean_list(services);
            info!(services = ?self.services.selection.disabled, "Overriding disabled services");
        }
        if let Some(threshold) = overrides.cost_threshold {
            self.monitoring.cost_threshold = threshold;
            info!(threshold, "Overriding cost threshold");
        }
        if let Some(raw) = &overrides.service_thresholds {
            self.services.thresholds = as_amount_map(
                "--service-thresholds",
                &parse_json_flag("--service-thresholds", raw)?,
            )?;
            info!(thresholds = ?self.services.thresholds, "Overriding service thresholds");
        }
        if let Some(arns) = &overrides.resource_arns {
            self.resources.filter.include = clean_list(arns);
            info!(arns = ?self.resources.filter.include, "Overriding resource ARNs");
        }
        if let Some(arns) = &overrides.excluded_arns {
            self.resources.filter.exclude = clean_list(arns);
            info!(arns = ?self.resources.filter.exclude, "Overriding excluded ARNs");
        }
        if let Some(raw) = &overrides.tag_filters {
            self.tag_filters = as_tag_map("--tag-filters", &parse_json_flag("--tag-filters", raw)?)?;
            info!(tags = ?self.tag_filters, "Overriding tag filters");
        }
        if let Some(enabled) = overrides.anomaly_detection {
            self.anomaly.enabled = enabled;
            info!(enabled, "Overriding anomaly detection");
        }
        if let Some(sensitivity) = overrides.anomaly_sensitivity {
            self.anomaly.sensitivity = sensitivity;
            info!(%sensitivity, "Overriding anomaly sensitivity");
        }
        if let Some(enabled) = overrides.cost_forecasting {
            self.forecast.enabled = enabled;
            info!(enabled, "Overriding cost forecasting");
        }
        if let Some(days) = overrides.forecast_days {
            self.forecast.days = days;
            info!(days, "Overriding forecast days");
        }
        if let Some(hours) = overrides.check_interval_hours {
            self.schedule.check_interval_hours = hours;
            info!(hours, "Overriding check interval");
        }
        if let Some(enabled) = overrides.weekend_monitoring {
            self.schedule.weekend_monitoring = enabled;
            info!(enabled, "Overriding weekend monitoring");
        }
        if let Some(raw) = &overrides.alert_levels {
            let update: AlertLevelsUpdate =
                as_object("--alert-levels", &parse_json_flag("--alert-levels", raw)?)?;
            self.alerts.levels.merge(&update);
            info!(levels = ?self.alerts.levels, "Overriding alert levels");
        }
        if let Some(enabled) = overrides.detailed_breakdown {
            self.alerts.detailed_breakdown = enabled;
            info!(enabled, "Overriding detailed breakdown");
        }
        if let Some(max) = overrides.max_services {
            self.alerts.max_services = max;
            info!(max, "Overriding max services in alert");
        }
        Ok(())
    }

    /// Check required credentials and value ranges
    pub fn validate(&self) -> Result<()> {
        let required = [
            (self.slack.bot_token.is_none(), "SLACK_BOT_TOKEN"),
            (self.aws.access_key_id.is_none(), "AWS_ACCESS_KEY_ID"),
            (self.aws.secret_access_key.is_none(), "AWS_SECRET_ACCESS_KEY"),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(absent, _)| *absent)
            .map(|(_, name)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "Missing required configuration parameters: {}",
                missing.join(", ")
            )));
        }

        if !self.alerts.levels.is_valid() {
            return Err(Error::config(format!(
                "alert levels must satisfy info < warning < critical (got {} / {} / {})",
                self.alerts.levels.info, self.alerts.levels.warning, self.alerts.levels.critical
            )));
        }

        let counts = [
            ("monitoring_period_days", self.monitoring.monitoring_period_days),
            ("forecast_days", self.forecast.days),
            ("check_interval_hours", self.schedule.check_interval_hours),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(Error::config(format!("{name} must be at least 1")));
            }
        }
        if self.alerts.max_services == 0 {
            return Err(Error::config("max_services_in_alert must be at least 1"));
        }

        if !self.monitoring.cost_threshold.is_finite() {
            return Err(Error::config("cost_threshold must be a finite number"));
        }
        if self.monitoring.cost_threshold <= 0.0 {
            warn!(
                threshold = self.monitoring.cost_threshold,
                "Cost threshold is not positive, every check will classify as critical"
            );
        }
        for (name, threshold) in self
            .services
            .thresholds
            .iter()
            .chain(self.resources.thresholds.iter())
        {
            if !threshold.is_finite() {
                return Err(Error::config(format!("threshold for '{name}' must be finite")));
            }
        }

        Ok(())
    }

    /// Log the resolved configuration without secrets
    pub fn log_summary(&self) {
        let enabled = if self.services.selection.all_enabled() {
            "all".to_string()
        } else {
            self.services.selection.enabled.len().to_string()
        };
        info!("Configuration summary:");
        info!("  Project: {}", self.monitoring.project_name);
        info!("  Region: {}", self.aws.region);
        info!("  Slack channel: {}", self.slack.channel);
        info!(
            "  Cost threshold: {} {:.2}",
            self.monitoring.currency, self.monitoring.cost_threshold
        );
        info!("  Enabled services: {enabled}");
        info!("  Disabled services: {}", self.services.selection.disabled.len());
        info!("  Service thresholds: {} configured", self.services.thresholds.len());
        info!(
            "  Resource ARNs: {} included, {} excluded",
            self.resources.filter.include.len(),
            self.resources.filter.exclude.len()
        );
        info!("  Tag filters: {} configured", self.tag_filters.len());
        info!(
            "  Anomaly detection: {} ({})",
            self.anomaly.enabled, self.anomaly.sensitivity
        );
        info!(
            "  Cost forecasting: {} ({} days)",
            self.forecast.enabled, self.forecast.days
        );
        info!("  Check interval: {} hours", self.schedule.check_interval_hours);
        info!("  Weekend monitoring: {}", self.schedule.weekend_monitoring);
        info!("  Detailed breakdown: {}", self.alerts.detailed_breakdown);
        info!("  Max services in alert: {}", self.alerts.max_services);
    }
}

fn detail(err: &Error) -> String {
    match err {
        Error::Validation(msg) | Error::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn parse_json_flag(flag: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| Error::validation(format!("{flag}: invalid JSON: {e}")))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn as_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::validation(format!("{key}: expected a string"))),
    }
}

fn as_f64(key: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::validation(format!("{key}: number out of range"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::validation(format!("{key}: expected a number, got '{s}'"))),
        _ => Err(Error::validation(format!("{key}: expected a number"))),
    }
}

fn as_u32(key: &str, value: &Value) -> Result<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| Error::validation(format!("{key}: expected a non-negative integer"))),
        Value::String(s) => s.trim().parse().map_err(|_| {
            Error::validation(format!("{key}: expected a non-negative integer, got '{s}'"))
        }),
        _ => Err(Error::validation(format!("{key}: expected an integer"))),
    }
}

fn as_bool(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::validation(format!("{key}: expected true or false, got '{s}'"))),
        },
        _ => Err(Error::validation(format!("{key}: expected true or false"))),
    }
}

/// A list is either a sequence or a comma-separated string
fn as_list(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| as_string(key, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(clean_list(&items))
        }
        _ => Err(Error::validation(format!("{key}: expected a list"))),
    }
}

/// Structured values are either inline or a JSON document in a string
fn structured(key: &str, value: &Value) -> Result<Value> {
    match value {
        Value::String(s) if s.trim().is_empty() => Ok(Value::Object(Default::default())),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| Error::validation(format!("{key}: invalid JSON: {e}"))),
        other => Ok(other.clone()),
    }
}

fn as_object<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Result<T> {
    serde_json::from_value(structured(key, value)?)
        .map_err(|e| Error::validation(format!("{key}: {e}")))
}

fn as_amount_map(key: &str, value: &Value) -> Result<BTreeMap<String, f64>> {
    as_object(key, value)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn as_tag_map(key: &str, value: &Value) -> Result<BTreeMap<String, Vec<String>>> {
    let raw: BTreeMap<String, OneOrMany> = as_object(key, value)?;
    Ok(raw
        .into_iter()
        .map(|(tag, values)| match values {
            OneOrMany::One(v) => (tag, vec![v]),
            OneOrMany::Many(vs) => (tag, vs),
        })
        .collect())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.aws.access_key_id = Some("AKIATEST".to_string());
    config.aws.secret_access_key = Some("secret".to_string());
    config.slack.bot_token = Some("xoxb-test".to_string());
    config.monitoring.project_name = "Test Project".to_string();
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn credentials() -> Vec<(&'static str, &'static str)> {
        vec![
            ("AWS_ACCESS_KEY_ID", "AKIATEST"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("SLACK_BOT_TOKEN", "xoxb-test"),
        ]
    }

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_with_credentials() {
        let config =
            Config::resolve_with(None, &ConfigOverrides::default(), env_of(&credentials()))
                .unwrap();
        assert_eq!(config.monitoring.cost_threshold, 100.0);
        assert_eq!(config.monitoring.monitoring_period_days, 7);
        assert_eq!(config.slack.channel, "#alerts");
        assert_eq!(config.aws.region, "us-east-1");
        assert!(config.services.selection.all_enabled());
        assert_eq!(config.alerts.levels, AlertLevels::default());
        assert_eq!(config.schedule.check_interval_hours, 6);
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        let err = Config::resolve_with(
            None,
            &ConfigOverrides::default(),
            env_of(&[("AWS_ACCESS_KEY_ID", "AKIATEST")]),
        )
        .unwrap_err();
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("SLACK_BOT_TOKEN"));
        assert!(msg.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(!msg.contains("AWS_ACCESS_KEY_ID"));
    }

    #[test]
    fn test_env_values_parsed() {
        let mut pairs = credentials();
        pairs.extend([
            ("COST_THRESHOLD", "250.5"),
            ("ENABLED_SERVICES", "Amazon EC2, Amazon RDS"),
            ("SERVICE_THRESHOLDS", r#"{"Amazon EC2": 500.0}"#),
            ("TAG_FILTERS", r#"{"Environment": "production", "Team": ["a", "b"]}"#),
            ("ENABLE_WEEKEND_MONITORING", "false"),
            ("ANOMALY_SENSITIVITY", "high"),
        ]);
        let config =
            Config::resolve_with(None, &ConfigOverrides::default(), env_of(&pairs)).unwrap();

        assert_eq!(config.monitoring.cost_threshold, 250.5);
        assert_eq!(
            config.services.selection.enabled,
            vec!["Amazon EC2".to_string(), "Amazon RDS".to_string()]
        );
        assert_eq!(config.services.thresholds.get("Amazon EC2").copied(), Some(500.0));
        assert_eq!(config.tag_filters["Environment"], vec!["production".to_string()]);
        assert_eq!(config.tag_filters["Team"].len(), 2);
        assert!(!config.schedule.weekend_monitoring);
        assert_eq!(config.anomaly.sensitivity, Sensitivity::High);
    }

    #[test]
    fn test_bad_env_number_names_variable() {
        let mut pairs = credentials();
        pairs.push(("COST_THRESHOLD", "lots"));
        let err = Config::resolve_with(None, &ConfigOverrides::default(), env_of(&pairs))
            .unwrap_err();
        assert!(err.to_string().contains("COST_THRESHOLD"));
    }

    #[test]
    fn test_file_overrides_env() {
        let file = write_file(
            ".yaml",
            "cost_threshold: 300\nproject_name: Billing\nservice_thresholds:\n  Amazon EC2: 120\n",
        );
        let mut pairs = credentials();
        pairs.push(("COST_THRESHOLD", "50"));
        pairs.push(("CURRENCY", "EUR"));

        let config =
            Config::resolve_with(Some(file.path()), &ConfigOverrides::default(), env_of(&pairs))
                .unwrap();
        assert_eq!(config.monitoring.cost_threshold, 300.0);
        assert_eq!(config.monitoring.project_name, "Billing");
        assert_eq!(config.monitoring.currency, "EUR");
        // map keys keep their case
        assert_eq!(config.services.thresholds.get("Amazon EC2").copied(), Some(120.0));
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        let file = write_file(".json", r#"{"cost_threshold": 10, "cost_threshhold": 20}"#);
        let err = Config::resolve_with(
            Some(file.path()),
            &ConfigOverrides::default(),
            env_of(&credentials()),
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("cost_threshhold"));
    }

    #[test]
    fn test_missing_file_falls_back_to_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let config =
            Config::resolve_with(Some(path.as_path()), &ConfigOverrides::default(), env_of(&credentials()))
                .unwrap();
        assert_eq!(config.monitoring.cost_threshold, 100.0);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_file(".toml", "cost_threshold = 1");
        let err = Config::resolve_with(
            Some(file.path()),
            &ConfigOverrides::default(),
            env_of(&credentials()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("JSON or YAML"));
    }

    #[test]
    fn test_file_then_cli_overrides() {
        let file = write_file(
            ".json",
            r#"{
                "cost_threshold": 300,
                "forecast_days": 14,
                "max_services_in_alert": 5,
                "enable_detailed_breakdown": true,
                "excluded_arns": ["i-dev"]
            }"#,
        );
        let mut pairs = credentials();
        pairs.push(("SLACK_CHANNEL", "#finops"));
        let overrides = ConfigOverrides {
            cost_threshold: Some(1000.0),
            max_services: Some(3),
            weekend_monitoring: Some(false),
            ..Default::default()
        };

        let config = Config::resolve_with(Some(file.path()), &overrides, env_of(&pairs)).unwrap();

        // overridden by the CLI
        assert_eq!(config.monitoring.cost_threshold, 1000.0);
        assert_eq!(config.alerts.max_services, 3);
        assert!(!config.schedule.weekend_monitoring);
        // from the file
        assert_eq!(config.forecast.days, 14);
        assert_eq!(config.resources.filter.exclude, vec!["i-dev".to_string()]);
        assert!(config.alerts.detailed_breakdown);
        // from the environment
        assert_eq!(config.slack.channel, "#finops");
        // default
        assert_eq!(config.schedule.check_interval_hours, 6);
    }

    #[test]
    fn test_cli_json_flag_validated() {
        let overrides = ConfigOverrides {
            service_thresholds: Some("{not json".to_string()),
            ..Default::default()
        };
        let err = Config::resolve_with(None, &overrides, env_of(&credentials())).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("--service-thresholds"));
    }

    #[test]
    fn test_cli_alert_levels_partial_update() {
        let overrides = ConfigOverrides {
            alert_levels: Some(r#"{"critical": 120}"#.to_string()),
            ..Default::default()
        };
        let config = Config::resolve_with(None, &overrides, env_of(&credentials())).unwrap();
        assert_eq!(config.alerts.levels.critical, 120.0);
        assert_eq!(config.alerts.levels.warning, 80.0);
    }

    #[test]
    fn test_alert_levels_must_ascend() {
        let overrides = ConfigOverrides {
            alert_levels: Some(r#"{"warning": 120}"#.to_string()),
            ..Default::default()
        };
        let err = Config::resolve_with(None, &overrides, env_of(&credentials())).unwrap_err();
        assert!(err.to_string().contains("info < warning < critical"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("xoxb-test"));
        assert!(!rendered.contains("AKIATEST"));
    }
}
