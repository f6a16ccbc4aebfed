//! Alert data models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::cost::{CostSeries, Forecast, ServiceBreakdown};

/// Alert tier derived from percentage of threshold
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Below the info cutoff
    #[default]
    Normal,
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Critical
    Critical,
}

impl AlertLevel {
    /// Upper-case label used in messages
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    /// Slack emoji shortcode for the tier
    pub fn emoji(self) -> &'static str {
        match self {
            Self::Normal => ":white_check_mark:",
            Self::Info => ":information_source:",
            Self::Warning => ":warning:",
            Self::Critical => ":rotating_light:",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Percent-of-threshold cutoffs for each tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertLevels {
    /// Cutoff for [`AlertLevel::Info`]
    pub info: f64,
    /// Cutoff for [`AlertLevel::Warning`]
    pub warning: f64,
    /// Cutoff for [`AlertLevel::Critical`]
    pub critical: f64,
}

impl Default for AlertLevels {
    fn default() -> Self {
        Self {
            info: 50.0,
            warning: 80.0,
            critical: 100.0,
        }
    }
}

impl AlertLevels {
    /// Cutoffs must be finite and strictly ascending
    pub fn is_valid(&self) -> bool {
        [self.info, self.warning, self.critical]
            .iter()
            .all(|v| v.is_finite())
            && self.info < self.warning
            && self.warning < self.critical
    }

    /// Apply a partial update
    pub fn merge(&mut self, update: &AlertLevelsUpdate) {
        if let Some(info) = update.info {
            self.info = info;
        }
        if let Some(warning) = update.warning {
            self.warning = warning;
        }
        if let Some(critical) = update.critical {
            self.critical = critical;
        }
    }
}

/// Partial alert-level override as supplied by a config file or the CLI
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertLevelsUpdate {
    /// New info cutoff
    pub info: Option<f64>,
    /// New warning cutoff
    pub warning: Option<f64>,
    /// New critical cutoff
    pub critical: Option<f64>,
}

/// Named spike-detection tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Only large jumps
    Low,
    /// Default
    #[default]
    Medium,
    /// Small jumps too
    High,
}

impl Sensitivity {
    /// Ratio a value must exceed, relative to its baseline, to count as a spike
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Low => 2.0,
            Self::Medium => 1.5,
            Self::High => 1.2,
        }
    }

    /// Parse a tier name; anything unrecognized is medium
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// Lowercase tier name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown sensitivity '{other}'")),
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of detected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Last 7-day mean jumped against the 7 days before
    WeeklySpike,
    /// One day jumped against the day before
    DailySpike,
}

/// Anomaly severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    /// Noticeable
    Medium,
    /// Needs attention
    High,
}

impl fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// A spend anomaly found in one evaluation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Which rule fired
    pub kind: AnomalyKind,
    /// Human-readable explanation with the observed numbers
    pub description: String,
    /// How loud the alert should be
    pub severity: AnomalySeverity,
}

/// A service or resource checked against its own threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStatus {
    /// Service name or resource id
    pub name: String,
    /// Spend in the period
    pub cost: f64,
    /// Threshold applied to this item
    pub threshold: f64,
    /// Percent of threshold, absent when the threshold is not positive
    pub percentage: Option<f64>,
    /// Resulting tier
    pub level: AlertLevel,
}

impl ItemStatus {
    /// Whether spend reached the item's threshold
    pub fn exceeded(&self) -> bool {
        self.level == AlertLevel::Critical
    }
}

/// Everything gathered from the billing API in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSnapshot {
    /// When the data was gathered
    pub taken_at: DateTime<Local>,
    /// Month-to-date spend
    pub current_cost: f64,
    /// Currency of every amount
    pub currency: String,
    /// Month-to-date spend per enabled service
    pub services: ServiceBreakdown,
    /// Spend per monitored resource
    pub resources: ServiceBreakdown,
    /// Daily spend over the monitoring period
    pub daily: CostSeries,
    /// Longer daily history used for spike detection
    pub history: CostSeries,
    /// Forecast, when enabled and available
    pub forecast: Option<Forecast>,
}

/// Output of evaluating one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Global tier
    pub level: AlertLevel,
    /// Month-to-date spend
    pub current_cost: f64,
    /// Global threshold
    pub threshold: f64,
    /// Percent of the global threshold, absent when the threshold is not positive
    pub percentage: Option<f64>,
    /// Services with their own threshold
    pub services: Vec<ItemStatus>,
    /// Resources with their own threshold
    pub resources: Vec<ItemStatus>,
    /// Spikes found in the history
    pub anomalies: Vec<Anomaly>,
    /// Whether a notification should go out
    pub alert_triggered: bool,
}

impl Evaluation {
    /// Services and resources over their own thresholds
    pub fn exceeded_items(&self) -> impl Iterator<Item = &ItemStatus> {
        self.services
            .iter()
            .chain(self.resources.iter())
            .filter(|s| s.exceeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(AlertLevel::Normal < AlertLevel::Info);
        assert!(AlertLevel::Info < AlertLevel::Warning);
        assert!(AlertLevel::Warning < AlertLevel::Critical);
    }

    #[test]
    fn test_sensitivity_multipliers() {
        assert_eq!(Sensitivity::from_name("low").multiplier(), 2.0);
        assert_eq!(Sensitivity::from_name("HIGH").multiplier(), 1.2);
        assert_eq!(Sensitivity::from_name("medium").multiplier(), 1.5);
        assert_eq!(Sensitivity::from_name("extreme").multiplier(), 1.5);
    }

    #[test]
    fn test_alert_levels_validation() {
        assert!(AlertLevels::default().is_valid());
        let flat = AlertLevels {
            info: 80.0,
            warning: 80.0,
            critical: 100.0,
        };
        assert!(!flat.is_valid());
    }

    #[test]
    fn test_alert_levels_partial_merge() {
        let mut levels = AlertLevels::default();
        let update: AlertLevelsUpdate = serde_json::from_str(r#"{"warning": 75}"#).unwrap();
        levels.merge(&update);
        assert_eq!(levels.warning, 75.0);
        assert_eq!(levels.info, 50.0);
        assert_eq!(levels.critical, 100.0);
    }

    #[test]
    fn test_alert_levels_update_rejects_unknown_tier() {
        let parsed = serde_json::from_str::<AlertLevelsUpdate>(r#"{"emergency": 150}"#);
        assert!(parsed.is_err());
    }
}
