//! Threshold classification and spike detection
//!
//! Everything here is pure: no I/O, no clock, no logging side effects beyond
//! `debug!`. The same snapshot always yields the same [`Evaluation`].

use tracing::debug;

use crate::config::Config;
use crate::models::{
    AlertLevel, AlertLevels, Anomaly, AnomalyKind, AnomalySeverity, CostSnapshot, DailyCost,
    Evaluation, ItemStatus, Sensitivity,
};

/// Days in each window of the week-over-week comparison
pub const WEEK: usize = 7;

/// Fewer points than this and no spike detection runs at all
pub const MIN_POINTS: usize = WEEK;

/// Ratio above which a weekly spike is high severity
const HIGH_SEVERITY_RATIO: f64 = 2.0;

/// Percent of threshold, or `None` when the threshold is not positive
pub fn percentage_of(cost: f64, threshold: f64) -> Option<f64> {
    (threshold > 0.0).then(|| cost / threshold * 100.0)
}

/// Map spend against a threshold onto a tier.
///
/// Cutoffs are inclusive: a percentage equal to a cutoff lands in that
/// cutoff's tier. A non-positive threshold is always critical.
pub fn classify(cost: f64, threshold: f64, levels: &AlertLevels) -> AlertLevel {
    match percentage_of(cost, threshold) {
        None => AlertLevel::Critical,
        Some(pct) => classify_percentage(pct, levels),
    }
}

/// Tier for an already computed percentage
pub fn classify_percentage(percentage: f64, levels: &AlertLevels) -> AlertLevel {
    if percentage >= levels.critical {
        AlertLevel::Critical
    } else if percentage >= levels.warning {
        AlertLevel::Warning
    } else if percentage >= levels.info {
        AlertLevel::Info
    } else {
        AlertLevel::Normal
    }
}

fn mean(points: &[DailyCost]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.amount).sum::<f64>() / points.len() as f64
}

/// Compare the mean of the last 7 days with the mean of the 7 days before.
///
/// Needs 14 days of history; fires when `recent > previous * multiplier`
/// and `previous > 0`.
pub fn weekly_spike(points: &[DailyCost], multiplier: f64) -> Option<Anomaly> {
    if points.len() < 2 * WEEK {
        return None;
    }
    let split = points.len() - WEEK;
    let recent = mean(&points[split..]);
    let previous = mean(&points[split - WEEK..split]);

    if previous <= 0.0 || recent <= previous * multiplier {
        return None;
    }

    let severity = if recent > previous * HIGH_SEVERITY_RATIO {
        AnomalySeverity::High
    } else {
        AnomalySeverity::Medium
    };
    Some(Anomaly {
        kind: AnomalyKind::WeeklySpike,
        description: format!(
            "Recent 7-day average ({recent:.2}) is {:.1}% higher than previous week ({previous:.2})",
            (recent / previous - 1.0) * 100.0
        ),
        severity,
    })
}

/// Flag every day in the last 7 whose cost exceeds the previous day's by
/// more than the multiplier.
pub fn daily_spikes(points: &[DailyCost], multiplier: f64) -> Vec<Anomaly> {
    let start = points.len().saturating_sub(WEEK);
    points[start..]
        .windows(2)
        .filter(|pair| pair[1].amount > pair[0].amount * multiplier)
        .map(|pair| Anomaly {
            kind: AnomalyKind::DailySpike,
            description: format!(
                "Cost spike on {}: {:.2} (vs {:.2} previous day)",
                pair[1].date, pair[1].amount, pair[0].amount
            ),
            severity: AnomalySeverity::High,
        })
        .collect()
}

/// Weekly and daily spikes over a daily series
pub fn detect_anomalies(points: &[DailyCost], sensitivity: Sensitivity) -> Vec<Anomaly> {
    if points.len() < MIN_POINTS {
        debug!(points = points.len(), "Not enough history for anomaly detection");
        return Vec::new();
    }
    let multiplier = sensitivity.multiplier();
    let mut anomalies: Vec<Anomaly> = weekly_spike(points, multiplier).into_iter().collect();
    anomalies.extend(daily_spikes(points, multiplier));
    anomalies
}

/// Evaluates snapshots against the configured thresholds
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    threshold: f64,
    levels: AlertLevels,
    anomaly_detection: bool,
    sensitivity: Sensitivity,
    service_thresholds: Vec<(String, f64)>,
    resource_thresholds: Vec<(String, f64)>,
}

impl AlertEvaluator {
    /// Build an evaluator from the resolved configuration
    pub fn new(config: &Config) -> Self {
        Self {
            threshold: config.monitoring.cost_threshold,
            levels: config.alerts.levels,
            anomaly_detection: config.anomaly.enabled,
            sensitivity: config.anomaly.sensitivity,
            service_thresholds: config
                .services
                .thresholds
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            resource_thresholds: config
                .resources
                .thresholds
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Evaluate one snapshot
    pub fn evaluate(&self, snapshot: &CostSnapshot) -> Evaluation {
        let level = classify(snapshot.current_cost, self.threshold, &self.levels);

        let mut services: Vec<ItemStatus> = self
            .service_thresholds
            .iter()
            .filter_map(|(name, threshold)| {
                snapshot
                    .services
                    .get(name)
                    .map(|cost| self.item_status(name, cost, *threshold))
            })
            .collect();
        sort_items(&mut services);

        let mut resources: Vec<ItemStatus> = snapshot
            .resources
            .iter()
            .filter_map(|(name, cost)| {
                self.resource_thresholds
                    .iter()
                    .find(|(pattern, _)| name.contains(pattern.as_str()))
                    .map(|(_, threshold)| self.item_status(name, cost, *threshold))
            })
            .collect();
        sort_items(&mut resources);

        let anomalies = if self.anomaly_detection {
            detect_anomalies(snapshot.history.points(), self.sensitivity)
        } else {
            Vec::new()
        };

        let any_item_exceeded = services.iter().chain(&resources).any(ItemStatus::exceeded);
        let alert_triggered =
            level >= AlertLevel::Warning || !anomalies.is_empty() || any_item_exceeded;

        debug!(
            ?level,
            cost = snapshot.current_cost,
            threshold = self.threshold,
            anomalies = anomalies.len(),
            alert_triggered,
            "Evaluated snapshot"
        );

        Evaluation {
            level,
            current_cost: snapshot.current_cost,
            threshold: self.threshold,
            percentage: percentage_of(snapshot.current_cost, self.threshold),
            services,
            resources,
            anomalies,
            alert_triggered,
        }
    }

    fn item_status(&self, name: &str, cost: f64, threshold: f64) -> ItemStatus {
        ItemStatus {
            name: name.to_string(),
            cost,
            threshold,
            percentage: percentage_of(cost, threshold),
            level: classify(cost, threshold, &self.levels),
        }
    }
}

fn sort_items(items: &mut [ItemStatus]) {
    items.sort_by(|a, b| b.cost.total_cmp(&a.cost).then_with(|| a.name.cmp(&b.name)));
}
