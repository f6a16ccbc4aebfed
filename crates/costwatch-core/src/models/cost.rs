//! Cost data models

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Currency used when the billing API does not report one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Spend for a single day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    /// Day the amount was billed on
    pub date: NaiveDate,
    /// Amount spent (never negative)
    pub amount: f64,
}

/// Daily spend ordered by date, sharing one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSeries {
    points: Vec<DailyCost>,
    currency: String,
}

impl Default for CostSeries {
    fn default() -> Self {
        Self::new(DEFAULT_CURRENCY)
    }
}

impl CostSeries {
    /// Create an empty series
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            points: Vec::new(),
            currency: currency.into(),
        }
    }

    /// Build a series from unordered points. Points are sorted by date and
    /// negative amounts (credits) are clamped to zero.
    pub fn from_points(currency: impl Into<String>, points: Vec<DailyCost>) -> Self {
        let mut series = Self::new(currency);
        for point in points {
            series.push(point.date, point.amount);
        }
        series
    }

    /// Insert a day, keeping the series ordered by date
    pub fn push(&mut self, date: NaiveDate, amount: f64) {
        let point = DailyCost {
            date,
            amount: amount.max(0.0),
        };
        let idx = self.points.partition_point(|p| p.date <= date);
        self.points.insert(idx, point);
    }

    /// Points in date order
    pub fn points(&self) -> &[DailyCost] {
        &self.points
    }

    /// Amounts in date order
    pub fn amounts(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.amount).collect()
    }

    /// Currency shared by every point
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Sum of all points
    pub fn total(&self) -> f64 {
        self.points.iter().fold(0.0, |acc, p| acc + p.amount)
    }

    /// Number of days in the series
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no days
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The last `n` days (or fewer when the series is shorter)
    pub fn last_n(&self, n: usize) -> &[DailyCost] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }
}

/// Aggregated spend per key (service name or resource id) over a period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceBreakdown {
    costs: HashMap<String, f64>,
}

impl ServiceBreakdown {
    /// Create an empty breakdown
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an amount to a key, creating it when missing
    pub fn add(&mut self, key: impl Into<String>, amount: f64) {
        *self.costs.entry(key.into()).or_insert(0.0) += amount;
    }

    /// Amount recorded for a key
    pub fn get(&self, key: &str) -> Option<f64> {
        self.costs.get(key).copied()
    }

    /// Sum over every key. An empty breakdown totals `0.0`, not `-0.0`.
    pub fn total(&self) -> f64 {
        self.costs.values().fold(0.0, |acc, v| acc + v)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.costs.len()
    }

    /// Whether no key was recorded
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// Keep only the keys matching the predicate
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.costs.retain(|k, _| keep(k));
    }

    /// Iterate over `(key, amount)` in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.costs.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The `n` most expensive positive entries, highest first. Ties are
    /// broken by name so output is stable.
    pub fn top(&self, n: usize) -> Vec<(&str, f64)> {
        let mut entries: Vec<(&str, f64)> = self.iter().filter(|(_, cost)| *cost > 0.0).collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.truncate(n);
        entries
    }
}

impl FromIterator<(String, f64)> for ServiceBreakdown {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut breakdown = Self::new();
        for (key, amount) in iter {
            breakdown.add(key, amount);
        }
        breakdown
    }
}

/// Normalized result of one billing query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    /// Sum of every bucket in the window
    pub total: f64,
    /// Per-bucket series
    pub series: CostSeries,
    /// Grouped amounts, present when the query had a group-by
    pub breakdown: Option<ServiceBreakdown>,
    /// First day of the window
    pub start: Option<NaiveDate>,
    /// Exclusive end of the window
    pub end: Option<NaiveDate>,
}

impl CostReport {
    /// Currency of the report
    pub fn currency(&self) -> &str {
        self.series.currency()
    }

    /// Whether the billing API returned no buckets
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Forecasted spend over a future window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Forecasted amount
    pub amount: f64,
    /// Currency of the amount
    pub currency: String,
    /// Length of the forecast window
    pub period_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_series_stays_sorted() {
        let mut series = CostSeries::new("USD");
        series.push(day(3), 3.0);
        series.push(day(1), 1.0);
        series.push(day(2), 2.0);

        let dates: Vec<NaiveDate> = series.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(1), day(2), day(3)]);
        assert_eq!(series.amounts(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_series_clamps_credits() {
        let series = CostSeries::from_points(
            "USD",
            vec![
                DailyCost { date: day(1), amount: -4.0 },
                DailyCost { date: day(2), amount: 6.0 },
            ],
        );
        assert_eq!(series.amounts(), vec![0.0, 6.0]);
        assert!((series.total() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_totals_are_positive_zero() {
        let breakdown = ServiceBreakdown::default();
        assert!(breakdown.total().is_sign_positive());
        assert_eq!(format!("{:.2}", breakdown.total()), "0.00");
        assert!(CostSeries::new("USD").total().is_sign_positive());
    }

    #[test]
    fn test_last_n_shorter_than_series() {
        let series = CostSeries::from_points(
            "USD",
            (1..=3).map(|d| DailyCost { date: day(d), amount: f64::from(d) }).collect(),
        );
        assert_eq!(series.last_n(10).len(), 3);
        assert_eq!(series.last_n(2)[0].date, day(2));
    }

    #[test]
    fn test_breakdown_top_sorted_desc() {
        let mut breakdown = ServiceBreakdown::new();
        breakdown.add("Amazon S3", 12.5);
        breakdown.add("Amazon EC2", 80.0);
        breakdown.add("AWS Lambda", 0.0);
        breakdown.add("Amazon RDS", 40.0);
        breakdown.add("Amazon EC2", 20.0);

        assert_eq!(
            breakdown.top(2),
            vec![("Amazon EC2", 100.0), ("Amazon RDS", 40.0)]
        );
        // zero-cost entries are never listed
        assert_eq!(breakdown.top(10).len(), 3);
        assert!((breakdown.total() - 152.5).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_retain() {
        let mut breakdown: ServiceBreakdown = vec![
            ("Amazon EC2".to_string(), 1.0),
            ("Tax".to_string(), 2.0),
        ]
        .into_iter()
        .collect();
        breakdown.retain(|k| k != "Tax");
        assert_eq!(breakdown.get("Tax"), None);
        assert_eq!(breakdown.get("Amazon EC2"), Some(1.0));
    }
}
