//! Reshape raw billing responses into cost reports

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::{CostReport, CostSeries, DailyCost, ServiceBreakdown, DEFAULT_CURRENCY};

use super::{RawCostResponse, RawMetric};

/// Normalize a cost-and-usage response for `metric`.
///
/// Buckets without an ungrouped total (grouped queries) are totalled from
/// their groups. An empty response is an empty report, not an error.
pub fn normalize(response: &RawCostResponse, metric: &str) -> Result<CostReport> {
    let mut currency: Option<String> = None;
    let mut points = Vec::with_capacity(response.results_by_time.len());
    let mut breakdown: Option<ServiceBreakdown> = None;

    for bucket in &response.results_by_time {
        let date = parse_date(&bucket.start)?;

        let mut group_sum = 0.0;
        for group in &bucket.groups {
            let Some(value) = group.metrics.get(metric) else {
                continue;
            };
            let amount = parse_amount(value)?;
            group_sum += amount;
            remember_unit(&mut currency, value);
            breakdown
                .get_or_insert_with(ServiceBreakdown::new)
                .add(group_key(&group.keys), amount);
        }

        let amount = match bucket.total.get(metric) {
            Some(value) if value.amount.is_some() => {
                remember_unit(&mut currency, value);
                parse_amount(value)?
            }
            _ => group_sum,
        };
        points.push(DailyCost { date, amount });
    }

    let series = CostSeries::from_points(
        currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        points,
    );

    let start = response
        .results_by_time
        .first()
        .map(|b| parse_date(&b.start))
        .transpose()?;
    let end = response
        .results_by_time
        .last()
        .map(|b| parse_date(&b.end))
        .transpose()?;

    Ok(CostReport {
        total: series.total(),
        series,
        breakdown,
        start,
        end,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| Error::billing(format!("malformed date '{raw}': {e}")))
}

fn parse_amount(metric: &RawMetric) -> Result<f64> {
    match metric.amount.as_deref() {
        None => Ok(0.0),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::billing(format!("malformed amount '{raw}'"))),
    }
}

fn remember_unit(currency: &mut Option<String>, metric: &RawMetric) {
    if let Some(unit) = metric.unit.as_deref().filter(|u| !u.is_empty()) {
        *currency = Some(unit.to_string());
    }
}

/// Tag groups come back as `key$value`; an empty value is untagged spend
fn group_key(keys: &[String]) -> String {
    let Some(key) = keys.first() else {
        return "Unknown".to_string();
    };
    match key.split_once('$') {
        Some((_, "")) => "untagged".to_string(),
        Some((_, value)) => value.to_string(),
        None => key.clone(),
    }
}
