//! Cost query component
//!
//! Issues range and group-by queries against a [`BillingApi`] and normalizes
//! the responses.

use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::models::{CostReport, CostSeries, Forecast, ServiceBreakdown};

use super::{normalize, BillingApi, CostFilter, CostQuery, GroupBy};

/// Resource-level data is only kept by the provider for this many days
pub const MAX_RESOURCE_LOOKBACK_DAYS: u32 = 14;

/// Service queried for resources when no filter narrows the query
const DEFAULT_RESOURCE_SERVICE: &str = "Amazon Elastic Compute Cloud - Compute";

/// Query component over a billing API
#[derive(Clone)]
pub struct CostMonitor {
    api: Arc<dyn BillingApi>,
}

impl CostMonitor {
    /// Create a monitor over a billing API
    pub fn new(api: Arc<dyn BillingApi>) -> Self {
        Self { api }
    }

    /// Daily query over the last `lookback_days` days (today excluded)
    pub async fn query(
        &self,
        lookback_days: u32,
        group_by: Option<GroupBy>,
        filter: Option<CostFilter>,
    ) -> Result<CostReport> {
        let end = today();
        let start = end - Duration::days(i64::from(lookback_days));
        self.query_range(CostQuery::daily(start, end).group_by(group_by).filter(filter))
            .await
    }

    /// Run an explicit query
    pub async fn query_range(&self, query: CostQuery) -> Result<CostReport> {
        if query.start >= query.end {
            debug!(start = %query.start, end = %query.end, "Empty query window");
            return Ok(CostReport::default());
        }
        let response = self.api.cost_and_usage(&query).await?;
        normalize(&response, &query.metric)
    }

    /// Month-to-date spend and its per-service breakdown
    pub async fn current_month_cost(
        &self,
        filter: Option<CostFilter>,
    ) -> Result<(f64, ServiceBreakdown, String)> {
        let start = first_of_month(today());
        // on the 1st the window would be empty, so today's partial spend is included
        let end = today().max(start + Duration::days(1));
        let query = CostQuery::daily(start, end)
            .monthly()
            .group_by(Some(GroupBy::service()))
            .filter(filter);
        let report = self.query_range(query).await?;

        let currency = report.currency().to_string();
        let services = report.breakdown.unwrap_or_default();
        info!(
            total = services.total(),
            services = services.len(),
            "Fetched month-to-date cost"
        );
        Ok((services.total(), services, currency))
    }

    /// Daily spend over the last `days` days
    pub async fn daily_costs(&self, days: u32, filter: Option<CostFilter>) -> Result<CostSeries> {
        Ok(self.query(days, None, filter).await?.series)
    }

    /// Spend per resource over the last `days` days, capped at the provider's
    /// resource-level retention
    pub async fn resource_costs(
        &self,
        days: u32,
        filter: Option<CostFilter>,
    ) -> Result<ServiceBreakdown> {
        let days = days.min(MAX_RESOURCE_LOOKBACK_DAYS);
        // the resource endpoint only serves EC2 compute, so the service
        // dimension is part of every resource query
        let mut parts = vec![CostFilter::services(vec![DEFAULT_RESOURCE_SERVICE.to_string()])];
        match filter {
            Some(CostFilter::And(inner)) => parts.extend(inner),
            Some(other) => parts.push(other),
            None => {}
        }
        let report = self
            .query(days, Some(GroupBy::resource()), CostFilter::all_of(parts))
            .await?;
        Ok(report.breakdown.unwrap_or_default())
    }

    /// Forecast for the next `days` days
    pub async fn forecast(&self, days: u32) -> Result<Forecast> {
        let start = today();
        let end = start + Duration::days(i64::from(days));
        self.api.cost_forecast(start, end).await
    }

    /// Quick round-trip used to verify credentials
    pub async fn ping(&self) -> Result<()> {
        self.daily_costs(1, None).await.map(|_| ())
    }
}

/// Filter combining the explicit service allow-list and tag filters
pub fn build_filter(config: &Config) -> Option<CostFilter> {
    let mut filters = Vec::new();
    if let Some(services) = config.services.selection.explicit() {
        filters.push(CostFilter::services(services));
    }
    for (key, values) in &config.tag_filters {
        filters.push(CostFilter::tag(key.clone(), values.clone()));
    }
    CostFilter::all_of(filters)
}

/// Tag-only filter, for resource queries that group across services
pub fn tag_filter(config: &Config) -> Option<CostFilter> {
    CostFilter::all_of(
        config
            .tag_filters
            .iter()
            .map(|(key, values)| CostFilter::tag(key.clone(), values.clone()))
            .collect(),
    )
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
