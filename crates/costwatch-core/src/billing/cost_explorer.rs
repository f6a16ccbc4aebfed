//! AWS Cost Explorer implementation of the billing API

use std::collections::HashMap;

use aws_sdk_costexplorer::{
    config::Credentials,
    error::DisplayErrorContext,
    types::{
        DateInterval, Dimension, DimensionValues, Expression, GroupDefinition,
        GroupDefinitionType, Metric, MetricValue, ResultByTime, TagValues,
    },
    Client,
};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::AwsConfig;
use crate::error::{Error, Result};
use crate::models::{Forecast, DEFAULT_CURRENCY};

use super::{
    BillingApi, CostFilter, CostQuery, Granularity, GroupBy, RawCostResponse, RawGroup,
    RawMetric, RawResultByTime,
};

/// Name the static credentials are registered under
const CREDENTIALS_PROVIDER: &str = "costwatch";

/// AWS Cost Explorer client wrapper
pub struct CostExplorerClient {
    client: Client,
}

impl CostExplorerClient {
    /// Create a client from explicit credentials and region
    pub async fn new(config: &AwsConfig) -> Result<Self> {
        let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        else {
            return Err(Error::config("AWS credentials not found"));
        };

        let credentials = Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        info!(region = %config.region, "AWS Cost Explorer client initialized");
        Ok(Self {
            client: Client::new(&sdk_config),
        })
    }

    async fn grouped_or_plain(&self, query: &CostQuery) -> Result<Vec<ResultByTime>> {
        let time_period = date_interval(query.start, query.end)?;
        let mut results = Vec::new();
        let mut next_page: Option<String> = None;

        loop {
            let page = self
                .client
                .get_cost_and_usage()
                .time_period(time_period.clone())
                .granularity(granularity(query.granularity))
                .metrics(query.metric.clone())
                .set_group_by(query.group_by.as_ref().map(|g| vec![group_definition(g)]))
                .set_filter(query.filter.as_ref().map(expression))
                .set_next_page_token(next_page.take())
                .send()
                .await
                .map_err(|e| {
                    Error::billing(format!("get_cost_and_usage failed: {}", DisplayErrorContext(&e)))
                })?;

            results.extend(page.results_by_time().iter().cloned());
            match page.next_page_token() {
                Some(token) if !token.is_empty() => next_page = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(results)
    }

    /// Resource-level data lives behind a separate endpoint that insists on
    /// a filter expression.
    async fn with_resources(&self, query: &CostQuery) -> Result<Vec<ResultByTime>> {
        let filter = query.filter.as_ref().ok_or_else(|| {
            Error::billing("resource-level queries need a service or tag filter")
        })?;
        let time_period = date_interval(query.start, query.end)?;
        let mut results = Vec::new();
        let mut next_page: Option<String> = None;

        loop {
            let page = self
                .client
                .get_cost_and_usage_with_resources()
                .time_period(time_period.clone())
                .granularity(granularity(query.granularity))
                .metrics(query.metric.clone())
                .set_group_by(query.group_by.as_ref().map(|g| vec![group_definition(g)]))
                .filter(expression(filter))
                .set_next_page_token(next_page.take())
                .send()
                .await
                .map_err(|e| {
                    Error::billing(format!(
                        "get_cost_and_usage_with_resources failed: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            results.extend(page.results_by_time().iter().cloned());
            match page.next_page_token() {
                Some(token) if !token.is_empty() => next_page = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(results)
    }
}

#[async_trait::async_trait]
impl BillingApi for CostExplorerClient {
    async fn cost_and_usage(&self, query: &CostQuery) -> Result<RawCostResponse> {
        debug!(
            start = %query.start,
            end = %query.end,
            granularity = ?query.granularity,
            group_by = ?query.group_by,
            filtered = query.filter.is_some(),
            "Querying Cost Explorer"
        );

        let results = if query.group_by.as_ref().is_some_and(GroupBy::is_resource) {
            self.with_resources(query).await?
        } else {
            self.grouped_or_plain(query).await?
        };

        Ok(RawCostResponse {
            results_by_time: results.iter().map(raw_result).collect(),
        })
    }

    async fn cost_forecast(&self, start: NaiveDate, end: NaiveDate) -> Result<Forecast> {
        let response = self
            .client
            .get_cost_forecast()
            .time_period(date_interval(start, end)?)
            .metric(Metric::BlendedCost)
            .granularity(aws_sdk_costexplorer::types::Granularity::Monthly)
            .send()
            .await
            .map_err(|e| {
                Error::billing(format!("get_cost_forecast failed: {}", DisplayErrorContext(&e)))
            })?;

        let total = response
            .total()
            .ok_or_else(|| Error::billing("forecast response has no total"))?;
        let amount = total
            .amount()
            .unwrap_or("0")
            .parse::<f64>()
            .map_err(|e| Error::billing(format!("malformed forecast amount: {e}")))?;

        Ok(Forecast {
            amount,
            currency: total.unit().unwrap_or(DEFAULT_CURRENCY).to_string(),
            period_days: u32::try_from((end - start).num_days()).unwrap_or(0),
        })
    }
}

fn date_interval(start: NaiveDate, end: NaiveDate) -> Result<DateInterval> {
    DateInterval::builder()
        .start(start.format("%Y-%m-%d").to_string())
        .end(end.format("%Y-%m-%d").to_string())
        .build()
        .map_err(|e| Error::billing(format!("failed to build date interval: {e}")))
}

fn granularity(granularity: Granularity) -> aws_sdk_costexplorer::types::Granularity {
    match granularity {
        Granularity::Daily => aws_sdk_costexplorer::types::Granularity::Daily,
        Granularity::Monthly => aws_sdk_costexplorer::types::Granularity::Monthly,
    }
}

fn group_definition(group_by: &GroupBy) -> GroupDefinition {
    match group_by {
        GroupBy::Dimension(key) => GroupDefinition::builder()
            .r#type(GroupDefinitionType::Dimension)
            .key(key)
            .build(),
        GroupBy::Tag(key) => GroupDefinition::builder()
            .r#type(GroupDefinitionType::Tag)
            .key(key)
            .build(),
    }
}

fn expression(filter: &CostFilter) -> Expression {
    match filter {
        CostFilter::Dimension { key, values } => Expression::builder()
            .dimensions(
                DimensionValues::builder()
                    .key(Dimension::from(key.as_str()))
                    .set_values(Some(values.clone()))
                    .build(),
            )
            .build(),
        CostFilter::Tag { key, values } => Expression::builder()
            .tags(
                TagValues::builder()
                    .key(key)
                    .set_values(Some(values.clone()))
                    .build(),
            )
            .build(),
        CostFilter::And(filters) => Expression::builder()
            .set_and(Some(filters.iter().map(expression).collect()))
            .build(),
    }
}

fn raw_metrics(metrics: Option<&HashMap<String, MetricValue>>) -> HashMap<String, RawMetric> {
    metrics
        .map(|m| {
            m.iter()
                .map(|(name, value)| {
                    (
                        name.clone(),
                        RawMetric {
                            amount: value.amount().map(String::from),
                            unit: value.unit().map(String::from),
                        },
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn raw_result(result: &ResultByTime) -> RawResultByTime {
    let (start, end) = result
        .time_period()
        .map(|tp| (tp.start().to_string(), tp.end().to_string()))
        .unwrap_or_default();

    RawResultByTime {
        start,
        end,
        total: raw_metrics(result.total()),
        groups: result
            .groups()
            .iter()
            .map(|group| RawGroup {
                keys: group.keys().to_vec(),
                metrics: raw_metrics(group.metrics()),
            })
            .collect(),
    }
}
