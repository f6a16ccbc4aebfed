//! Billing API access
//!
//! [`BillingApi`] is the seam to the cloud provider's cost-reporting service.
//! [`CostMonitor`] builds parameterized range queries on top of it and turns
//! the raw responses into [`CostReport`](crate::models::CostReport)s.

mod cost_explorer;
mod monitor;
mod normalize;

pub use cost_explorer::CostExplorerClient;
pub use monitor::{build_filter, tag_filter, CostMonitor, MAX_RESOURCE_LOOKBACK_DAYS};
pub use normalize::normalize;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Forecast;

/// Cost metric requested from the billing API
pub const COST_METRIC: &str = "BlendedCost";

/// Dimension key for service names
pub const SERVICE_DIMENSION: &str = "SERVICE";

/// Dimension key for resource identifiers
pub const RESOURCE_DIMENSION: &str = "RESOURCE_ID";

/// Time bucket size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Granularity {
    /// One bucket per day
    Daily,
    /// One bucket per calendar month
    Monthly,
}

/// Group-by dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBy {
    /// Provider dimension such as `SERVICE` or `RESOURCE_ID`
    Dimension(String),
    /// Cost allocation tag key
    Tag(String),
}

impl GroupBy {
    /// Group by service name
    pub fn service() -> Self {
        Self::Dimension(SERVICE_DIMENSION.to_string())
    }

    /// Group by resource identifier
    pub fn resource() -> Self {
        Self::Dimension(RESOURCE_DIMENSION.to_string())
    }

    /// Whether this groups by resource identifier
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Dimension(key) if key == RESOURCE_DIMENSION)
    }
}

/// Filter expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostFilter {
    /// Dimension value is one of `values`
    Dimension {
        /// Dimension name, e.g. `SERVICE`
        key: String,
        /// Accepted values
        values: Vec<String>,
    },
    /// Tag value is one of `values`
    Tag {
        /// Tag key
        key: String,
        /// Accepted values
        values: Vec<String>,
    },
    /// Every sub-expression matches
    And(Vec<CostFilter>),
}

impl CostFilter {
    /// Restrict to the given services
    pub fn services(services: Vec<String>) -> Self {
        Self::Dimension {
            key: SERVICE_DIMENSION.to_string(),
            values: services,
        }
    }

    /// Restrict to a tag value set
    pub fn tag(key: impl Into<String>, values: Vec<String>) -> Self {
        Self::Tag {
            key: key.into(),
            values,
        }
    }

    /// Combine atomic filters with logical AND. No filters yields `None` so
    /// the filter parameter is omitted entirely; the provider rejects empty
    /// expressions and single-operand ANDs.
    pub fn all_of(mut filters: Vec<CostFilter>) -> Option<CostFilter> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Self::And(filters)),
        }
    }
}

/// A cost-and-usage query over `[start, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct CostQuery {
    /// First day, inclusive
    pub start: NaiveDate,
    /// Last day, exclusive
    pub end: NaiveDate,
    /// Bucket size
    pub granularity: Granularity,
    /// Cost metric name
    pub metric: String,
    /// Optional group-by dimension or tag
    pub group_by: Option<GroupBy>,
    /// Optional filter; `None` omits the parameter
    pub filter: Option<CostFilter>,
}

impl CostQuery {
    /// Daily query over `[start, end)` for the default metric
    pub fn daily(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            granularity: Granularity::Daily,
            metric: COST_METRIC.to_string(),
            group_by: None,
            filter: None,
        }
    }

    /// Switch to monthly buckets
    pub fn monthly(mut self) -> Self {
        self.granularity = Granularity::Monthly;
        self
    }

    /// Set the group-by dimension
    pub fn group_by(mut self, group_by: Option<GroupBy>) -> Self {
        self.group_by = group_by;
        self
    }

    /// Set the filter expression
    pub fn filter(mut self, filter: Option<CostFilter>) -> Self {
        self.filter = filter;
        self
    }
}

/// A metric value as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetric {
    /// Decimal string
    pub amount: Option<String>,
    /// Currency code
    pub unit: Option<String>,
}

/// One group within a time bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGroup {
    /// Group key values, e.g. the service name
    pub keys: Vec<String>,
    /// Metrics keyed by metric name
    pub metrics: HashMap<String, RawMetric>,
}

/// One time bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResultByTime {
    /// `YYYY-MM-DD`
    pub start: String,
    /// `YYYY-MM-DD`, exclusive
    pub end: String,
    /// Ungrouped totals; empty when the query was grouped
    pub total: HashMap<String, RawMetric>,
    /// Per-group metrics when the query was grouped
    pub groups: Vec<RawGroup>,
}

/// Provider response to a cost-and-usage query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCostResponse {
    /// Buckets in date order
    pub results_by_time: Vec<RawResultByTime>,
}

/// The cost-reporting service
#[async_trait::async_trait]
pub trait BillingApi: Send + Sync {
    /// Cost and usage over a date range
    async fn cost_and_usage(&self, query: &CostQuery) -> Result<RawCostResponse>;

    /// Forecasted spend over `[start, end)`
    async fn cost_forecast(&self, start: NaiveDate, end: NaiveDate) -> Result<Forecast>;
}
