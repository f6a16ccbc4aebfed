//! # CostWatch
//!
//! Cloud spend monitoring with Slack alerts.
//!
//! CostWatch queries AWS Cost Explorer, compares month-to-date spend against
//! configured thresholds, looks for week-over-week and day-over-day spikes,
//! and posts the result to a Slack channel.
//!
//! ## Architecture
//!
//! - **Config**: environment, optional JSON/YAML file, CLI overrides
//! - **Billing**: range and group-by queries, normalized into cost reports
//! - **Alerting**: threshold classification, spike detection, Slack delivery
//! - **Scheduler**: wall-clock triggers polled by the daemon loop
//!
//! ## Quick Start
//!
//! ```bash
//! # Verify AWS and Slack credentials
//! costwatch --test
//!
//! # Run one check and exit
//! costwatch --check-once --threshold 250
//!
//! # Run continuously
//! costwatch --daemon
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod billing;
pub mod bot;
pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;

pub use bot::CostMonitorBot;
pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertEvaluator, MessagingApi, NotificationSender};
    pub use crate::billing::{BillingApi, CostMonitor};
    pub use crate::bot::CostMonitorBot;
    pub use crate::config::{Config, ConfigOverrides};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::scheduler::{Job, Schedule};
}
