//! Alerting for costwatch
//!
//! Threshold and spike evaluation, Slack message rendering, and delivery.

mod evaluator;
pub mod message;
mod notifier;

pub use evaluator::{
    classify, classify_percentage, daily_spikes, detect_anomalies, percentage_of, weekly_spike,
    AlertEvaluator,
};
pub use message::SlackMessage;
pub use notifier::{MessagingApi, NotificationSender, SlackClient};
