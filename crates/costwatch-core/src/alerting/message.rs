//! Slack message rendering
//!
//! Builders here only produce [`SlackMessage`] values; delivery lives in
//! [`notifier`](super::notifier).

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::{AlertLevel, CostSnapshot, Evaluation, ItemStatus};

/// Display name the bot posts under
pub const BOT_USERNAME: &str = "AWS Cost Monitor";

/// A `chat.postMessage` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackMessage {
    /// Target channel name or id
    pub channel: String,
    /// Fallback text shown in notifications
    pub text: String,
    /// Display name override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Avatar emoji, e.g. `:warning:`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    /// Rich layout; the fallback text is used when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl SlackMessage {
    fn new(config: &Config, text: impl Into<String>, icon_emoji: &str) -> Self {
        Self {
            channel: config.slack.channel.clone(),
            text: text.into(),
            username: Some(BOT_USERNAME.to_string()),
            icon_emoji: Some(icon_emoji.to_string()),
            blocks: Vec::new(),
        }
    }

    fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Fallback text plus every text element of every block
    pub fn plain_text(&self) -> String {
        let mut out = self.text.clone();
        for block in &self.blocks {
            for text in block.texts() {
                out.push('\n');
                out.push_str(&text.text);
            }
        }
        out
    }
}

/// Layout block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Large bold title
    Header {
        /// Plain-text title
        text: Text,
    },
    /// Paragraph with optional two-column fields
    Section {
        /// Body text
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<Text>,
        /// Short label/value pairs rendered in columns
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Text>,
    },
    /// Horizontal rule
    Divider,
    /// Small grey footer text
    Context {
        /// Footer elements
        elements: Vec<Text>,
    },
}

impl Block {
    fn header(text: impl Into<String>) -> Self {
        Self::Header {
            text: Text::plain(text),
        }
    }

    fn markdown(text: impl Into<String>) -> Self {
        Self::Section {
            text: Some(Text::markdown(text)),
            fields: Vec::new(),
        }
    }

    fn fields(fields: Vec<Text>) -> Self {
        Self::Section { text: None, fields }
    }

    fn texts(&self) -> Vec<&Text> {
        match self {
            Self::Header { text } => vec![text],
            Self::Section { text, fields } => text.iter().chain(fields.iter()).collect(),
            Self::Divider => Vec::new(),
            Self::Context { elements } => elements.iter().collect(),
        }
    }
}

/// Text object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    /// Rendering mode
    #[serde(rename = "type")]
    pub kind: TextKind,
    /// Content
    pub text: String,
}

impl Text {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::PlainText,
            text: text.into(),
        }
    }

    fn markdown(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Mrkdwn,
            text: text.into(),
        }
    }

    fn field(title: &str, value: impl std::fmt::Display) -> Self {
        Self::markdown(format!("*{title}:*\n{value}"))
    }
}

/// How Slack renders a text object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    /// Literal text
    PlainText,
    /// Slack's markdown dialect
    Mrkdwn,
}

fn money(currency: &str, amount: f64) -> String {
    format!("{currency} {amount:.2}")
}

fn percent(percentage: Option<f64>) -> String {
    percentage.map_or_else(|| "n/a".to_string(), |p| format!("{p:.1}%"))
}

fn bullets<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| format!("• {}", line.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Level marker, e.g. `:rotating_light: CRITICAL`
pub fn level_marker(level: AlertLevel) -> String {
    format!("{} {}", level.emoji(), level.label())
}

/// Threshold alert with breakdowns, anomalies and recommendations
pub fn cost_alert(config: &Config, snapshot: &CostSnapshot, evaluation: &Evaluation) -> SlackMessage {
    let currency = snapshot.currency.as_str();
    let project = &config.monitoring.project_name;
    let marker = level_marker(evaluation.level);

    let mut fields = vec![
        Text::field("Current Cost", money(currency, evaluation.current_cost)),
        Text::field("Threshold", money(currency, evaluation.threshold)),
        Text::field("Percentage", percent(evaluation.percentage)),
        Text::field(
            "Period",
            format!("{} days", config.monitoring.monitoring_period_days),
        ),
        Text::field("Alert Level", &marker),
    ];
    if let Some(forecast) = &snapshot.forecast {
        fields.push(Text::field(
            &format!("Forecast ({} days)", forecast.period_days),
            money(&forecast.currency, forecast.amount),
        ));
    }

    let mut message = SlackMessage::new(
        config,
        format!("{marker}: AWS Cost Alert for *{project}*"),
        ":moneybag:",
    )
    .block(Block::header(format!("AWS Cost Monitor - {project}")))
    .block(Block::fields(fields));

    if config.alerts.detailed_breakdown {
        let max = config.alerts.max_services;
        let services = snapshot.services.top(max);
        if !services.is_empty() {
            message = message.block(Block::markdown(format!(
                "*Top Services by Cost:*\n{}",
                bullets(services.iter().map(|(name, cost)| format!("{name}: {}", money(currency, *cost))))
            )));
        }
        let resources = snapshot.resources.top(max);
        if !resources.is_empty() {
            message = message.block(Block::markdown(format!(
                "*Top Resources by Cost:*\n{}",
                bullets(resources.iter().map(|(name, cost)| format!("{name}: {}", money(currency, *cost))))
            )));
        }
    }

    let exceeded: Vec<&ItemStatus> = evaluation.exceeded_items().collect();
    if !exceeded.is_empty() {
        message = message.block(Block::markdown(format!(
            "*Over Individual Thresholds:*\n{}",
            bullets(exceeded.iter().map(|item| {
                format!(
                    "{}: {} of {} ({})",
                    item.name,
                    money(currency, item.cost),
                    money(currency, item.threshold),
                    percent(item.percentage)
                )
            }))
        )));
    }

    if !evaluation.anomalies.is_empty() {
        message = message.block(Block::markdown(format!(
            "*Anomalies Detected:*\n{}",
            bullets(
                evaluation
                    .anomalies
                    .iter()
                    .map(|a| format!("{} (severity: {})", a.description, a.severity))
            )
        )));
    }

    message
        .block(Block::Divider)
        .block(Block::markdown(format!(
            "*Recommendations:*\n{}",
            bullets(recommendations(evaluation.level, &exceeded))
        )))
        .block(Block::Context {
            elements: vec![Text::markdown(format!(
                "Checked {}",
                snapshot.taken_at.format("%Y-%m-%d %H:%M")
            ))],
        })
}

/// Periodic summary: total, day-over-day trend and the last week
pub fn cost_summary(config: &Config, snapshot: &CostSnapshot) -> SlackMessage {
    let currency = snapshot.currency.as_str();
    let project = &config.monitoring.project_name;
    let points = snapshot.daily.points();

    let trend = match points {
        [.., before, last] => {
            let delta = last.amount - before.amount;
            let arrow = if delta > 0.0 {
                ":chart_with_upwards_trend:"
            } else if delta < 0.0 {
                ":chart_with_downwards_trend:"
            } else {
                ":arrow_right:"
            };
            format!("{arrow} {} vs. yesterday", money(currency, delta.abs()))
        }
        _ => "No trend data available".to_string(),
    };

    let mut message = SlackMessage::new(
        config,
        format!("Cost Summary for {project}"),
        ":chart_with_upwards_trend:",
    )
    .block(Block::header(format!(":bar_chart: Cost Summary - {project}")))
    .block(Block::fields(vec![
        Text::field("Total Cost", money(currency, snapshot.current_cost)),
        Text::field("Daily Trend", trend),
    ]));

    let last_week = snapshot.daily.last_n(7);
    if !last_week.is_empty() {
        message = message.block(Block::markdown(format!(
            "*Daily Costs (Last 7 days):*\n{}",
            bullets(
                last_week
                    .iter()
                    .map(|p| format!("{}: {}", p.date, money(currency, p.amount)))
            )
        )));
    }
    message
}

/// Failure report for a check cycle
pub fn error_notice(config: &Config, error: &str) -> SlackMessage {
    SlackMessage::new(
        config,
        format!(
            ":rotating_light: AWS Cost Monitor Error for {}:\n```{error}```",
            config.monitoring.project_name
        ),
        ":rotating_light:",
    )
}

/// Confirmation posted after a successful connection test
pub fn connection_ok(config: &Config) -> SlackMessage {
    SlackMessage::new(
        config,
        format!(
            ":white_check_mark: AWS Cost Monitor test successful for *{}*\nBot is ready to monitor costs!",
            config.monitoring.project_name
        ),
        ":white_check_mark:",
    )
}

/// Fixed advice for the tier, followed by one hint per exceeded item
pub fn recommendations(level: AlertLevel, exceeded: &[&ItemStatus]) -> Vec<String> {
    let general: [&str; 3] = match level {
        AlertLevel::Critical => [
            "Immediately review high-cost services",
            "Consider stopping non-essential resources",
            "Set up billing alerts for real-time monitoring",
        ],
        AlertLevel::Warning => [
            "Review resource utilization",
            "Consider rightsizing instances",
            "Enable cost optimization recommendations",
        ],
        AlertLevel::Info | AlertLevel::Normal => [
            "Costs are within normal range",
            "Consider setting up Reserved Instances for predictable workloads",
            "Review and optimize storage costs",
        ],
    };

    general
        .iter()
        .map(|s| (*s).to_string())
        .chain(exceeded.iter().map(|item| item_hint(&item.name)))
        .collect()
}

fn item_hint(name: &str) -> String {
    let hint = if name.contains("Elastic Compute Cloud") || name.contains("EC2") || name.contains(":instance/") {
        "check for idle or oversized instances"
    } else if name.contains("Relational Database") || name.contains("RDS") {
        "review instance classes and snapshot retention"
    } else if name.contains("Simple Storage Service") || name.contains("S3") {
        "apply lifecycle policies to infrequently accessed data"
    } else if name.contains("Lambda") {
        "review memory settings and invocation volume"
    } else {
        "review recent usage"
    };
    format!("{name} is over its threshold: {hint}")
}
