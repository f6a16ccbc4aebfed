//! Cost monitor bot
//!
//! Wires the billing monitor, evaluator and notifier into one check cycle,
//! and drives cycles from a [`Schedule`] in daemon mode.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Weekday};
use tracing::{error, info, warn};

use crate::alerting::{message, AlertEvaluator, MessagingApi, NotificationSender, SlackClient};
use crate::billing::{build_filter, tag_filter, BillingApi, CostExplorerClient, CostMonitor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{CostSeries, CostSnapshot, Evaluation, ServiceBreakdown};
use crate::scheduler::{Job, Schedule};

/// Days of history fed to spike detection
pub const ANOMALY_LOOKBACK_DAYS: u32 = 30;

/// Daemon loop pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonTiming {
    /// Sleep between schedule polls
    pub poll: Duration,
    /// Sleep after a failed cycle
    pub backoff: Duration,
}

impl Default for DaemonTiming {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(60),
            backoff: Duration::from_secs(300),
        }
    }
}

/// The monitoring bot
pub struct CostMonitorBot {
    config: Config,
    monitor: CostMonitor,
    notifier: NotificationSender,
    evaluator: AlertEvaluator,
    timing: DaemonTiming,
}

impl CostMonitorBot {
    /// Assemble a bot over explicit API implementations
    pub fn new(config: Config, billing: Arc<dyn BillingApi>, messaging: Arc<dyn MessagingApi>) -> Self {
        let evaluator = AlertEvaluator::new(&config);
        info!(project = %config.monitoring.project_name, "Cost Monitor Bot initialized");
        Self {
            config,
            monitor: CostMonitor::new(billing),
            notifier: NotificationSender::new(messaging),
            evaluator,
            timing: DaemonTiming::default(),
        }
    }

    /// Assemble a bot over AWS Cost Explorer and Slack
    pub async fn connect(config: Config) -> Result<Self> {
        let billing = CostExplorerClient::new(&config.aws).await?;
        let messaging = SlackClient::new(&config.slack)?;
        Ok(Self::new(config, Arc::new(billing), Arc::new(messaging)))
    }

    /// Override daemon pacing
    pub fn with_timing(mut self, timing: DaemonTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Resolved configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gather everything one evaluation needs.
    ///
    /// The month-to-date query and the daily series must succeed; resources,
    /// forecast and anomaly history degrade to empty on failure.
    pub async fn check_costs(&self) -> Result<CostSnapshot> {
        info!("Starting cost check");
        let config = &self.config;
        let filter = build_filter(config);

        let (_, mut services, reported_currency) =
            self.monitor.current_month_cost(filter.clone()).await?;
        services.retain(|name| config.services.selection.is_enabled(name));
        let currency = if services.is_empty() {
            config.monitoring.currency.clone()
        } else {
            reported_currency
        };

        let daily = self
            .monitor
            .daily_costs(config.monitoring.monitoring_period_days, filter.clone())
            .await?;

        let history = if config.anomaly.enabled {
            self.monitor
                .daily_costs(ANOMALY_LOOKBACK_DAYS, filter)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Could not fetch cost history, skipping anomaly detection");
                    CostSeries::new(currency.clone())
                })
        } else {
            CostSeries::new(currency.clone())
        };

        let resources = if self.wants_resources() {
            match self
                .monitor
                .resource_costs(config.monitoring.monitoring_period_days, tag_filter(config))
                .await
            {
                Ok(mut resources) => {
                    resources.retain(|id| config.resources.filter.should_monitor(id));
                    resources
                }
                Err(e) => {
                    warn!(error = %e, "Could not fetch resource costs");
                    ServiceBreakdown::new()
                }
            }
        } else {
            ServiceBreakdown::new()
        };

        let forecast = if config.forecast.enabled {
            match self.monitor.forecast(config.forecast.days).await {
                Ok(forecast) => Some(forecast),
                Err(e) => {
                    warn!(error = %e, "Could not fetch cost forecast");
                    None
                }
            }
        } else {
            None
        };

        let snapshot = CostSnapshot {
            taken_at: Local::now(),
            current_cost: services.total(),
            currency,
            services,
            resources,
            daily,
            history,
            forecast,
        };
        info!(
            cost = snapshot.current_cost,
            threshold = config.monitoring.cost_threshold,
            "Cost check completed"
        );
        Ok(snapshot)
    }

    fn wants_resources(&self) -> bool {
        !self.config.resources.filter.include.is_empty()
            || !self.config.resources.thresholds.is_empty()
    }

    /// Evaluate a snapshot against the configured thresholds
    pub fn evaluate(&self, snapshot: &CostSnapshot) -> Evaluation {
        self.evaluator.evaluate(snapshot)
    }

    /// Post an alert when the evaluation calls for one. Nothing to send
    /// counts as success.
    pub async fn send_alert(&self, snapshot: &CostSnapshot, evaluation: &Evaluation) -> bool {
        if !evaluation.alert_triggered {
            info!(level = %evaluation.level, "No alert needed, costs within normal range");
            return true;
        }
        let sent = self
            .notifier
            .send(&message::cost_alert(&self.config, snapshot, evaluation))
            .await;
        if sent {
            info!(level = %evaluation.level, "Cost alert sent");
        } else {
            error!("Failed to send cost alert");
        }
        sent
    }

    /// Post a cost summary
    pub async fn send_summary(&self, snapshot: &CostSnapshot) -> bool {
        let sent = self
            .notifier
            .send(&message::cost_summary(&self.config, snapshot))
            .await;
        if !sent {
            error!("Failed to send cost summary");
        }
        sent
    }

    /// One full check: query, evaluate, alert
    pub async fn run_check(&self) -> Result<bool> {
        let snapshot = self.check_costs().await?;
        let evaluation = self.evaluate(&snapshot);

        if !evaluation.anomalies.is_empty() {
            warn!(count = evaluation.anomalies.len(), "Cost anomalies detected");
            for anomaly in &evaluation.anomalies {
                warn!(severity = %anomaly.severity, "Anomaly: {}", anomaly.description);
            }
        }

        Ok(self.send_alert(&snapshot, &evaluation).await)
    }

    /// One summary report
    pub async fn run_summary(&self) -> Result<bool> {
        let snapshot = self.check_costs().await?;
        Ok(self.send_summary(&snapshot).await)
    }

    /// Best-effort error notice to the channel
    pub async fn report_error(&self, err: &Error) {
        let _ = self
            .notifier
            .send(&message::error_notice(&self.config, &err.to_string()))
            .await;
    }

    /// Check both APIs, then post a confirmation
    pub async fn test_connections(&self) -> bool {
        info!("Testing connections");
        let slack_ok = self.notifier.test_connection().await;

        let aws_ok = match self.monitor.ping().await {
            Ok(()) => {
                info!("AWS connection test successful");
                true
            }
            Err(e) => {
                error!(error = %e, "AWS connection test failed");
                false
            }
        };

        if !(slack_ok && aws_ok) {
            error!("Connection tests failed");
            return false;
        }

        let sent = self
            .notifier
            .send(&message::connection_ok(&self.config))
            .await;
        if sent {
            info!("All connection tests passed");
        }
        sent
    }

    /// Whether scheduled checks are skipped on `date`
    pub fn is_suppressed(&self, date: NaiveDate) -> bool {
        !self.config.schedule.weekend_monitoring
            && matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Run until `shutdown` resolves.
    ///
    /// Fails only if the startup connection test fails. Cycle errors are
    /// logged, reported to the channel and followed by a back-off.
    pub async fn run_daemon<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(project = %self.config.monitoring.project_name, "Starting cost monitor daemon");
        if !self.test_connections().await {
            return Err(Error::config(
                "Connection tests failed. Please check your configuration.",
            ));
        }

        let mut schedule = Schedule::for_config(&self.config, local_now());
        for (trigger, job) in schedule.triggers() {
            info!(?job, "Scheduled {trigger}");
        }

        tokio::pin!(shutdown);

        info!("Running initial cost check");
        let mut pause = self.run_jobs(&[Job::Check], local_now()).await;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Monitoring stopped");
                    return Ok(());
                }
                () = tokio::time::sleep(pause) => {}
            }

            let now = local_now();
            let jobs = schedule.due(now);
            pause = self.run_jobs(&jobs, now).await;
        }
    }

    /// Run due jobs in order; returns how long to sleep before the next poll
    async fn run_jobs(&self, jobs: &[Job], now: NaiveDateTime) -> Duration {
        for job in jobs {
            let result = match job {
                Job::Check if self.is_suppressed(now.date()) => {
                    info!("Weekend monitoring disabled, skipping check");
                    continue;
                }
                Job::Check => self.run_check().await,
                Job::Summary => self.run_summary().await,
            };

            match result {
                Ok(true) => {}
                Ok(false) => warn!(?job, "Cycle completed but a notification was not delivered"),
                Err(e) => {
                    warn!(?job, error = %e, "Error in monitoring loop");
                    self.report_error(&e).await;
                    return self.timing.backoff;
                }
            }
        }
        self.timing.poll
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::SlackMessage;
    use crate::billing::{
        CostQuery, GroupBy, RawCostResponse, RawGroup, RawMetric, RawResultByTime, COST_METRIC,
    };
    use crate::config::test_config;
    use crate::models::Forecast;
    use chrono::Duration as Days;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeBilling {
        services: Vec<(&'static str, f64)>,
        resources: Vec<(&'static str, f64)>,
        daily: f64,
        fail_month: bool,
        fail_secondary: bool,
        queries: Mutex<Vec<CostQuery>>,
    }

    fn metric(amount: f64) -> HashMap<String, RawMetric> {
        HashMap::from([(
            COST_METRIC.to_string(),
            RawMetric {
                amount: Some(amount.to_string()),
                unit: Some("USD".to_string()),
            },
        )])
    }

    fn grouped(query: &CostQuery, groups: &[(&str, f64)]) -> RawCostResponse {
        RawCostResponse {
            results_by_time: vec![RawResultByTime {
                start: query.start.to_string(),
                end: query.end.to_string(),
                total: HashMap::new(),
                groups: groups
                    .iter()
                    .map(|(key, amount)| RawGroup {
                        keys: vec![key.to_string()],
                        metrics: metric(*amount),
                    })
                    .collect(),
            }],
        }
    }

    #[async_trait::async_trait]
    impl BillingApi for FakeBilling {
        async fn cost_and_usage(&self, query: &CostQuery) -> Result<RawCostResponse> {
            self.queries.lock().push(query.clone());
            match &query.group_by {
                Some(group) if *group == GroupBy::service() => {
                    if self.fail_month {
                        return Err(Error::billing("ExpiredToken"));
                    }
                    Ok(grouped(query, &self.services))
                }
                Some(_) if self.fail_secondary => Err(Error::billing("DataUnavailable")),
                Some(_) => Ok(grouped(query, &self.resources)),
                None => {
                    if self.fail_secondary && (query.end - query.start).num_days() > 7 {
                        return Err(Error::billing("LimitExceeded"));
                    }
                    let days = (query.end - query.start).num_days();
                    Ok(RawCostResponse {
                        results_by_time: (0..days)
                            .map(|i| {
                                let day = query.start + Days::days(i);
                                RawResultByTime {
                                    start: day.to_string(),
                                    end: (day + Days::days(1)).to_string(),
                                    total: metric(self.daily),
                                    groups: Vec::new(),
                                }
                            })
                            .collect(),
                    })
                }
            }
        }

        async fn cost_forecast(&self, start: NaiveDate, end: NaiveDate) -> Result<Forecast> {
            if self.fail_secondary {
                return Err(Error::billing("DataUnavailable"));
            }
            Ok(Forecast {
                amount: 250.0,
                currency: "USD".to_string(),
                period_days: u32::try_from((end - start).num_days()).unwrap(),
            })
        }
    }

    #[derive(Default)]
    struct FakeSlack {
        sent: Mutex<Vec<SlackMessage>>,
        fail_post: bool,
        fail_auth: bool,
    }

    impl FakeSlack {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().iter().map(SlackMessage::plain_text).collect()
        }
    }

    #[async_trait::async_trait]
    impl MessagingApi for FakeSlack {
        async fn post_message(&self, message: &SlackMessage) -> Result<()> {
            if self.fail_post {
                return Err(Error::notification("channel_not_found"));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }

        async fn auth_test(&self) -> Result<String> {
            if self.fail_auth {
                return Err(Error::notification("invalid_auth"));
            }
            Ok("costbot".to_string())
        }
    }

    fn harness(config: Config, billing: FakeBilling) -> (CostMonitorBot, Arc<FakeBilling>, Arc<FakeSlack>) {
        bot_with_slack(config, billing, FakeSlack::default())
    }

    fn bot_with_slack(
        config: Config,
        billing: FakeBilling,
        slack: FakeSlack,
    ) -> (CostMonitorBot, Arc<FakeBilling>, Arc<FakeSlack>) {
        let billing = Arc::new(billing);
        let slack = Arc::new(slack);
        let bot = CostMonitorBot::new(config, billing.clone(), slack.clone()).with_timing(
            DaemonTiming {
                poll: Duration::from_millis(5),
                backoff: Duration::from_millis(5),
            },
        );
        (bot, billing, slack)
    }

    fn spending(services: Vec<(&'static str, f64)>) -> FakeBilling {
        FakeBilling {
            services,
            daily: 4.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_check_costs_builds_snapshot() {
        let (bot, billing, _) = harness(
            test_config(),
            spending(vec![("Amazon EC2", 60.0), ("Amazon S3", 15.0)]),
        );

        let snapshot = bot.check_costs().await.unwrap();
        assert_eq!(snapshot.current_cost, 75.0);
        assert_eq!(snapshot.currency, "USD");
        assert_eq!(snapshot.daily.len(), 7);
        assert_eq!(snapshot.history.len(), 30);
        assert_eq!(snapshot.forecast.as_ref().map(|f| f.amount), Some(250.0));
        // no resource filter or thresholds configured
        assert!(snapshot.resources.is_empty());
        assert!(!billing
            .queries
            .lock()
            .iter()
            .any(|q| q.group_by.as_ref().is_some_and(GroupBy::is_resource)));
    }

    #[tokio::test]
    async fn test_disabled_services_are_dropped() {
        let mut config = test_config();
        config.services.selection.disabled = vec!["Amazon S3".to_string()];
        let (bot, _, _) = harness(
            config,
            spending(vec![("Amazon EC2", 60.0), ("Amazon S3", 15.0)]),
        );

        let snapshot = bot.check_costs().await.unwrap();
        assert_eq!(snapshot.current_cost, 60.0);
        assert_eq!(snapshot.services.get("Amazon S3"), None);
    }

    #[tokio::test]
    async fn test_empty_enabled_list_monitors_everything() {
        let mut config = test_config();
        config.services.selection.enabled = Vec::new();
        let (bot, billing, slack) = harness(config, spending(vec![("Amazon EC2", 500.0)]));

        let snapshot = bot.check_costs().await.unwrap();
        assert_eq!(snapshot.current_cost, 500.0);
        assert!(billing.queries.lock().iter().all(|q| q.filter.is_none()));

        assert!(bot.run_check().await.unwrap());
        assert_eq!(slack.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_resources_are_filtered() {
        let mut config = test_config();
        config.resources.filter.exclude = vec!["i-dev".to_string()];
        config.resources.thresholds.insert("i-".to_string(), 50.0);
        let billing = FakeBilling {
            resources: vec![("instance/i-prod-1", 30.0), ("instance/i-dev-1", 10.0)],
            ..spending(vec![("Amazon EC2", 40.0)])
        };
        let (bot, _, _) = harness(config, billing);

        let snapshot = bot.check_costs().await.unwrap();
        assert_eq!(snapshot.resources.len(), 1);
        assert_eq!(snapshot.resources.get("instance/i-prod-1"), Some(30.0));
    }

    #[tokio::test]
    async fn test_secondary_failures_degrade() {
        let mut config = test_config();
        config.resources.filter.include = vec!["i-".to_string()];
        let billing = FakeBilling {
            fail_secondary: true,
            ..spending(vec![("Amazon EC2", 40.0)])
        };
        let (bot, _, _) = harness(config, billing);

        let snapshot = bot.check_costs().await.unwrap();
        assert_eq!(snapshot.current_cost, 40.0);
        assert!(snapshot.history.is_empty());
        assert!(snapshot.resources.is_empty());
        assert_eq!(snapshot.forecast, None);
    }

    #[tokio::test]
    async fn test_month_to_date_failure_propagates() {
        let billing = FakeBilling {
            fail_month: true,
            ..Default::default()
        };
        let (bot, _, slack) = harness(test_config(), billing);

        assert!(matches!(bot.run_check().await, Err(Error::Billing(_))));
        assert!(slack.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_check_alerts_over_threshold() {
        let (bot, _, slack) = harness(test_config(), spending(vec![("Amazon EC2", 120.0)]));

        assert!(bot.run_check().await.unwrap());
        let texts = slack.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("USD 120.00"));
        assert!(texts[0].contains(":rotating_light: CRITICAL"));
    }

    #[tokio::test]
    async fn test_run_check_quiet_when_normal() {
        let (bot, _, slack) = harness(test_config(), spending(vec![("Amazon EC2", 20.0)]));

        assert!(bot.run_check().await.unwrap());
        assert!(slack.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_reports_false() {
        let slack = FakeSlack {
            fail_post: true,
            ..Default::default()
        };
        let (bot, _, _) = bot_with_slack(test_config(), spending(vec![("Amazon EC2", 500.0)]), slack);

        assert!(!bot.run_check().await.unwrap());
        assert!(!bot.run_summary().await.unwrap());
    }

    #[tokio::test]
    async fn test_summary_is_always_sent() {
        let (bot, _, slack) = harness(test_config(), spending(vec![("Amazon EC2", 5.0)]));

        assert!(bot.run_summary().await.unwrap());
        assert!(slack.texts()[0].contains("Cost Summary for Test Project"));
    }

    #[tokio::test]
    async fn test_connections() {
        let (bot, _, slack) = harness(test_config(), spending(vec![]));
        assert!(bot.test_connections().await);
        assert!(slack.texts()[0].contains("test successful"));

        let failing = FakeSlack {
            fail_auth: true,
            ..Default::default()
        };
        let (bot, _, slack) = bot_with_slack(test_config(), spending(vec![]), failing);
        assert!(!bot.test_connections().await);
        assert!(slack.sent.lock().is_empty());

        let billing = FakeBilling {
            fail_secondary: true,
            ..Default::default()
        };
        let (bot, _, _) = harness(test_config(), billing);
        // the one-day ping is short enough to succeed
        assert!(bot.test_connections().await);
    }

    #[test]
    fn test_weekend_suppression() {
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();

        let (bot, _, _) = harness(test_config(), FakeBilling::default());
        assert!(!bot.is_suppressed(saturday));

        let mut config = test_config();
        config.schedule.weekend_monitoring = false;
        let (bot, _, _) = harness(config, FakeBilling::default());
        assert!(bot.is_suppressed(saturday));
        assert!(!bot.is_suppressed(monday));
    }

    #[tokio::test]
    async fn test_suppressed_check_does_not_query() {
        let mut config = test_config();
        config.schedule.weekend_monitoring = false;
        let (bot, billing, _) = harness(config, spending(vec![("Amazon EC2", 500.0)]));
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let pause = bot.run_jobs(&[Job::Check, Job::Check], saturday).await;
        assert_eq!(pause, Duration::from_millis(5));
        assert!(billing.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_daemon_runs_initial_check_and_stops() {
        let (bot, _, slack) = harness(test_config(), spending(vec![("Amazon EC2", 150.0)]));

        bot.run_daemon(tokio::time::sleep(Duration::from_millis(30)))
            .await
            .unwrap();

        let texts = slack.texts();
        assert!(texts[0].contains("test successful"));
        assert!(texts.iter().any(|t| t.contains(":rotating_light: CRITICAL")));
    }

    #[tokio::test]
    async fn test_daemon_survives_cycle_errors() {
        let mut config = test_config();
        config.schedule.weekend_monitoring = true;
        let billing = FakeBilling {
            fail_month: true,
            daily: 1.0,
            ..Default::default()
        };
        let (bot, _, slack) = harness(config, billing);

        bot.run_daemon(tokio::time::sleep(Duration::from_millis(30)))
            .await
            .unwrap();

        let texts = slack.texts();
        assert!(texts.iter().any(|t| t.contains("AWS Cost Monitor Error for Test Project")));
    }

    #[tokio::test]
    async fn test_daemon_fails_when_connections_fail() {
        let failing = FakeSlack {
            fail_auth: true,
            ..Default::default()
        };
        let (bot, billing, _) = bot_with_slack(test_config(), FakeBilling::default(), failing);

        let result = bot.run_daemon(std::future::pending()).await;
        assert!(matches!(result, Err(Error::Config(_))));
        // only the connection ping was issued
        assert_eq!(billing.queries.lock().len(), 1);
    }
}
