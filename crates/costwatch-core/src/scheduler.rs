//! Wall-clock job schedule
//!
//! A [`Schedule`] is a list of (trigger, job) registrations polled by the
//! daemon loop. Triggers are independent: when two fire in the same poll,
//! both jobs are returned.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::{Config, NotificationFrequency};

/// Work the daemon can be asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Job {
    /// Threshold and anomaly check, alerting when needed
    Check,
    /// Cost summary report
    Summary,
}

/// When a job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Every `hours` hours from registration
    Every {
        /// Interval in hours, at least 1
        hours: u32,
    },
    /// Every day at a fixed time
    DailyAt {
        /// Local wall-clock time
        time: NaiveTime,
    },
    /// Once a week
    WeeklyAt {
        /// Day of the week
        weekday: Weekday,
        /// Local wall-clock time
        time: NaiveTime,
    },
    /// Once a month; days past the 28th are clamped so every month fires
    MonthlyAt {
        /// Day of the month, 1 to 28
        day: u32,
        /// Local wall-clock time
        time: NaiveTime,
    },
}

impl Trigger {
    /// First firing strictly after `after`
    pub fn next_after(&self, after: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Self::Every { hours } => after + Duration::hours(i64::from(hours.max(1))),
            Self::DailyAt { time } => {
                let today = after.date().and_time(time);
                if today > after {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Self::WeeklyAt { weekday, time } => {
                let ahead = (7 + weekday.num_days_from_monday()
                    - after.weekday().num_days_from_monday())
                    % 7;
                let candidate = (after.date() + Duration::days(i64::from(ahead))).and_time(time);
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
            Self::MonthlyAt { day, time } => {
                let day = day.clamp(1, 28);
                let this_month = month_day(after.year(), after.month(), day).and_time(time);
                if this_month > after {
                    this_month
                } else {
                    let (year, month) = if after.month() == 12 {
                        (after.year() + 1, 1)
                    } else {
                        (after.year(), after.month() + 1)
                    };
                    month_day(year, month, day).and_time(time)
                }
            }
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every { hours } => write!(f, "every {hours} hours"),
            Self::DailyAt { time } => write!(f, "daily at {}", time.format("%H:%M")),
            Self::WeeklyAt { weekday, time } => {
                write!(f, "every {weekday} at {}", time.format("%H:%M"))
            }
            Self::MonthlyAt { day, time } => {
                write!(f, "monthly on day {day} at {}", time.format("%H:%M"))
            }
        }
    }
}

fn month_day(year: i32, month: u32, day: u32) -> NaiveDate {
    // day is clamped to 1..=28, which exists in every month
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    trigger: Trigger,
    job: Job,
    next_run: NaiveDateTime,
}

/// Registered triggers and their next firing times
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    start: NaiveDateTime,
    entries: Vec<Entry>,
}

impl Schedule {
    /// Empty schedule; registrations fire no earlier than after `start`
    pub fn starting_at(start: NaiveDateTime) -> Self {
        Self {
            start,
            entries: Vec::new(),
        }
    }

    /// The registrations for a configured notification frequency, plus the
    /// periodic threshold check
    pub fn for_config(config: &Config, start: NaiveDateTime) -> Self {
        let mut schedule = Self::starting_at(start);
        match config.monitoring.notification_frequency {
            NotificationFrequency::Daily => {
                schedule.register_time_of_day(at(9, 0), Job::Check);
                schedule.register_time_of_day(at(18, 0), Job::Check);
                schedule.register_weekly(Weekday::Mon, at(8, 0), Job::Summary);
            }
            NotificationFrequency::Weekly => {
                schedule.register_weekly(Weekday::Mon, at(9, 0), Job::Check);
                schedule.register_weekly(Weekday::Mon, at(9, 30), Job::Summary);
            }
            NotificationFrequency::Monthly => {
                schedule.register_monthly(1, at(9, 0), Job::Check);
                schedule.register_monthly(1, at(9, 0), Job::Summary);
            }
        }
        schedule.register_periodic(config.schedule.check_interval_hours, Job::Check);
        schedule
    }

    fn register(&mut self, trigger: Trigger, job: Job) -> &mut Self {
        let next_run = trigger.next_after(self.start);
        self.entries.push(Entry {
            trigger,
            job,
            next_run,
        });
        self
    }

    /// Run `job` every `hours` hours
    pub fn register_periodic(&mut self, hours: u32, job: Job) -> &mut Self {
        self.register(Trigger::Every { hours }, job)
    }

    /// Run `job` every day at `time`
    pub fn register_time_of_day(&mut self, time: NaiveTime, job: Job) -> &mut Self {
        self.register(Trigger::DailyAt { time }, job)
    }

    /// Run `job` every `weekday` at `time`
    pub fn register_weekly(&mut self, weekday: Weekday, time: NaiveTime, job: Job) -> &mut Self {
        self.register(Trigger::WeeklyAt { weekday, time }, job)
    }

    /// Run `job` on `day` of every month at `time`
    pub fn register_monthly(&mut self, day: u32, time: NaiveTime, job: Job) -> &mut Self {
        self.register(Trigger::MonthlyAt { day, time }, job)
    }

    /// Jobs whose trigger fired by `now`, in registration order. Each fired
    /// trigger is advanced past `now`; missed firings are not replayed.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<Job> {
        let mut jobs = Vec::new();
        for entry in &mut self.entries {
            if entry.next_run <= now {
                jobs.push(entry.job);
                entry.next_run = entry.trigger.next_after(now);
            }
        }
        jobs
    }

    /// Earliest pending firing
    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.entries.iter().map(|e| e.next_run).min()
    }

    /// Registered triggers with their jobs
    pub fn triggers(&self) -> impl Iterator<Item = (Trigger, Job)> + '_ {
        self.entries.iter().map(|e| (e.trigger, e.job))
    }

    /// Number of registered triggers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
