// Backup schedules: a fixed interval or a 5-field cron expression (minute granularity).

use crate::error::{PanelError, Result};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    Interval {
        #[serde(default)]
        days: u32,
        #[serde(default)]
        hours: u32,
        #[serde(default)]
        minutes: u32,
    },
    Cron { expression: String },
}

impl ScheduleSpec {
    pub fn interval(days: u32, hours: u32, minutes: u32) -> Self {
        ScheduleSpec::Interval {
            days,
            hours,
            minutes,
        }
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        ScheduleSpec::Cron {
            expression: expression.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ScheduleSpec::Interval { .. } => {
                if self.interval_minutes() == 0 {
                    return Err(PanelError::ScheduleInvalid(
                        "interval must be at least one minute".into(),
                    ));
                }
                Ok(())
            }
            ScheduleSpec::Cron { expression } => parse_cron(expression).map(|_| ()),
        }
    }

    fn interval_minutes(&self) -> i64 {
        match self {
            ScheduleSpec::Interval {
                days,
                hours,
                minutes,
            } => *days as i64 * 1440 + *hours as i64 * 60 + *minutes as i64,
            ScheduleSpec::Cron { .. } => 0,
        }
    }

    /// First fire time strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        match self {
            ScheduleSpec::Interval { .. } => {
                let minutes = self.interval_minutes();
                if minutes == 0 {
                    return Err(PanelError::ScheduleInvalid(
                        "interval must be at least one minute".into(),
                    ));
                }
                Ok(now.clone() + chrono::Duration::minutes(minutes))
            }
            ScheduleSpec::Cron { expression } => parse_cron(expression)?
                .after(now)
                .next()
                .ok_or_else(|| {
                    PanelError::ScheduleInvalid(format!("{} never fires again", expression))
                }),
        }
    }
}

/// Accepts exactly five fields (minute hour day-of-month month day-of-week) and pins seconds to 0.
fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(PanelError::ScheduleInvalid(format!(
            "cron expression needs 5 fields, got {}",
            fields
        )));
    }
    cron::Schedule::from_str(&format!("0 {}", expression.trim()))
        .map_err(|e| PanelError::ScheduleInvalid(format!("{}: {}", expression, e)))
}
