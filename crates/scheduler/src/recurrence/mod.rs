//! Recurrence rules: when is a task due next?
//!
//! [`Schedule`] is a closed set of schedule kinds with a single
//! [`next_occurrence`](Schedule::next_occurrence) operation. Every variant
//! returns an instant strictly after the reference instant, so re-computing
//! from the instant a task just fired always makes progress.

mod calendar;
mod cron;

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};

pub use self::cron::CronExpr;

/// Schedule configuration for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    /// Fire once at `at`.
    OneTime { at: DateTime<Utc> },
    /// Fire at `anchor + k * period`. A `None` anchor is pinned to the
    /// instant the task is scheduled.
    Interval {
        period: Duration,
        anchor: Option<DateTime<Utc>>,
    },
    /// Fire every day at `time` local to `zone`.
    Daily { time: NaiveTime, zone: Tz },
    /// Fire every week on `day` at `time` local to `zone`.
    Weekly {
        day: Weekday,
        time: NaiveTime,
        zone: Tz,
    },
    /// Fire on a cron expression.
    Cron(CronExpr),
}

impl Schedule {
    pub fn once(at: DateTime<Utc>) -> Self {
        Self::OneTime { at }
    }

    /// Interval anchored at the moment the task is scheduled.
    pub fn every(period: Duration) -> Self {
        Self::Interval {
            period,
            anchor: None,
        }
    }

    pub fn every_from(period: Duration, anchor: DateTime<Utc>) -> Self {
        Self::Interval {
            period,
            anchor: Some(anchor),
        }
    }

    pub fn daily(hour: u32, minute: u32, zone: &str) -> Result<Self> {
        Ok(Self::Daily {
            time: time_of_day(hour, minute)?,
            zone: parse_zone(zone)?,
        })
    }

    pub fn weekly(day: Weekday, hour: u32, minute: u32, zone: &str) -> Result<Self> {
        Ok(Self::Weekly {
            day,
            time: time_of_day(hour, minute)?,
            zone: parse_zone(zone)?,
        })
    }

    pub fn cron(expression: &str, zone: &str) -> Result<Self> {
        Ok(Self::Cron(CronExpr::parse(expression, parse_zone(zone)?)?))
    }

    /// Next due instant strictly after `from`, or `None` once the schedule is
    /// exhausted.
    pub fn next_occurrence(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OneTime { at } => (*at > from).then_some(*at),
            Self::Interval { period, anchor } => {
                next_interval(*period, anchor.unwrap_or(from), from)
            }
            Self::Daily { time, zone } => calendar::next_daily(from, *time, *zone),
            Self::Weekly { day, time, zone } => calendar::next_weekly(from, *day, *time, *zone),
            Self::Cron(expr) => expr.next_after(from),
        }
    }

    /// Initial due instant for a task becoming schedulable at `now`.
    ///
    /// A one-time instant already in the past is due immediately; every other
    /// kind uses [`next_occurrence`](Self::next_occurrence).
    pub fn first_occurrence(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OneTime { at } => Some(*at),
            _ => self.next_occurrence(now),
        }
    }

    /// Check if this schedule is recurring.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::OneTime { .. })
    }

    /// Validate the schedule configuration.
    pub fn validate(&self) -> Result<()> {
        if let Self::Interval { period, .. } = self {
            if period.is_zero() {
                return Err(SchedulerError::InvalidSchedule(
                    "interval period must be greater than 0".into(),
                ));
            }
            if i64::try_from(period.as_micros()).is_err() {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "interval period {:?} is too large",
                    period
                )));
            }
        }
        Ok(())
    }

    /// Pin a floating interval anchor to `now`; other kinds are unchanged.
    pub(crate) fn anchored_at(self, now: DateTime<Utc>) -> Self {
        match self {
            Self::Interval {
                period,
                anchor: None,
            } => Self::Interval {
                period,
                anchor: Some(now),
            },
            other => other,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneTime { at } => write!(f, "once at {}", at.to_rfc3339()),
            Self::Interval { period, .. } => write!(f, "every {:?}", period),
            Self::Daily { time, zone } => write!(f, "daily at {} {}", time.format("%H:%M"), zone),
            Self::Weekly { day, time, zone } => {
                write!(f, "weekly on {} at {} {}", day, time.format("%H:%M"), zone)
            }
            Self::Cron(expr) => write!(f, "cron '{}' {}", expr.source(), expr.zone()),
        }
    }
}

/// Smallest `anchor + k * period` strictly after `from`.
fn next_interval(
    period: Duration,
    anchor: DateTime<Utc>,
    from: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if anchor > from {
        return Some(anchor);
    }
    let period_us = i64::try_from(period.as_micros()).ok().filter(|p| *p > 0)?;
    let elapsed_us = (from - anchor).num_microseconds()?;
    let steps = elapsed_us / period_us + 1;
    let offset = steps.checked_mul(period_us)?;
    anchor.checked_add_signed(chrono::Duration::microseconds(offset))
}

fn time_of_day(hour: u32, minute: u32) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        SchedulerError::InvalidSchedule(format!("invalid time of day {hour:02}:{minute:02}"))
    })
}

fn parse_zone(zone: &str) -> Result<Tz> {
    zone.parse::<Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone(zone.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 0, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn one_time_fires_once() {
        let schedule = Schedule::once(t0() + secs(10));
        assert_eq!(schedule.next_occurrence(t0()), Some(t0() + secs(10)));
        assert_eq!(schedule.next_occurrence(t0() + secs(10)), None);
        assert_eq!(schedule.next_occurrence(t0() + secs(11)), None);
        assert!(!schedule.is_recurring());
    }

    #[test]
    fn one_time_in_past_is_due_immediately() {
        let schedule = Schedule::once(t0() - secs(5));
        assert_eq!(schedule.first_occurrence(t0()), Some(t0() - secs(5)));
        assert_eq!(schedule.next_occurrence(t0()), None);
    }

    #[test]
    fn interval_aligns_to_anchor() {
        let schedule = Schedule::every_from(Duration::from_secs(5), t0());
        assert_eq!(schedule.next_occurrence(t0()), Some(t0() + secs(5)));
        assert_eq!(schedule.next_occurrence(t0() + secs(4)), Some(t0() + secs(5)));
        assert_eq!(schedule.next_occurrence(t0() + secs(5)), Some(t0() + secs(10)));
        // Missed slots are skipped, not replayed.
        assert_eq!(schedule.next_occurrence(t0() + secs(17)), Some(t0() + secs(20)));
    }

    #[test]
    fn interval_before_anchor_returns_anchor() {
        let schedule = Schedule::every_from(Duration::from_secs(5), t0() + secs(60));
        assert_eq!(schedule.next_occurrence(t0()), Some(t0() + secs(60)));
    }

    #[test]
    fn floating_interval_is_pinned_on_schedule() {
        let schedule = Schedule::every(Duration::from_secs(5)).anchored_at(t0());
        assert_eq!(
            schedule,
            Schedule::every_from(Duration::from_secs(5), t0())
        );
    }

    #[test]
    fn validate_interval() {
        assert!(Schedule::every(Duration::from_secs(300)).validate().is_ok());
        assert!(Schedule::every(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn constructors_reject_bad_input() {
        assert!(matches!(
            Schedule::daily(24, 0, "UTC"),
            Err(SchedulerError::InvalidSchedule(_))
        ));
        assert!(matches!(
            Schedule::daily(9, 0, "Mars/Olympus"),
            Err(SchedulerError::InvalidTimezone(_))
        ));
        assert!(matches!(
            Schedule::cron("not a cron", "UTC"),
            Err(SchedulerError::CronParse(_))
        ));
    }

    #[test]
    fn is_recurring() {
        assert!(Schedule::every(Duration::from_secs(1)).is_recurring());
        assert!(Schedule::daily(9, 0, "UTC").unwrap().is_recurring());
        assert!(Schedule::weekly(Weekday::Fri, 17, 0, "UTC").unwrap().is_recurring());
        assert!(Schedule::cron("*/5 * * * *", "UTC").unwrap().is_recurring());
        assert!(!Schedule::once(t0()).is_recurring());
    }

    #[test]
    fn next_occurrence_is_strictly_monotonic() {
        let schedules = vec![
            Schedule::every_from(Duration::from_millis(1_500), t0()),
            Schedule::every_from(Duration::from_secs(3_600), t0() + secs(90)),
            Schedule::daily(9, 30, "UTC").unwrap(),
            Schedule::daily(2, 30, "Europe/Berlin").unwrap(),
            Schedule::weekly(Weekday::Sun, 23, 59, "Pacific/Auckland").unwrap(),
            Schedule::cron("0,15,30,45 8-18 * * *", "UTC").unwrap(),
            Schedule::cron("5 0 * * *", "America/New_York").unwrap(),
        ];

        // Walk each schedule forward from a spread of starting points,
        // including DST transition days in both hemispheres.
        let starts = [
            t0(),
            t0() + chrono::Duration::milliseconds(1),
            Utc.with_ymd_and_hms(2025, 3, 30, 0, 59, 59).unwrap(),
            Utc.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 4, 5, 13, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap(),
        ];

        for schedule in &schedules {
            for start in starts {
                let mut from = start;
                for _ in 0..50 {
                    let next = schedule
                        .next_occurrence(from)
                        .unwrap_or_else(|| panic!("{schedule} exhausted from {from}"));
                    assert!(next > from, "{schedule}: {next} is not after {from}");
                    from = next;
                }
            }
        }
    }

    #[test]
    fn display_describes_schedule() {
        assert_eq!(
            Schedule::daily(9, 5, "Europe/Berlin").unwrap().to_string(),
            "daily at 09:05 Europe/Berlin"
        );
        assert_eq!(
            Schedule::every(Duration::from_secs(5)).to_string(),
            "every 5s"
        );
    }
}
