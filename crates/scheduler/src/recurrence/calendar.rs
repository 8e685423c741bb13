//! Wall-clock resolution for daily and weekly schedules.

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Longest scan needed to find the next weekly slot, plus slack for DST days.
const MAX_SCAN_DAYS: usize = 15;

/// Map a local date + time-of-day in `zone` to a UTC instant.
///
/// Ambiguous local times (clocks going back) resolve to the earlier instant.
/// Non-existent local times (clocks going forward) shift forward one hour.
pub(crate) fn resolve_local(zone: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => zone
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Next instant strictly after `from` whose local date satisfies `accept`
/// and whose local time is `time`.
fn next_matching(
    from: DateTime<Utc>,
    time: NaiveTime,
    zone: Tz,
    accept: impl Fn(NaiveDate) -> bool,
) -> Option<DateTime<Utc>> {
    let mut date = from.with_timezone(&zone).date_naive();
    for _ in 0..MAX_SCAN_DAYS {
        if accept(date) {
            if let Some(at) = resolve_local(zone, date, time) {
                if at > from {
                    return Some(at);
                }
            }
        }
        date = date.succ_opt()?;
    }
    None
}

pub(crate) fn next_daily(from: DateTime<Utc>, time: NaiveTime, zone: Tz) -> Option<DateTime<Utc>> {
    next_matching(from, time, zone, |_| true)
}

pub(crate) fn next_weekly(
    from: DateTime<Utc>,
    day: Weekday,
    time: NaiveTime,
    zone: Tz,
) -> Option<DateTime<Utc>> {
    next_matching(from, time, zone, |date| date.weekday() == day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(hour: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, min, 0).unwrap()
    }

    #[test]
    fn daily_today_when_slot_ahead() {
        let from = Utc.with_ymd_and_hms(2025, 6, 14, 8, 0, 0).unwrap();
        let next = next_daily(from, hm(9, 30), Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 14, 9, 30, 0).unwrap());
    }

    #[test]
    fn daily_rolls_over_when_slot_passed() {
        let from = Utc.with_ymd_and_hms(2025, 6, 14, 10, 0, 0).unwrap();
        let next = next_daily(from, hm(9, 30), Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap());
    }

    #[test]
    fn daily_exact_slot_rolls_over() {
        let from = Utc.with_ymd_and_hms(2025, 6, 14, 9, 30, 0).unwrap();
        let next = next_daily(from, hm(9, 30), Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap());
    }

    #[test]
    fn weekly_finds_next_weekday() {
        // 2025-06-14 is a Saturday.
        let from = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();
        let next = next_weekly(from, Weekday::Mon, hm(6, 0), Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 16, 6, 0, 0).unwrap());
    }

    #[test]
    fn weekly_same_day_passed_rolls_a_week() {
        let from = Utc.with_ymd_and_hms(2025, 6, 16, 7, 0, 0).unwrap();
        let next = next_weekly(from, Weekday::Mon, hm(6, 0), Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 23, 6, 0, 0).unwrap());
    }

    #[test]
    fn daily_respects_zone_offset() {
        let zone: Tz = "America/New_York".parse().unwrap();
        // 2025-06-14 12:00 UTC is 08:00 EDT; 09:00 EDT is 13:00 UTC.
        let from = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();
        let next = next_daily(from, hm(9, 0), zone).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 14, 13, 0, 0).unwrap());
    }

    #[test]
    fn dst_gap_shifts_forward() {
        let zone: Tz = "Europe/Berlin".parse().unwrap();
        // 2025-03-30 02:30 does not exist in Berlin; 03:30 CEST is 01:30 UTC.
        let date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let at = resolve_local(zone, date, hm(2, 30)).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 3, 30, 1, 30, 0).unwrap());
    }

    #[test]
    fn dst_overlap_takes_earlier_instant() {
        let zone: Tz = "Europe/Berlin".parse().unwrap();
        // 2025-10-26 02:30 occurs twice; the CEST one is 00:30 UTC.
        let date = NaiveDate::from_ymd_opt(2025, 10, 26).unwrap();
        let at = resolve_local(zone, date, hm(2, 30)).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap());
    }
}
