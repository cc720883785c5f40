//! `next_due` arithmetic for time-driven rules (spec §4.F).
//!
//! All of it is pure and UTC-only: no tokio, no repository, nothing
//! that needs an async runtime to exercise.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use re_core::rule::{Recurring, Schedule};

fn at_time_of_day(date: NaiveDate, time_of_day: DateTime<Utc>) -> DateTime<Utc> {
    let naive = date
        .and_hms_opt(time_of_day.hour(), time_of_day.minute(), 0)
        .expect("hour/minute from a DateTime<Utc> are always valid");
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

/// Clamp `day` into the last valid day of `year`-`month` (e.g. day 31
/// requested for February lands on the 28th or 29th).
fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| {
        let first_of_next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .expect("year+1/month+1 stay within chrono's representable range");
        first_of_next - Duration::days(1)
    })
}

/// The schedule's first occurrence: `time_of_day` on `start`'s date, or
/// the following day if that instant has already passed `start`.
pub fn initial_due(schedule: &Schedule) -> Option<DateTime<Utc>> {
    let candidate = at_time_of_day(schedule.start.date_naive(), schedule.time_of_day);
    Some(if candidate < schedule.start {
        candidate + Duration::days(1)
    } else {
        candidate
    })
}

/// The next `next_due` to persist after a rule with this schedule fires
/// at `fired_at`. `None` means the rule goes inert (spec: "+∞").
///
/// `recurring_period == 0` never reaches here for a recurring schedule
/// (rejected at rule creation); it is treated as inert defensively.
pub fn advance(schedule: &Schedule, fired_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if schedule.recurring != Recurring::None && schedule.recurring_period == 0 {
        return None;
    }

    match schedule.recurring {
        Recurring::None => None,
        Recurring::Daily => {
            let days = schedule.recurring_period as i64;
            let date = fired_at.date_naive() + Duration::days(days);
            Some(at_time_of_day(date, schedule.time_of_day))
        }
        Recurring::Weekly => {
            let days = schedule.recurring_period as i64 * 7;
            let date = fired_at.date_naive() + Duration::days(days);
            Some(at_time_of_day(date, schedule.time_of_day))
        }
        Recurring::Monthly => {
            let months = schedule.recurring_period as i64;
            let day_of_month = schedule.start.day();
            let absolute = fired_at.year() as i64 * 12 + (fired_at.month() as i64 - 1) + months;
            let year = (absolute.div_euclid(12)) as i32;
            let month = (absolute.rem_euclid(12) + 1) as u32;
            let date = clamped_date(year, month, day_of_month);
            Some(at_time_of_day(date, schedule.time_of_day))
        }
    }
}
