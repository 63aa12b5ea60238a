//! Weekly schedule lookups.

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

use crate::cache::Snapshot;
use crate::types::{Schedule, Temperature, ZoneId};
use crate::{Error, Result};

/// Setpoint the zone's weekly schedule dictates at local wall-clock time `at`.
pub fn temperature_at(snapshot: &Snapshot, zone_id: &ZoneId, at: NaiveDateTime) -> Result<Temperature> {
    let schedule = snapshot.schedule(zone_id)?;
    lookup(schedule, at.weekday(), at.time()).ok_or_else(|| Error::ScheduleNotFound(zone_id.clone()))
}

/// The switchpoint in force on `day` at `time`.
///
/// Times before the day's first switchpoint inherit the last switchpoint of the most
/// recent earlier day that has one. Returns `None` only for an empty schedule.
pub fn lookup(schedule: &Schedule, day: Weekday, time: NaiveTime) -> Option<Temperature> {
    let mut result = carried_over(schedule, day);
    for point in schedule.day(day) {
        if point.time > time {
            break;
        }
        result = Some(point.temperature);
    }
    result
}

fn carried_over(schedule: &Schedule, day: Weekday) -> Option<Temperature> {
    let mut prev = day.pred();
    // seven steps: the last one lands on `day` itself, i.e. the same weekday a week earlier
    for _ in 0..7 {
        if let Some(last) = schedule.day(prev).last() {
            return Some(last.temperature);
        }
        prev = prev.pred();
    }
    None
}

/// Same time of day on the next Saturday; a Saturday maps to itself.
pub fn next_saturday(at: NaiveDateTime) -> NaiveDateTime {
    let today = at.weekday().num_days_from_monday();
    let saturday = Weekday::Sat.num_days_from_monday();
    let ahead = (saturday + 7 - today) % 7;
    at + TimeDelta::days(i64::from(ahead))
}
