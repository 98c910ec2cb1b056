// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Next-fire computation (`spec.md` §4.F), ported from
//! `afk/scheduler.py`'s `_calculate_first_run` and the re-schedule step in
//! `_run_scheduled_task`.

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Timelike};

use crate::error::SchedulerError;

fn is_empty(component: Option<i64>) -> bool {
    component.map_or(true, |v| v == 0)
}

fn truncate_to_minute(dt: DateTime<Local>) -> DateTime<Local> {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// `now`'s local midnight, plus `hour` hours and `minute` minutes — added as
/// durations (not `with_hour`/`with_minute`) so an hour ≥ 24 or a minute
/// computed beyond the current day rolls over to the next day correctly.
fn same_day_at(now: DateTime<Local>, hour: i64, minute: i64) -> DateTime<Local> {
    let midnight_naive = now.date_naive().and_hms_opt(0, 0, 0).expect("00:00:00 is always valid");
    let midnight = Local
        .from_local_datetime(&midnight_naive)
        .single()
        .unwrap_or(now);
    midnight + Duration::hours(hour) + Duration::minutes(minute)
}

/// Computes the first fire time for recurrence `(m, h, start)` relative to
/// `now` (`spec.md` §4.F). `m == Some(0)` is treated identically to `m ==
/// None` (and likewise for `h`) — the spec's first branch already does this
/// for the "both zero or null" case, so treating a lone zero the same way
/// in the other branches avoids a mod-by-zero that the spec doesn't address.
pub fn calculate_first_run(
    m: Option<i64>,
    h: Option<i64>,
    start: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Result<DateTime<Local>, SchedulerError> {
    if m.is_some_and(|v| v < 0) || h.is_some_and(|v| v < 0) {
        return Err(SchedulerError::NegativeInterval);
    }

    let m_empty = is_empty(m);
    let h_empty = is_empty(h);

    if m_empty && h_empty {
        if let Some(start) = start {
            if start > now {
                return Ok(truncate_to_minute(start));
            }
        }
        return Ok(truncate_to_minute(now));
    }

    if m_empty {
        // h given, m null/zero: next fire is the top of next hour.
        return Ok(same_day_at(now, now.hour() as i64 + 1, 0));
    }

    let mv = m.expect("m_empty is false");
    let hv = h.unwrap_or(0);
    let target_hour = now.hour() as i64 + hv;
    let minute = (0..=59i64).find(|x| x % mv == 0 && *x >= now.minute() as i64);
    match minute {
        Some(min) => Ok(same_day_at(now, target_hour, min)),
        None => Ok(same_day_at(now, target_hour + 1, 0)),
    }
}

/// Re-schedules after a fire: `next_fire + (h hours + m minutes)`, or `None`
/// if the recurrence is null (one-shot entry, now removed).
pub fn advance_next_fire(next_fire: DateTime<Local>, m: Option<i64>, h: Option<i64>) -> Option<DateTime<Local>> {
    if is_empty(m) && is_empty(h) {
        return None;
    }
    Some(next_fire + Duration::hours(h.unwrap_or(0)) + Duration::minutes(m.unwrap_or(0)))
}

#[cfg(test)]
#[path = "recurrence_tests.rs"]
mod tests;
