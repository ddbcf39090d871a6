//! Locating the entry in effect and the time remaining until the next one.
//!
//! These functions take plain slices so a schedule that was corrupted after
//! parsing still yields a deterministic answer or a typed violation, never a
//! panic.

use serde::Serialize;

use crate::{
    error::InvariantViolation,
    schedule::{ScheduleEntry, TimeOfDay, MINUTES_PER_DAY},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    #[serde(rename = "activeIndex")]
    pub active_index: usize,
    #[serde(rename = "nextIndex")]
    pub next_index: usize,
    #[serde(rename = "minutesUntilNext")]
    pub minutes_until_next: u32,
}

/// Index of the last entry whose time of day is `<= now`.
///
/// When `now` precedes every entry, the last entry of the schedule is still in
/// effect from the previous day. Equal times resolve to the later position.
pub fn active_index(
    entries: &[ScheduleEntry],
    now: TimeOfDay,
) -> Result<usize, InvariantViolation> {
    if entries.is_empty() {
        return Err(InvariantViolation::EmptySchedule);
    }

    Ok(entries
        .iter()
        .rposition(|entry| entry.time() <= now)
        .unwrap_or(entries.len() - 1))
}

pub fn next_index(len: usize, active: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (active + 1) % len
}

/// Minutes from `now` until the entry at `next` takes effect.
///
/// Crossing midnight adds a day only when the next entry is at or before
/// `now`; if `now` precedes the first entry of the day, the distance is the
/// plain difference.
pub fn minutes_until(
    entries: &[ScheduleEntry],
    active: usize,
    next: usize,
    now: TimeOfDay,
) -> Result<u32, InvariantViolation> {
    let len = entries.len();
    if len == 0 {
        return Err(InvariantViolation::EmptySchedule);
    }
    for index in [active, next] {
        if index >= len {
            return Err(InvariantViolation::IndexOutOfRange { index, len });
        }
    }

    let mut delta = entries[next].time().minutes() as i32 - now.minutes() as i32;
    if next <= active && delta <= 0 {
        delta += MINUTES_PER_DAY as i32;
    }

    if delta <= 0 {
        return Err(InvariantViolation::NonPositiveInterval { minutes: delta });
    }

    Ok(delta as u32)
}

pub fn evaluate(
    entries: &[ScheduleEntry],
    now: TimeOfDay,
) -> Result<MatchOutcome, InvariantViolation> {
    let active_index = active_index(entries, now)?;
    let next_index = next_index(entries.len(), active_index);
    let minutes_until_next = minutes_until(entries, active_index, next_index, now)?;

    Ok(MatchOutcome {
        active_index,
        next_index,
        minutes_until_next,
    })
}
