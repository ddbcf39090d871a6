use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    retention::PersistentState,
    schedule::TimeOfDay,
    types::{ClockSource, WakeReason},
};

pub const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockEstimate {
    #[serde(rename = "nowEpoch")]
    pub now_epoch: i64,
    #[serde(rename = "needsFullResync")]
    pub needs_full_resync: bool,
    pub source: ClockSource,
}

/// Wall-clock zone used to turn epoch seconds into a time of day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl LocalZone {
    pub fn from_offset_minutes(minutes: i32) -> Self {
        let seconds = minutes.clamp(-MAX_OFFSET_MINUTES, MAX_OFFSET_MINUTES) * 60;
        Self::Fixed(FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix()))
    }

    /// Named IANA zone when `name` parses, otherwise the fixed offset.
    pub fn resolve(name: Option<&str>, offset_minutes: i32) -> Self {
        match name.and_then(|name| name.parse::<Tz>().ok()) {
            Some(tz) => Self::Named(tz),
            None => Self::from_offset_minutes(offset_minutes),
        }
    }
}

/// Decides where "now" comes from for this cycle.
///
/// A cold boot, a record whose clock was never synced, or an expired sync
/// interval all demand a full resync. Otherwise the previous wake time plus
/// the requested sleep is taken as now; the retained clock is coarse and that
/// error is accepted until the next resync.
pub fn reconstruct(
    prior: &PersistentState,
    wake: WakeReason,
    sync_interval_secs: u32,
) -> ClockEstimate {
    if wake == WakeReason::ColdBoot || !prior.clock_synced {
        return ClockEstimate {
            now_epoch: 0,
            needs_full_resync: true,
            source: ClockSource::Unknown,
        };
    }

    let now_epoch = prior
        .last_wake_epoch
        .saturating_add(prior.sleep_duration_secs.into());
    let since_sync = prior.last_wake_epoch.saturating_sub(prior.first_sync_epoch);
    let needs_full_resync = since_sync < 0 || since_sync > i64::from(sync_interval_secs);

    ClockEstimate {
        now_epoch,
        needs_full_resync,
        source: ClockSource::Extrapolated,
    }
}

pub fn local_time_of_day(epoch: i64, zone: &LocalZone) -> Option<TimeOfDay> {
    let utc = DateTime::from_timestamp(epoch, 0)?;
    let (hour, minute) = match zone {
        LocalZone::Fixed(offset) => {
            let local = utc.with_timezone(offset);
            (local.hour(), local.minute())
        }
        LocalZone::Named(tz) => {
            let local = utc.with_timezone(tz);
            (local.hour(), local.minute())
        }
    };
    TimeOfDay::new(hour as u8, minute as u8)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn synced_state(first_sync: i64, last_wake: i64, sleep: u32) -> PersistentState {
        PersistentState {
            first_sync_epoch: first_sync,
            last_wake_epoch: last_wake,
            sleep_duration_secs: sleep,
            clock_synced: true,
            ..PersistentState::default()
        }
    }

    #[test]
    fn cold_boot_always_resyncs() {
        let prior = synced_state(1_000, 1_100, 60);

        let estimate = reconstruct(&prior, WakeReason::ColdBoot, 86_400);

        assert!(estimate.needs_full_resync);
        assert_eq!(estimate.source, ClockSource::Unknown);
        assert!(
            reconstruct(&PersistentState::default(), WakeReason::ColdBoot, 86_400)
                .needs_full_resync
        );
    }

    #[test]
    fn warm_wake_extrapolates_from_retained_state() {
        let prior = synced_state(1_000_000, 1_003_600, 4_200);

        let estimate = reconstruct(&prior, WakeReason::SuspendWake, 86_400);

        assert_eq!(
            estimate,
            ClockEstimate {
                now_epoch: 1_007_800,
                needs_full_resync: false,
                source: ClockSource::Extrapolated,
            }
        );
    }

    #[test]
    fn expired_sync_interval_requests_resync() {
        let prior = synced_state(1_000_000, 1_000_000 + 86_401, 60);

        let estimate = reconstruct(&prior, WakeReason::SuspendWake, 86_400);

        assert!(estimate.needs_full_resync);
        assert_eq!(estimate.now_epoch, 1_000_000 + 86_461);
    }

    #[test]
    fn exact_sync_interval_does_not_resync() {
        let prior = synced_state(1_000_000, 1_000_000 + 86_400, 60);

        assert!(!reconstruct(&prior, WakeReason::SuspendWake, 86_400).needs_full_resync);
    }

    #[test]
    fn unsynced_or_backwards_record_resyncs() {
        let unsynced = PersistentState {
            clock_synced: false,
            ..synced_state(1_000, 1_100, 60)
        };
        assert!(reconstruct(&unsynced, WakeReason::SuspendWake, 86_400).needs_full_resync);

        let backwards = synced_state(2_000, 1_000, 60);
        assert!(reconstruct(&backwards, WakeReason::SuspendWake, 86_400).needs_full_resync);
    }

    #[test]
    fn local_time_applies_fixed_offset() {
        // 2026-01-05T11:15:00Z
        let epoch = 1_767_611_700;
        let zone = LocalZone::from_offset_minutes(-240);

        assert_eq!(local_time_of_day(epoch, &zone), TimeOfDay::new(7, 15));
    }

    #[test]
    fn named_zone_overrides_offset() {
        let zone = LocalZone::resolve(Some("Europe/Berlin"), -240);
        assert_eq!(zone, LocalZone::Named(chrono_tz::Europe::Berlin));

        // 2026-01-05T11:15:00Z is 12:15 in Berlin (CET).
        assert_eq!(local_time_of_day(1_767_611_700, &zone), TimeOfDay::new(12, 15));
    }

    #[test]
    fn unknown_zone_name_falls_back_to_offset() {
        let zone = LocalZone::resolve(Some("Mars/Olympus"), 60);
        assert_eq!(zone, LocalZone::from_offset_minutes(60));
    }
}
