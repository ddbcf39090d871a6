use std::time::Duration;

/// Seconds to sleep before the next evaluation.
///
/// The ceiling keeps the node waking periodically even when the next change
/// is many hours out, so schedule updates and drift correction still happen.
pub fn plan(minutes_until_next: u32, max_sleep_minutes: u32) -> u32 {
    minutes_until_next.min(max_sleep_minutes).saturating_mul(60)
}

pub fn fallback(max_sleep_minutes: u32) -> u32 {
    max_sleep_minutes.saturating_mul(60)
}

pub fn as_duration(sleep_secs: u32) -> Duration {
    Duration::from_secs(sleep_secs.into())
}
