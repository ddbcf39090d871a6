use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    clock::{self, ClockEstimate},
    config::CycleConfig,
    error::{CycleFault, InvariantViolation, RetentionError},
    matcher::{self, MatchOutcome},
    planner,
    ports::{CommandEmitter, RetentionStore, ScheduleSource, TimeSource},
    retention::{PersistentState, ScheduleCache},
    schedule::{self, Schedule, TimeOfDay},
    types::{ApplianceCommand, ClockSource, CyclePhase, WakeReason},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DispatchStatus {
    NotReached,
    Debounced {
        index: usize,
    },
    Sent {
        index: usize,
        command: ApplianceCommand,
    },
    Failed {
        index: usize,
        command: ApplianceCommand,
        error: String,
    },
}

impl DispatchStatus {
    pub fn attempted(&self) -> bool {
        matches!(self, Self::Sent { .. } | Self::Failed { .. })
    }
}

/// Everything one wake decided, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub wake: WakeReason,
    pub phases: Vec<CyclePhase>,
    pub clock: ClockEstimate,
    #[serde(rename = "localTime")]
    pub local_time: Option<TimeOfDay>,
    #[serde(rename = "matched")]
    pub matched: Option<MatchOutcome>,
    pub dispatch: DispatchStatus,
    #[serde(rename = "sleepSecs")]
    pub sleep_secs: u32,
    pub faults: Vec<CycleFault>,
}

impl CycleReport {
    fn new(wake: WakeReason) -> Self {
        let entry = match wake {
            WakeReason::ColdBoot => CyclePhase::ColdStart,
            WakeReason::SuspendWake => CyclePhase::WarmWake,
        };
        Self {
            wake,
            phases: vec![entry],
            clock: ClockEstimate {
                now_epoch: 0,
                needs_full_resync: false,
                source: ClockSource::Unknown,
            },
            local_time: None,
            matched: None,
            dispatch: DispatchStatus::NotReached,
            sleep_secs: 0,
            faults: Vec::new(),
        }
    }

    /// Duration to hand to the suspend request.
    pub fn suspend_for(&self) -> Duration {
        planner::as_duration(self.sleep_secs)
    }

    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }

    fn fault(&mut self, fault: impl Into<CycleFault>) {
        self.faults.push(fault.into());
    }
}

/// Runs one wake-to-suspend cycle against the node's collaborators.
///
/// Every path ends with the state written back and a sleep duration in the
/// report; collaborator failures degrade the cycle instead of aborting it.
pub struct CycleController<R, N, E> {
    config: CycleConfig,
    retention: R,
    network: N,
    emitter: E,
}

impl<R, N, E> CycleController<R, N, E>
where
    R: RetentionStore,
    N: TimeSource + ScheduleSource,
    E: CommandEmitter,
{
    pub fn new(config: CycleConfig, retention: R, network: N, emitter: E) -> Self {
        Self {
            config,
            retention,
            network,
            emitter,
        }
    }

    pub fn retention(&self) -> &R {
        &self.retention
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    pub fn into_parts(self) -> (R, N, E) {
        (self.retention, self.network, self.emitter)
    }

    pub fn run_cycle(&mut self, wake: WakeReason) -> CycleReport {
        let mut report = CycleReport::new(wake);
        info!("cycle start: wake={}", wake.as_str());

        let mut state = self.load_state(&mut report);
        report.clock = clock::reconstruct(&state, wake, self.config.sync_interval_secs);
        let mut schedule = cached_schedule(&state, &mut report);

        if report.clock.needs_full_resync {
            report.phases.push(CyclePhase::Resyncing);
            self.resync(&mut state, &mut schedule, &mut report);
        }

        let minutes_until_next =
            self.match_and_dispatch(&mut state, schedule.as_ref(), &mut report);
        report.sleep_secs = match minutes_until_next {
            Some(minutes) => planner::plan(minutes, self.config.max_sleep_minutes),
            None => planner::fallback(self.config.max_sleep_minutes),
        };

        report.phases.push(CyclePhase::Sleeping);
        state.last_wake_epoch = report.clock.now_epoch;
        state.sleep_duration_secs = report.sleep_secs;

        if let Err(err) = self.retention.save(&state.encode()) {
            warn!("failed to persist retained state: {err}");
            report.fault(err);
        }

        info!(
            "cycle done: clock={} sleeping {} minutes, {} fault(s)",
            report.clock.source.as_str(),
            report.sleep_secs / 60,
            report.faults.len()
        );
        report
    }

    fn load_state(&mut self, report: &mut CycleReport) -> PersistentState {
        match PersistentState::decode(&self.retention.load()) {
            Ok(state) => state,
            Err(RetentionError::Blank) => {
                info!("no retained state, starting fresh");
                PersistentState::default()
            }
            Err(err) => {
                warn!("discarding retained state: {err}");
                report.fault(err);
                PersistentState::default()
            }
        }
    }

    /// Fetches time and schedule. The sync epoch only advances when both
    /// arrive, so a partial resync is retried on the next wake.
    fn resync(
        &mut self,
        state: &mut PersistentState,
        schedule: &mut Option<Schedule>,
        report: &mut CycleReport,
    ) {
        let synced_at = match self.network.fetch_network_time() {
            Ok(epoch) => {
                info!("network time synced: {epoch}");
                report.clock.now_epoch = epoch;
                report.clock.source = ClockSource::Network;
                state.clock_synced = true;
                Some(epoch)
            }
            Err(err) => {
                warn!(
                    "time sync failed, keeping {} clock: {err}",
                    report.clock.source.as_str()
                );
                report.fault(err);
                None
            }
        };

        let document = match self.network.fetch_schedule_document() {
            Ok(document) => document,
            Err(err) => {
                warn!("schedule fetch failed, keeping cached schedule: {err}");
                report.fault(err);
                return;
            }
        };

        let fresh = match schedule::parse(&document) {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!("fetched schedule rejected, keeping cached schedule: {err}");
                report.fault(err);
                return;
            }
        };

        let cache = match ScheduleCache::new(&document) {
            Ok(cache) => cache,
            Err(err) => {
                warn!("fetched schedule does not fit, keeping cached schedule: {err}");
                report.fault(err);
                return;
            }
        };

        if cache != state.schedule_cache {
            info!("schedule document changed, {} entries", fresh.len());
            state.last_applied_index = None;
        }
        state.schedule_cache = cache;
        *schedule = Some(fresh);

        if let Some(epoch) = synced_at {
            state.first_sync_epoch = epoch;
        }
    }

    /// Returns minutes until the next entry, or `None` when the cycle must
    /// fall back to the sleep ceiling.
    fn match_and_dispatch(
        &mut self,
        state: &mut PersistentState,
        schedule: Option<&Schedule>,
        report: &mut CycleReport,
    ) -> Option<u32> {
        let Some(schedule) = schedule else {
            warn!("no usable schedule, skipping dispatch");
            report.fault(CycleFault::NoSchedule);
            return None;
        };

        let local_time = report
            .clock
            .source
            .is_usable()
            .then(|| clock::local_time_of_day(report.clock.now_epoch, &self.config.zone))
            .flatten();
        let Some(now) = local_time else {
            warn!("current time unknown, skipping dispatch");
            report.fault(CycleFault::ClockUnknown);
            return None;
        };

        report.phases.push(CyclePhase::Matching);
        report.local_time = Some(now);

        let outcome = match matcher::evaluate(schedule.entries(), now)
            .and_then(|outcome| retained_index(outcome, schedule.len()).map(|_| outcome))
        {
            Ok(outcome) => outcome,
            Err(violation) => {
                warn!("schedule invariant violated at {now}: {violation}");
                report.fault(violation);
                return None;
            }
        };
        report.matched = Some(outcome);

        let index = outcome.active_index;
        let retained = index as u16;
        debug!(
            "at {now}: active entry {index}, next entry {} in {} minutes",
            outcome.next_index, outcome.minutes_until_next
        );

        if state.last_applied_index == Some(retained) {
            info!("entry {index} already applied, skipping command");
            report.dispatch = DispatchStatus::Debounced { index };
        } else {
            report.phases.push(CyclePhase::Dispatching);
            let command = schedule.entries()[index].command();
            report.dispatch = match self.emitter.emit(command) {
                Ok(()) => {
                    info!(
                        "applied entry {index}: power={} target={}",
                        command.power, command.target_temperature
                    );
                    DispatchStatus::Sent { index, command }
                }
                Err(err) => {
                    warn!("command for entry {index} failed: {err}");
                    let error = err.to_string();
                    report.fault(err);
                    DispatchStatus::Failed {
                        index,
                        command,
                        error,
                    }
                }
            };
            state.last_applied_index = Some(retained);
        }

        Some(outcome.minutes_until_next)
    }
}

fn cached_schedule(state: &PersistentState, report: &mut CycleReport) -> Option<Schedule> {
    if state.schedule_cache.is_empty() {
        return None;
    }

    match schedule::parse(state.schedule_cache.as_bytes()) {
        Ok(schedule) => Some(schedule),
        Err(err) => {
            warn!("cached schedule unreadable: {err}");
            report.fault(err);
            None
        }
    }
}

// The debounce key is stored as u16 with u16::MAX reserved for "none".
fn retained_index(outcome: MatchOutcome, len: usize) -> Result<u16, InvariantViolation> {
    u16::try_from(outcome.active_index)
        .ok()
        .filter(|index| *index != u16::MAX)
        .ok_or(InvariantViolation::IndexOutOfRange {
            index: outcome.active_index,
            len,
        })
}
